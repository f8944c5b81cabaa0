use std::fmt;
use std::sync::Arc;

use super::{Error, StorePath, STORE_DIR};

/// The directory store paths live in, without a trailing slash.
///
/// A [StorePath] is only a digest and a name, so this is needed to turn it
/// into an absolute path, and it is part of every store path fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreDir(Arc<str>);

impl StoreDir {
    /// Create a new [StoreDir]. The path needs to be absolute, a trailing
    /// slash is removed.
    pub fn new<S: AsRef<str>>(path: S) -> Result<Self, Error> {
        let path = path.as_ref();
        let trimmed = path.trim_end_matches('/');
        if !path.starts_with('/') || trimmed.is_empty() {
            return Err(Error::InvalidStoreDir(path.to_string()));
        }
        Ok(StoreDir(trimmed.into()))
    }

    pub fn to_str(&self) -> &str {
        &self.0
    }

    /// Returns an object that implements [fmt::Display], printing the
    /// absolute path of the given [StorePath].
    pub fn display_path<'a>(&'a self, path: &'a StorePath) -> impl fmt::Display + 'a {
        DisplayStorePath {
            store_dir: self,
            path,
        }
    }

    /// Returns the absolute path of the given [StorePath].
    pub fn print_path(&self, path: &StorePath) -> String {
        self.display_path(path).to_string()
    }
}

impl Default for StoreDir {
    fn default() -> Self {
        StoreDir(STORE_DIR.into())
    }
}

impl fmt::Display for StoreDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct DisplayStorePath<'a> {
    store_dir: &'a StoreDir,
    path: &'a StorePath,
}

impl fmt::Display for DisplayStorePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_dir, self.path)
    }
}
