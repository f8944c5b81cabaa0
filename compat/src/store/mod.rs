//! The content-addressed store derivations are written into.
//!
//! Only literal text entries are supported, which is all derivations need.
//! Their paths are derived from the name, the contents and the references,
//! see [build_text_path].
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::store_path::{self, build_text_path, StoreDir, StorePath};

mod local;
mod memory;

pub use self::local::LocalStore;
pub use self::memory::MemoryStore;

/// Errors that can occur when interacting with a [Store].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid store path: {0}")]
    InvalidStorePath(#[from] store_path::Error),
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A store that text files can be added to, and read back from.
///
/// Adding identical `(suffix, contents, references)` more than once needs
/// to return the same path, and leave the stored object untouched.
pub trait Store: Send + Sync {
    fn store_dir(&self) -> &StoreDir;

    /// Adds `contents` under a path ending with `suffix`, recording
    /// `references`, and returns the path.
    fn add_text_to_store(
        &self,
        suffix: &str,
        contents: &[u8],
        references: &BTreeSet<String>,
    ) -> Result<StorePath, Error>;

    /// Returns the path [Store::add_text_to_store] would return, without
    /// adding anything.
    fn compute_store_path_for_text(
        &self,
        suffix: &str,
        contents: &[u8],
        references: &BTreeSet<String>,
    ) -> Result<StorePath, Error> {
        Ok(build_text_path(
            self.store_dir(),
            suffix,
            contents,
            references,
        )?)
    }

    /// Returns the contents at the given path, or None if it's not in the
    /// store.
    fn read_text(&self, path: &StorePath) -> Result<Option<Vec<u8>>, Error>;
}
