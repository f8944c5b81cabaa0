use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use super::{Error, Store};
use crate::store_path::{StoreDir, StorePath};

/// Name of the directory, inside the store dir, holding the references of
/// each entry, one path per line.
const REFERENCES_DIR: &str = ".references";

/// A [Store] backed by a directory on the local filesystem.
///
/// Entries are written to a temporary file first and then renamed into
/// place, so readers never see partial contents. An entry that's already
/// present is never rewritten.
#[derive(Clone, Debug)]
pub struct LocalStore {
    store_dir: StoreDir,
}

impl LocalStore {
    /// Opens the store at `store_dir`, creating the directory if needed.
    pub fn open(store_dir: StoreDir) -> Result<Self, Error> {
        let references_dir = Path::new(store_dir.to_str()).join(REFERENCES_DIR);
        fs::create_dir_all(&references_dir).map_err(|source| Error::Io {
            path: references_dir,
            source,
        })?;

        Ok(Self { store_dir })
    }

    fn real_path(&self, path: &StorePath) -> PathBuf {
        Path::new(self.store_dir.to_str()).join(path.to_string())
    }

    fn references_path(&self, path: &StorePath) -> PathBuf {
        Path::new(self.store_dir.to_str())
            .join(REFERENCES_DIR)
            .join(path.to_string())
    }

    /// Returns the references recorded for `path`, if it's in the store.
    pub fn references(&self, path: &StorePath) -> Result<Option<BTreeSet<String>>, Error> {
        let references_path = self.references_path(path);
        match fs::read_to_string(&references_path) {
            Ok(s) => Ok(Some(s.lines().map(str::to_string).collect())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::Io {
                path: references_path,
                source,
            }),
        }
    }
}

/// Writes `contents` to `target` via a temporary file in the same directory.
fn write_atomic(target: &Path, contents: &[u8]) -> Result<(), Error> {
    let io_err = |source| Error::Io {
        path: target.to_path_buf(),
        source,
    };

    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(target).map_err(|e| io_err(e.error))?;

    Ok(())
}

impl Store for LocalStore {
    fn store_dir(&self) -> &StoreDir {
        &self.store_dir
    }

    #[instrument(skip_all, fields(suffix = suffix), err)]
    fn add_text_to_store(
        &self,
        suffix: &str,
        contents: &[u8],
        references: &BTreeSet<String>,
    ) -> Result<StorePath, Error> {
        let path = self.compute_store_path_for_text(suffix, contents, references)?;
        let real_path = self.real_path(&path);

        if real_path.exists() {
            debug!(%path, "already present");
            return Ok(path);
        }

        // references go first, an entry without them is never visible.
        let mut references_file = String::new();
        for reference in references {
            references_file.push_str(reference);
            references_file.push('\n');
        }
        write_atomic(&self.references_path(&path), references_file.as_bytes())?;
        write_atomic(&real_path, contents)?;

        debug!(%path, "added");

        Ok(path)
    }

    fn read_text(&self, path: &StorePath) -> Result<Option<Vec<u8>>, Error> {
        let real_path = self.real_path(path);
        match fs::read(&real_path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::Io {
                path: real_path,
                source,
            }),
        }
    }
}
