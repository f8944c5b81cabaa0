use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument};

use super::{Error, Store};
use crate::store_path::{StoreDir, StorePath};

#[derive(Clone, Debug)]
struct Entry {
    contents: Vec<u8>,
    references: BTreeSet<String>,
}

/// A [Store] keeping everything in memory. Clones share their contents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    store_dir: StoreDir,
    db: Arc<RwLock<HashMap<StorePath, Entry>>>,
}

impl MemoryStore {
    pub fn new(store_dir: StoreDir) -> Self {
        Self {
            store_dir,
            db: Default::default(),
        }
    }

    /// Returns the references recorded for `path`, if it's in the store.
    pub fn references(&self, path: &StorePath) -> Option<BTreeSet<String>> {
        self.db.read().get(path).map(|e| e.references.clone())
    }

    pub fn len(&self) -> usize {
        self.db.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.read().is_empty()
    }
}

impl Store for MemoryStore {
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

        let mut db = self.db.write();
        if db.contains_key(&path) {
            debug!(%path, "already present");
        } else {
            db.insert(
                path.clone(),
                Entry {
                    contents: contents.to_vec(),
                    references: references.clone(),
                },
            );
        }

        Ok(path)
    }

    fn read_text(&self, path: &StorePath) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.db.read().get(path).map(|e| e.contents.clone()))
    }
}
