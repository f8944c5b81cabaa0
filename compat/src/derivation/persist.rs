//! Moving derivations in and out of a [Store].
use thiserror::Error;
use tracing::{debug, instrument};

use crate::conf::Settings;
use crate::derivation::{is_derivation, Derivation, ParseError, DRV_EXTENSION};
use crate::store::{self, Store};
use crate::store_path::StorePath;

/// Errors that can occur when reading a derivation back from a [Store].
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("{0} is not a derivation")]
    NotADerivation(StorePath),
    #[error("{0} is not in the store")]
    NotFound(StorePath),
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error("unable to parse derivation {0}: {1}")]
    Parse(StorePath, ParseError),
}

/// Writes `drv` to `store` as `<name>.drv`, and returns its path.
///
/// The contents are rendered with the configured grammar policy, and refer
/// to [Derivation::references]. In read-only mode nothing is written, and
/// the path the derivation would get is returned.
#[instrument(skip_all, fields(name = name, read_only = settings.read_only_mode), err)]
pub fn write_derivation<S: Store + ?Sized>(
    store: &S,
    settings: &Settings,
    drv: &Derivation,
    name: &str,
) -> Result<StorePath, store::Error> {
    let references = drv.references();
    let suffix = format!("{}{}", name, DRV_EXTENSION);
    let contents = drv.to_aterm_bytes_with(settings.state_grammar);

    let path = if settings.read_only_mode {
        store.compute_store_path_for_text(&suffix, &contents, &references)?
    } else {
        store.add_text_to_store(&suffix, &contents, &references)?
    };

    debug!(drv_path = %path, "wrote derivation");

    Ok(path)
}

/// Reads the derivation at `path` from `store` and parses it.
#[instrument(skip_all, fields(path = %path), err)]
pub fn read_derivation<S: Store + ?Sized>(
    store: &S,
    path: &StorePath,
) -> Result<Derivation, ReadError> {
    if !is_derivation(path.name()) {
        return Err(ReadError::NotADerivation(path.clone()));
    }

    let contents = store
        .read_text(path)?
        .ok_or_else(|| ReadError::NotFound(path.clone()))?;

    Derivation::from_aterm_bytes(&contents).map_err(|e| ReadError::Parse(path.clone(), e))
}
