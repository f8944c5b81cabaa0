use crate::aterm::Term;
use crate::nixhash::{hash_string, HashAlgo, NixHash};
use crate::store_path::{self, build_text_path, StoreDir, StorePath};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

mod errors;
mod output;
mod parser;
mod persist;
mod state;
mod validate;
mod write;

#[cfg(test)]
mod tests;

// Public API of the crate.
pub use errors::{
    DerivationError, MalformedPathError, MalformedTermError, ParseError, TermErrorKind,
};
pub use output::Output;
pub use persist::{read_derivation, write_derivation, ReadError};
pub use state::{
    string_to_bool, IntervalError, ShareType, StateDirType, StateExtension, StateOutput,
    StateOutputDir, StateOutputParams, Synchronization, ValidationError,
};
pub use write::{GrammarPolicy, DERIVE};

/// The file extension of derivations in the store.
pub const DRV_EXTENSION: &str = ".drv";

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Derivation {
    #[serde(rename = "args")]
    pub arguments: Vec<String>,

    pub builder: String,

    #[serde(rename = "env")]
    pub environment: BTreeMap<String, String>,

    #[serde(rename = "inputDrvs")]
    pub input_derivations: BTreeMap<String, BTreeSet<String>>,

    #[serde(rename = "inputSrcs")]
    pub input_sources: BTreeSet<String>,

    pub outputs: BTreeMap<String, Output>,

    pub platform: String,

    /// Present iff the derivation uses the state-extended grammar.
    #[serde(flatten)]
    pub state: Option<StateExtension>,
}

impl Derivation {
    /// The store paths the serialized derivation refers to: all
    /// [Derivation::input_sources], and the keys of
    /// [Derivation::input_derivations].
    ///
    /// Outputs are never references, they might not exist yet.
    pub fn references(&self) -> BTreeSet<String> {
        let mut references = self.input_sources.clone();
        references.extend(self.input_derivations.keys().cloned());
        references
    }

    /// Returns the drv path of a [Derivation] struct, without writing it
    /// anywhere.
    ///
    /// The drv path is calculated by invoking [build_text_path], using
    /// the `name` with a `.drv` suffix as name, [Derivation::references] as
    /// references, and the ATerm string of the [Derivation] as content.
    pub fn calculate_derivation_path(
        &self,
        store_dir: &StoreDir,
        name: &str,
    ) -> Result<StorePath, store_path::Error> {
        build_text_path(
            store_dir,
            &format!("{}{}", name, DRV_EXTENSION),
            self.to_aterm_bytes(),
            self.references(),
        )
    }

    /// Returns a copy with the runtime parameters of every state output
    /// cleared, see [StateOutput::clear_runtime_parameters].
    pub fn without_state_runtime_parameters(&self) -> Derivation {
        let mut drv = self.clone();
        if let Some(state) = drv.state.as_mut() {
            for state_output in state.state_outputs.values_mut() {
                state_output.clear_runtime_parameters();
            }
        }
        drv
    }

    /// Hashes the derivation with runtime-only state metadata cleared, so two
    /// derivations differing only in e.g. their state paths or lock policy
    /// hash the same.
    pub fn state_invariant_hash(&self) -> NixHash {
        hash_term(&self.without_state_runtime_parameters().to_term())
    }
}

/// Computes the sha256 [NixHash] of the rendered term.
pub fn hash_term(term: &Term) -> NixHash {
    hash_string(HashAlgo::Sha256, term.to_bytes())
}

/// Returns true iff `file_name` ends with [DRV_EXTENSION].
pub fn is_derivation(file_name: &str) -> bool {
    file_name.ends_with(DRV_EXTENSION)
}

/// Fails unless `s` is an absolute path.
pub fn check_path(s: &str) -> Result<(), MalformedPathError> {
    if !s.starts_with('/') {
        return Err(MalformedPathError(s.to_string()));
    }
    Ok(())
}
