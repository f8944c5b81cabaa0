use crate::derivation::{check_path, Derivation, DerivationError, DRV_EXTENSION};
use crate::nixhash;

impl Derivation {
    /// validate ensures a Derivation struct is properly populated,
    /// and returns a [DerivationError] if not.
    ///
    /// Parsing doesn't run these checks, so a derivation read from a store
    /// that was written under different rules still parses.
    pub fn validate(&self) -> Result<(), DerivationError> {
        if self.outputs.is_empty() {
            return Err(DerivationError::NoOutputs());
        }

        for (output_name, output) in &self.outputs {
            check_path(&output.path)
                .map_err(|e| DerivationError::InvalidOutputPath(output_name.to_string(), e))?;

            // hash_algo and hash are either both set, or both empty.
            if output.hash_algo.is_empty() != output.hash.is_empty() {
                return Err(DerivationError::IncompleteFixedOutput(
                    output_name.to_string(),
                ));
            }

            if output.is_fixed() {
                nixhash::parse_output_hash_algo(&output.hash_algo).map_err(|e| {
                    DerivationError::InvalidOutputHashAlgo(output_name.to_string(), e)
                })?;
            }
        }

        for (input_derivation_path, output_names) in &self.input_derivations {
            check_path(input_derivation_path)
                .map_err(DerivationError::InvalidInputDerivationPath)?;

            if !input_derivation_path.ends_with(DRV_EXTENSION) {
                return Err(DerivationError::InvalidInputDerivationSuffix(
                    input_derivation_path.to_string(),
                ));
            }

            if output_names.is_empty() {
                return Err(DerivationError::EmptyInputDerivationOutputNames(
                    input_derivation_path.to_string(),
                ));
            }
        }

        for input_source in self.input_sources.iter() {
            check_path(input_source).map_err(DerivationError::InvalidInputSourcePath)?;
        }

        if let Some(state) = &self.state {
            for (id, state_output) in &state.state_outputs {
                state_output
                    .validate()
                    .map_err(|e| DerivationError::InvalidStateOutput(id.to_string(), e))?;
            }

            for (path, dir) in &state.state_output_dirs {
                dir.validate()
                    .map_err(|e| DerivationError::InvalidStateOutputDirType(path.to_string(), e))?;
                dir.interval()
                    .map_err(|e| DerivationError::InvalidStateOutputDir(path.to_string(), e))?;
            }
        }

        Ok(())
    }
}
