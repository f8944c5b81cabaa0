use serde::{Deserialize, Serialize};

use crate::derivation::{check_path, MalformedPathError};

/// References the derivation output.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Absolute path of the build result.
    pub path: String,

    /// Empty for outputs that aren't fixed-output, else the hash algo,
    /// optionally prefixed with `r:`.
    #[serde(rename = "hashAlgo", default, skip_serializing_if = "String::is_empty")]
    pub hash_algo: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

impl Output {
    /// Constructs a non-fixed output at `path`, which needs to be absolute.
    pub fn new<S: Into<String>>(path: S) -> Result<Self, MalformedPathError> {
        let path = path.into();
        check_path(&path)?;
        Ok(Self {
            path,
            ..Default::default()
        })
    }

    pub fn is_fixed(&self) -> bool {
        !self.hash_algo.is_empty()
    }
}
