use tracing::warn;

use crate::derivation::GrammarPolicy;
use crate::store_path::{self, StoreDir};

/// Settings of the derivation writer, as stored in a `nix.conf`-style file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Settings {
    pub store_dir: StoreDir,
    /// Only compute derivation paths, never write to the store.
    pub read_only_mode: bool,
    pub state_grammar: GrammarPolicy,
}

impl Settings {
    /// Parses settings from a file with one `key = value` pair per line.
    /// Everything after a `#` is a comment. Keys that aren't set keep their
    /// default.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut out = Self::default();

        for line in input.lines() {
            // strip comments at the end of the line
            let line = match line.split_once('#') {
                Some((line, _comment)) => line,
                None => line,
            };

            // skip comments and empty lines
            if line.trim().is_empty() {
                continue;
            }

            let (tag, val) = line
                .split_once('=')
                .ok_or_else(|| Error::InvalidLine(line.to_string()))?;

            // trim whitespace
            let tag = tag.trim();
            let val = val.trim();

            match tag {
                "store-dir" => {
                    out.store_dir = StoreDir::new(val).map_err(Error::InvalidStoreDir)?;
                }
                "read-only-mode" => {
                    out.read_only_mode = val
                        .parse()
                        .map_err(|_| Error::InvalidValue(tag.to_string(), val.to_string()))?;
                }
                "state-grammar" => {
                    out.state_grammar = parse_grammar_policy(val)
                        .ok_or_else(|| Error::InvalidValue(tag.to_string(), val.to_string()))?;
                    if out.state_grammar == GrammarPolicy::EnabledStateOnly {
                        warn!("state-grammar = enabled-state-only drops disabled state outputs when writing derivations");
                    }
                }
                _ => return Err(Error::UnrecognizedKey(tag.to_string())),
            }
        }

        Ok(out)
    }
}

fn parse_grammar_policy(s: &str) -> Option<GrammarPolicy> {
    match s {
        "declared" => Some(GrammarPolicy::Declared),
        "enabled-state-only" => Some(GrammarPolicy::EnabledStateOnly),
        _ => None,
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid line: {0}")]
    InvalidLine(String),
    #[error("Unrecognized key: {0}")]
    UnrecognizedKey(String),
    #[error("Invalid value '{1}' for key '{0}'")]
    InvalidValue(String, String),
    #[error("Invalid store dir: {0}")]
    InvalidStoreDir(store_path::Error),
}
