//! Contains the error types of the derivation module.
use thiserror::Error;

use crate::aterm::{SyntaxError, Term};
use crate::nixhash;

use super::state::{IntervalError, ValidationError};

/// Errors that can occur while turning ATerm input into a
/// [crate::derivation::Derivation].
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("parsing error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    MalformedTerm(#[from] MalformedTermError),
    #[error(transparent)]
    MalformedPath(#[from] MalformedPathError),
}

/// A term doesn't have the shape the derivation grammar expects.
/// Carries the offending term for diagnostics.
#[derive(Debug, Error, PartialEq)]
#[error("{kind}: {term}")]
pub struct MalformedTermError {
    pub kind: TermErrorKind,
    pub term: Term,
}

impl MalformedTermError {
    pub(crate) fn new(kind: TermErrorKind, term: &Term) -> Self {
        Self {
            kind,
            term: term.clone(),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TermErrorKind {
    #[error("not a valid derivation")]
    NotADerivation,
    #[error("not a path")]
    NotAPath,
    #[error("string expected")]
    StringExpected,
    #[error("tuple of strings expected")]
    TupleOfStringsExpected,
}

/// A value that needs to be an absolute path is empty, or doesn't start
/// with `/`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("bad path `{0}' in derivation")]
pub struct MalformedPathError(pub String);

/// Errors that can occur during the validation of Derivation structs.
#[derive(Debug, Error, PartialEq)]
pub enum DerivationError {
    #[error("no outputs defined")]
    NoOutputs(),
    #[error("invalid output {0}: {1}")]
    InvalidOutputPath(String, MalformedPathError),
    #[error("invalid hash algo of output {0}: {1}")]
    InvalidOutputHashAlgo(String, nixhash::Error),
    #[error("output {0} has a hash algo, but no hash (or the other way round)")]
    IncompleteFixedOutput(String),
    #[error("invalid input derivation: {0}")]
    InvalidInputDerivationPath(MalformedPathError),
    #[error("input derivation {0} doesn't end with .drv")]
    InvalidInputDerivationSuffix(String),
    #[error("input derivation {0} output names are empty")]
    EmptyInputDerivationOutputNames(String),
    #[error("invalid input source: {0}")]
    InvalidInputSourcePath(MalformedPathError),
    #[error("invalid state output {0}: {1}")]
    InvalidStateOutput(String, ValidationError),
    #[error("invalid state output dir {0}: {1}")]
    InvalidStateOutputDirType(String, ValidationError),
    #[error("invalid state output dir {0}: {1}")]
    InvalidStateOutputDir(String, IntervalError),
}
