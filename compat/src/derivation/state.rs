//! The state extension of a derivation: outputs that carry a mutable,
//! runtime-managed directory, and the directories maintained for them.
//!
//! Only the data model, its validation and normalization live here. Acquiring
//! the locks described by [Synchronization] or materializing shared state is
//! up to whoever consumes the derivation.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire value of a state identifier that was not supplied.
pub(crate) const EMPTY_STATE_IDENTIFIER: &str = "__EMPTY__";
/// Reserved to denote "no state", never a valid identifier.
pub(crate) const NO_STATE_IDENTIFIER: &str = "__NOSTATE__";
/// Wire value of absent runtime state arguments.
pub(crate) const NO_RUNTIME_STATE_ARGS: &str = "__NOARGS__";

/// Coerces the boolean-as-string fields of a state output.
///
/// Only the exact string `true` is true, anything else (`TRUE`, `1`, the
/// empty string) is false.
pub fn string_to_bool(s: &str) -> bool {
    s == "true"
}

/// Errors raised when a state output or a state output dir violates one of
/// its invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid share type `{0}', must be one of none, full, group")]
    InvalidShareType(String),
    #[error(
        "invalid synchronization `{0}', must be one of none, exclusive-lock, recursive-exclusive-lock"
    )]
    InvalidSynchronization(String),
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("state identifier `{0}' is reserved")]
    ReservedStateIdentifier(String),
    #[error("runtime state args must not be `__NOARGS__'")]
    ReservedRuntimeStateArgs,
    #[error("shared state and external state can't both be set")]
    SharedAndExternalState,
    #[error("invalid state dir type `{0}', must be one of none, manual, interval, full")]
    InvalidStateDirType(String),
}

/// The interval of a [StateOutputDir] is not a non-negative integer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("interval is not a number: `{0}'")]
pub struct IntervalError(pub String);

/// Whether the state of an output is private, shared by all instances, or
/// shared within a group.
///
/// [ShareType::Other] keeps a value outside of that set as it was read, so
/// the parser stays total and such a value is only rejected on validation.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShareType {
    None,
    Full,
    Group,
    Other(String),
}

impl ShareType {
    /// Decodes a wire value, keeping unknown ones in [ShareType::Other].
    pub fn from_wire(s: &str) -> Self {
        match s {
            "none" => ShareType::None,
            "full" => ShareType::Full,
            "group" => ShareType::Group,
            other => ShareType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ShareType::None => "none",
            ShareType::Full => "full",
            ShareType::Group => "group",
            ShareType::Other(s) => s,
        }
    }
}

impl FromStr for ShareType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_wire(s) {
            ShareType::Other(s) => Err(ValidationError::InvalidShareType(s)),
            share_type => Ok(share_type),
        }
    }
}

impl From<String> for ShareType {
    fn from(s: String) -> Self {
        Self::from_wire(&s)
    }
}

impl From<ShareType> for String {
    fn from(share_type: ShareType) -> Self {
        share_type.as_str().to_string()
    }
}

impl fmt::Display for ShareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The locking discipline to apply when accessing the state path.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Synchronization {
    None,
    ExclusiveLock,
    RecursiveExclusiveLock,
    /// Unknown policy, kept verbatim.
    Other(String),
}

impl Synchronization {
    /// Decodes a wire value, keeping unknown ones in [Synchronization::Other].
    pub fn from_wire(s: &str) -> Self {
        match s {
            "none" => Synchronization::None,
            "exclusive-lock" => Synchronization::ExclusiveLock,
            "recursive-exclusive-lock" => Synchronization::RecursiveExclusiveLock,
            other => Synchronization::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Synchronization::None => "none",
            Synchronization::ExclusiveLock => "exclusive-lock",
            Synchronization::RecursiveExclusiveLock => "recursive-exclusive-lock",
            Synchronization::Other(s) => s,
        }
    }
}

impl FromStr for Synchronization {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_wire(s) {
            Synchronization::Other(s) => Err(ValidationError::InvalidSynchronization(s)),
            synchronization => Ok(synchronization),
        }
    }
}

impl From<String> for Synchronization {
    fn from(s: String) -> Self {
        Self::from_wire(&s)
    }
}

impl From<Synchronization> for String {
    fn from(synchronization: Synchronization) -> Self {
        synchronization.as_str().to_string()
    }
}

impl fmt::Display for Synchronization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a state directory is kept in sync.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StateDirType {
    None,
    Manual,
    Interval,
    Full,
    /// Unknown type, kept verbatim. This includes the empty string.
    Other(String),
}

impl StateDirType {
    /// Decodes a wire value, keeping unknown ones in [StateDirType::Other].
    pub fn from_wire(s: &str) -> Self {
        match s {
            "none" => StateDirType::None,
            "manual" => StateDirType::Manual,
            "interval" => StateDirType::Interval,
            "full" => StateDirType::Full,
            other => StateDirType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StateDirType::None => "none",
            StateDirType::Manual => "manual",
            StateDirType::Interval => "interval",
            StateDirType::Full => "full",
            StateDirType::Other(s) => s,
        }
    }
}

impl FromStr for StateDirType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_wire(s) {
            StateDirType::Other(s) => Err(ValidationError::InvalidStateDirType(s)),
            kind => Ok(kind),
        }
    }
}

impl From<String> for StateDirType {
    fn from(s: String) -> Self {
        Self::from_wire(&s)
    }
}

impl From<StateDirType> for String {
    fn from(kind: StateDirType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StateDirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untyped input to [StateOutput::new], one field per wire field.
///
/// `state_identifier` and `runtime_state_args` are `None` when not supplied.
#[derive(Clone, Debug, Default)]
pub struct StateOutputParams<'a> {
    pub statepath: &'a str,
    pub component_hash: &'a str,
    pub hash_algo: &'a str,
    pub hash: &'a str,
    pub state_identifier: Option<&'a str>,
    pub enabled: &'a str,
    pub share_type: &'a str,
    pub synchronization: &'a str,
    pub create_dirs_before_install: &'a str,
    pub runtime_state_args: Option<&'a str>,
    pub username: &'a str,
    pub shared_state: &'a str,
    pub external_state: &'a str,
}

/// A derivation output with a mutable state directory attached.
///
/// `share_type` and `synchronization` are only `None` after
/// [StateOutput::clear_runtime_parameters], or when parsed from a term that
/// had them blanked. Values outside the known set only come from parsing and
/// fail [StateOutput::validate].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOutput {
    pub statepath: String,
    pub component_hash: String,
    pub hash_algo: String,
    pub hash: String,
    pub state_identifier: Option<String>,
    pub enabled: String,
    pub share_type: Option<ShareType>,
    pub synchronization: Option<Synchronization>,
    pub create_dirs_before_install: String,
    pub runtime_state_args: Option<String>,
    pub username: String,
    pub shared_state: String,
    pub external_state: String,
}

impl StateOutput {
    /// Builds a [StateOutput], checking every invariant.
    ///
    /// Fails with the first violated rule, checked in this order: share
    /// type, synchronization, username, state identifier, runtime state
    /// args, shared/external exclusivity.
    pub fn new(params: StateOutputParams<'_>) -> Result<Self, ValidationError> {
        let share_type: ShareType = params.share_type.parse()?;
        let synchronization: Synchronization = params.synchronization.parse()?;

        let state_output = StateOutput {
            statepath: params.statepath.to_string(),
            component_hash: params.component_hash.to_string(),
            hash_algo: params.hash_algo.to_string(),
            hash: params.hash.to_string(),
            state_identifier: params.state_identifier.map(str::to_string),
            enabled: params.enabled.to_string(),
            share_type: Some(share_type),
            synchronization: Some(synchronization),
            create_dirs_before_install: params.create_dirs_before_install.to_string(),
            runtime_state_args: params.runtime_state_args.map(str::to_string),
            username: params.username.to_string(),
            shared_state: params.shared_state.to_string(),
            external_state: params.external_state.to_string(),
        };

        state_output.validate()?;

        Ok(state_output)
    }

    /// Checks the invariants of an already constructed value, in the same
    /// order as [StateOutput::new].
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.share_type {
            Some(ShareType::Other(s)) => {
                return Err(ValidationError::InvalidShareType(s.clone()));
            }
            None => return Err(ValidationError::InvalidShareType(String::new())),
            Some(_) => {}
        }
        match &self.synchronization {
            Some(Synchronization::Other(s)) => {
                return Err(ValidationError::InvalidSynchronization(s.clone()));
            }
            None => return Err(ValidationError::InvalidSynchronization(String::new())),
            Some(_) => {}
        }
        if self.username.is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if let Some(id) = &self.state_identifier {
            if id == EMPTY_STATE_IDENTIFIER || id == NO_STATE_IDENTIFIER {
                return Err(ValidationError::ReservedStateIdentifier(id.clone()));
            }
        }
        if self.runtime_state_args.as_deref() == Some(NO_RUNTIME_STATE_ARGS) {
            return Err(ValidationError::ReservedRuntimeStateArgs);
        }
        if !self.shared_state.is_empty() && !self.external_state.is_empty() {
            return Err(ValidationError::SharedAndExternalState);
        }

        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        string_to_bool(&self.enabled)
    }

    pub fn creates_dirs_before_install(&self) -> bool {
        string_to_bool(&self.create_dirs_before_install)
    }

    /// Blanks every field that only matters at runtime, so it can't influence
    /// a content hash. `hash_algo`, `hash`, `state_identifier` and
    /// `username` are kept.
    pub fn clear_runtime_parameters(&mut self) {
        self.statepath.clear();
        self.component_hash.clear();
        self.enabled.clear();
        self.share_type = None;
        self.synchronization = None;
        self.create_dirs_before_install.clear();
        self.runtime_state_args = Some(String::new());
        self.shared_state.clear();
        self.external_state.clear();
    }

    /// Like [StateOutput::clear_runtime_parameters], but returns a new value.
    pub fn without_runtime_parameters(&self) -> Self {
        let mut cleared = self.clone();
        cleared.clear_runtime_parameters();
        cleared
    }
}

/// A state directory, stored in [StateExtension::state_output_dirs] under its
/// path.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateOutputDir {
    #[serde(rename = "type")]
    pub kind: StateDirType,
    /// Synchronization interval, an integer as string. Empty means unused.
    #[serde(default)]
    pub interval: String,
}

impl StateOutputDir {
    /// Builds a [StateOutputDir], rejecting unknown directory types.
    ///
    /// The interval is kept as is, see [StateOutputDir::interval].
    pub fn new(kind: &str, interval: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            kind: kind.parse()?,
            interval: interval.to_string(),
        })
    }

    /// Rejects a directory type outside of the known set, as read by the
    /// parser.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.kind {
            StateDirType::Other(s) => Err(ValidationError::InvalidStateDirType(s.clone())),
            _ => Ok(()),
        }
    }

    pub fn interval(&self) -> Result<u64, IntervalError> {
        if self.interval.is_empty() {
            return Ok(0);
        }
        self.interval
            .parse()
            .map_err(|_| IntervalError(self.interval.clone()))
    }
}

/// The state related parts of a derivation. A derivation carrying one is
/// written in the state-extended grammar.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateExtension {
    #[serde(rename = "stateOutputs")]
    pub state_outputs: BTreeMap<String, StateOutput>,

    /// Keyed by the directory path.
    #[serde(rename = "stateOutputDirs")]
    pub state_output_dirs: BTreeMap<String, StateOutputDir>,
}

impl StateExtension {
    /// Whether any state output has `enabled` set to `true`.
    pub fn any_enabled(&self) -> bool {
        self.state_outputs.values().any(StateOutput::is_enabled)
    }
}

pub(crate) fn state_identifier_to_wire(id: &Option<String>) -> &str {
    id.as_deref().unwrap_or(EMPTY_STATE_IDENTIFIER)
}

pub(crate) fn state_identifier_from_wire(s: &str) -> Option<String> {
    (s != EMPTY_STATE_IDENTIFIER).then(|| s.to_string())
}

pub(crate) fn runtime_state_args_to_wire(args: &Option<String>) -> &str {
    args.as_deref().unwrap_or(NO_RUNTIME_STATE_ARGS)
}

pub(crate) fn runtime_state_args_from_wire(s: &str) -> Option<String> {
    (s != NO_RUNTIME_STATE_ARGS).then(|| s.to_string())
}
