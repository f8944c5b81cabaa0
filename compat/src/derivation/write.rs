//! This module implements the serialisation of derivations into the
//! [ATerm][] representation.
//!
//! All maps are written in ascending key order, which together with the
//! canonical term rendering makes the output a stable input for content
//! addressing.
//!
//! [ATerm]: http://program-transformation.org/Tools/ATermFormat.html
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::aterm::Term;
use crate::derivation::state::{
    runtime_state_args_to_wire, state_identifier_to_wire, ShareType, StateOutput, StateOutputDir,
    Synchronization,
};
use crate::derivation::{Derivation, Output};

/// Name of the application both derivation productions use.
pub const DERIVE: &str = "Derive";

/// Decides which production a [Derivation] is written in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GrammarPolicy {
    /// The state-extended production is used iff the derivation carries a
    /// [StateExtension], even an empty one. Parsing the result yields the
    /// same derivation.
    #[default]
    Declared,
    /// The state-extended production is used iff some state output has
    /// `enabled` set to `true`. Otherwise the state fields are left out, and
    /// are lost on a round trip.
    EnabledStateOnly,
}

fn output_term(id: &str, output: &Output) -> Term {
    Term::tuple(vec![
        Term::string(id),
        Term::string(output.path.as_str()),
        Term::string(output.hash_algo.as_str()),
        Term::string(output.hash.as_str()),
    ])
}

fn state_output_term(id: &str, s: &StateOutput) -> Term {
    Term::tuple(vec![
        Term::string(id),
        Term::string(s.statepath.as_str()),
        Term::string(s.component_hash.as_str()),
        Term::string(s.hash_algo.as_str()),
        Term::string(s.hash.as_str()),
        Term::string(state_identifier_to_wire(&s.state_identifier)),
        Term::string(s.enabled.as_str()),
        Term::string(s.share_type.as_ref().map(ShareType::as_str).unwrap_or_default()),
        Term::string(
            s.synchronization
                .as_ref()
                .map(Synchronization::as_str)
                .unwrap_or_default(),
        ),
        Term::string(s.create_dirs_before_install.as_str()),
        Term::string(runtime_state_args_to_wire(&s.runtime_state_args)),
        Term::string(s.username.as_str()),
        Term::string(s.shared_state.as_str()),
        Term::string(s.external_state.as_str()),
    ])
}

fn state_output_dir_term(path: &str, dir: &StateOutputDir) -> Term {
    Term::tuple(vec![
        Term::string(path),
        Term::string(dir.kind.as_str()),
        Term::string(dir.interval.as_str()),
    ])
}

fn input_derivation_term(path: &str, output_names: &BTreeSet<String>) -> Term {
    Term::tuple(vec![
        Term::string(path),
        Term::string_list(output_names.iter().map(String::as_str)),
    ])
}

fn map_term<V>(map: &BTreeMap<String, V>, f: impl Fn(&str, &V) -> Term) -> Term {
    Term::List(map.iter().map(|(k, v)| f(k.as_str(), v)).collect())
}

impl Derivation {
    /// Returns whether `policy` selects the state-extended production for
    /// this derivation.
    pub fn uses_state_grammar(&self, policy: GrammarPolicy) -> bool {
        match (&self.state, policy) {
            (None, _) => false,
            (Some(_), GrammarPolicy::Declared) => true,
            (Some(state), GrammarPolicy::EnabledStateOnly) => state.any_enabled(),
        }
    }

    /// Encodes the derivation as a [Term], using [GrammarPolicy::Declared].
    pub fn to_term(&self) -> Term {
        self.to_term_with(GrammarPolicy::Declared)
    }

    /// Encodes the derivation as a [Term], letting `policy` pick the
    /// production.
    pub fn to_term_with(&self, policy: GrammarPolicy) -> Term {
        let outputs = map_term(&self.outputs, output_term);
        let input_derivations = map_term(&self.input_derivations, input_derivation_term);
        let input_sources = Term::string_list(self.input_sources.iter().map(String::as_str));
        let platform = Term::string(self.platform.as_str());
        let builder = Term::string(self.builder.as_str());
        let arguments = Term::string_list(self.arguments.iter().map(String::as_str));
        let environment = map_term(&self.environment, |k, v| {
            Term::tuple(vec![Term::string(k), Term::string(v.as_str())])
        });

        let with_state = self.uses_state_grammar(policy);
        debug!(?policy, with_state, "selected derivation production");

        let state = match &self.state {
            Some(state) if with_state => state,
            _ => {
                return Term::appl(
                    DERIVE,
                    vec![
                        outputs,
                        input_derivations,
                        input_sources,
                        platform,
                        builder,
                        arguments,
                        environment,
                    ],
                )
            }
        };

        Term::appl(
            DERIVE,
            vec![
                outputs,
                map_term(&state.state_outputs, state_output_term),
                map_term(&state.state_output_dirs, state_output_dir_term),
                input_derivations,
                input_sources,
                platform,
                builder,
                arguments,
                environment,
            ],
        )
    }

    /// Returns the ATerm serialization, using [GrammarPolicy::Declared].
    pub fn to_aterm_bytes(&self) -> Vec<u8> {
        self.to_term().to_bytes()
    }

    pub fn to_aterm_bytes_with(&self, policy: GrammarPolicy) -> Vec<u8> {
        self.to_term_with(policy).to_bytes()
    }
}
