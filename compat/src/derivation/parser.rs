//! Decodes a [Term] into a [Derivation].
//!
//! Two productions are recognized, both applications of `Derive`: the
//! state-extended one with nine arguments, and the plain one with seven.
//! State outputs aren't validated here, see [Derivation::validate]. Share
//! types, synchronization policies and state dir types outside the known
//! sets are kept as read.
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::aterm::Term;
use crate::derivation::errors::{MalformedTermError, ParseError, TermErrorKind};
use crate::derivation::state::{
    runtime_state_args_from_wire, state_identifier_from_wire, ShareType, StateDirType,
    StateExtension, StateOutput, StateOutputDir, Synchronization,
};
use crate::derivation::write::DERIVE;
use crate::derivation::{check_path, Derivation, Output};

/// The arguments of a matched `Derive` application, by role.
struct DeriveArgs<'a> {
    outputs: &'a [Term],
    state: Option<(&'a [Term], &'a [Term])>,
    input_derivations: &'a [Term],
    input_sources: &'a [Term],
    platform: &'a Term,
    builder: &'a Term,
    arguments: &'a [Term],
    environment: &'a [Term],
}

fn match_derive(term: &Term) -> Option<DeriveArgs<'_>> {
    if let Some(args) = term.as_appl(DERIVE, 9) {
        return Some(DeriveArgs {
            outputs: args[0].as_list()?,
            state: Some((args[1].as_list()?, args[2].as_list()?)),
            input_derivations: args[3].as_list()?,
            input_sources: args[4].as_list()?,
            platform: &args[5],
            builder: &args[6],
            arguments: args[7].as_list()?,
            environment: args[8].as_list()?,
        });
    }

    let args = term.as_appl(DERIVE, 7)?;
    Some(DeriveArgs {
        outputs: args[0].as_list()?,
        state: None,
        input_derivations: args[1].as_list()?,
        input_sources: args[2].as_list()?,
        platform: &args[3],
        builder: &args[4],
        arguments: args[5].as_list()?,
        environment: args[6].as_list()?,
    })
}

fn malformed(kind: TermErrorKind, term: &Term) -> ParseError {
    MalformedTermError::new(kind, term).into()
}

fn parse_string(term: &Term, kind: TermErrorKind) -> Result<String, ParseError> {
    term.as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(kind, term))
}

/// Collects a list of strings into a set, checking each is an absolute path
/// if `are_paths` is set.
fn parse_strings(elems: &[Term], are_paths: bool) -> Result<BTreeSet<String>, ParseError> {
    let mut out = BTreeSet::new();
    for elem in elems {
        let s = parse_string(elem, TermErrorKind::NotAPath)?;
        if are_paths {
            check_path(&s)?;
        }
        out.insert(s);
    }
    Ok(out)
}

fn parse_outputs(drv: &Term, elems: &[Term]) -> Result<BTreeMap<String, Output>, ParseError> {
    let mut outputs = BTreeMap::new();
    for elem in elems {
        let [id, path, hash_algo, hash] = elem
            .as_string_tuple::<4>()
            .ok_or_else(|| malformed(TermErrorKind::NotADerivation, drv))?;
        check_path(path)?;
        outputs.insert(
            id.to_string(),
            Output {
                path: path.to_string(),
                hash_algo: hash_algo.to_string(),
                hash: hash.to_string(),
            },
        );
    }
    Ok(outputs)
}

fn parse_state_output(drv: &Term, elem: &Term) -> Result<(String, StateOutput), ParseError> {
    let [id, statepath, component_hash, hash_algo, hash, state_identifier, enabled, share_type, synchronization, create_dirs_before_install, runtime_state_args, username, shared_state, external_state] =
        elem.as_string_tuple::<14>()
            .ok_or_else(|| malformed(TermErrorKind::NotADerivation, drv))?;

    // blank policy fields are what clearing runtime parameters leaves behind.
    let share_type = (!share_type.is_empty()).then(|| ShareType::from_wire(share_type));
    let synchronization =
        (!synchronization.is_empty()).then(|| Synchronization::from_wire(synchronization));

    Ok((
        id.to_string(),
        StateOutput {
            statepath: statepath.to_string(),
            component_hash: component_hash.to_string(),
            hash_algo: hash_algo.to_string(),
            hash: hash.to_string(),
            state_identifier: state_identifier_from_wire(state_identifier),
            enabled: enabled.to_string(),
            share_type,
            synchronization,
            create_dirs_before_install: create_dirs_before_install.to_string(),
            runtime_state_args: runtime_state_args_from_wire(runtime_state_args),
            username: username.to_string(),
            shared_state: shared_state.to_string(),
            external_state: external_state.to_string(),
        },
    ))
}

fn parse_state(
    drv: &Term,
    state_outputs: &[Term],
    state_output_dirs: &[Term],
) -> Result<StateExtension, ParseError> {
    let mut state = StateExtension::default();

    for elem in state_outputs {
        let (id, state_output) = parse_state_output(drv, elem)?;
        state.state_outputs.insert(id, state_output);
    }

    for elem in state_output_dirs {
        let [path, kind, interval] = elem
            .as_string_tuple::<3>()
            .ok_or_else(|| malformed(TermErrorKind::NotADerivation, drv))?;
        state.state_output_dirs.insert(
            path.to_string(),
            StateOutputDir {
                kind: StateDirType::from_wire(kind),
                interval: interval.to_string(),
            },
        );
    }

    Ok(state)
}

fn parse_input_derivations(
    drv: &Term,
    elems: &[Term],
) -> Result<BTreeMap<String, BTreeSet<String>>, ParseError> {
    let mut input_derivations = BTreeMap::new();
    for elem in elems {
        let (path, ids) = elem
            .as_tuple(2)
            .and_then(|args| Some((args[0].as_str()?, args[1].as_list()?)))
            .ok_or_else(|| malformed(TermErrorKind::NotADerivation, drv))?;
        check_path(path)?;
        input_derivations.insert(path.to_string(), parse_strings(ids, false)?);
    }
    Ok(input_derivations)
}

fn parse_environment(elems: &[Term]) -> Result<BTreeMap<String, String>, ParseError> {
    let mut environment = BTreeMap::new();
    for elem in elems {
        let [k, v] = elem
            .as_string_tuple::<2>()
            .ok_or_else(|| malformed(TermErrorKind::TupleOfStringsExpected, elem))?;
        environment.insert(k.to_string(), v.to_string());
    }
    Ok(environment)
}

impl Derivation {
    /// Decodes a [Term] into a [Derivation], failing on the first element
    /// that doesn't have the expected shape.
    pub fn from_term(term: &Term) -> Result<Derivation, ParseError> {
        let args = match_derive(term).ok_or_else(|| malformed(TermErrorKind::NotADerivation, term))?;

        let outputs = parse_outputs(term, args.outputs)?;

        let state = match args.state {
            Some((state_outputs, state_output_dirs)) => {
                Some(parse_state(term, state_outputs, state_output_dirs)?)
            }
            None => None,
        };
        debug!(with_state = state.is_some(), "matched derivation production");

        let input_derivations = parse_input_derivations(term, args.input_derivations)?;
        let input_sources = parse_strings(args.input_sources, true)?;

        let builder = parse_string(args.builder, TermErrorKind::StringExpected)?;
        let platform = parse_string(args.platform, TermErrorKind::StringExpected)?;

        let arguments = args
            .arguments
            .iter()
            .map(|arg| parse_string(arg, TermErrorKind::StringExpected))
            .collect::<Result<Vec<_>, _>>()?;

        let environment = parse_environment(args.environment)?;

        Ok(Derivation {
            arguments,
            builder,
            environment,
            input_derivations,
            input_sources,
            outputs,
            platform,
            state,
        })
    }

    /// Parses the ATerm text of a derivation.
    pub fn from_aterm_bytes(b: &[u8]) -> Result<Derivation, ParseError> {
        let term = crate::aterm::parse(b)?;
        Self::from_term(&term)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::aterm::Term;
    use crate::derivation::{
        Derivation, MalformedPathError, MalformedTermError, ParseError, ShareType, StateDirType,
        Synchronization, TermErrorKind,
    };

    const PLAIN: &[u8] = br#"Derive([("out","/store/abc-name","","")],[("/store/def-dep.drv",["dev","out"])],["/store/src1"],"x86_64-linux","/bin/sh",["-c","true"],[("a","1"),("a","2"),("out","/store/abc-name")])"#;

    #[test]
    fn parse_plain() {
        let drv = Derivation::from_aterm_bytes(PLAIN).expect("must parse");

        assert!(drv.state.is_none());
        assert_eq!("/store/abc-name", drv.outputs["out"].path);
        assert!(!drv.outputs["out"].is_fixed());
        assert_eq!(
            BTreeSet::from(["dev".to_string(), "out".to_string()]),
            drv.input_derivations["/store/def-dep.drv"]
        );
        assert_eq!(BTreeSet::from(["/store/src1".to_string()]), drv.input_sources);
        assert_eq!("x86_64-linux", drv.platform);
        assert_eq!("/bin/sh", drv.builder);
        assert_eq!(vec!["-c", "true"], drv.arguments);
        // later bindings win
        assert_eq!("2", drv.environment["a"]);
    }

    #[test]
    fn parse_with_state() {
        let input = br#"Derive([("out","/store/abc-name","","")],[("out","/state/abc-name","abc","","","__EMPTY__","true","group","recursive-exclusive-lock","false","__NOARGS__","alice","","")],[("/state/abc-name/log","interval","3600")],[],[],"x86_64-linux","/bin/sh",[],[])"#;
        let drv = Derivation::from_aterm_bytes(input).expect("must parse");

        let state = drv.state.expect("must have state");
        let out = &state.state_outputs["out"];
        assert_eq!(None, out.state_identifier);
        assert_eq!(None, out.runtime_state_args);
        assert_eq!(Some(ShareType::Group), out.share_type);
        assert!(out.is_enabled());

        let dir = &state.state_output_dirs["/state/abc-name/log"];
        assert_eq!(Ok(3600), dir.interval());
    }

    #[test]
    fn parse_blank_policy_fields() {
        let input = br#"Derive([],[("out","","","","","db","","","","","","alice","","")],[],[],[],"","",[],[])"#;
        let drv = Derivation::from_aterm_bytes(input).expect("must parse");

        let state = drv.state.expect("must have state");
        let out = &state.state_outputs["out"];
        assert_eq!(None, out.share_type);
        assert_eq!(None, out.synchronization);
        assert_eq!(Some("".to_string()), out.runtime_state_args);
        assert_eq!(Some("db".to_string()), out.state_identifier);
    }

    #[rstest]
    #[case::wrong_name(br#"Derivation([],[],[],"","",[],[])"#)]
    #[case::wrong_arity(br#"Derive([],[],[],"","",[])"#)]
    #[case::list_expected(br#"Derive("",[],[],"","",[],[])"#)]
    #[case::output_arity(br#"Derive([("out","/store/abc-name","")],[],[],"","",[],[])"#)]
    #[case::input_drv_shape(br#"Derive([],[("/store/def-dep.drv","out")],[],"","",[],[])"#)]
    #[case::not_an_appl(br#"["Derive"]"#)]
    fn not_a_derivation(#[case] input: &[u8]) {
        match Derivation::from_aterm_bytes(input).expect_err("must fail") {
            ParseError::MalformedTerm(MalformedTermError {
                kind: TermErrorKind::NotADerivation,
                ..
            }) => {}
            e => panic!("unexpected error: {e}"),
        }
    }

    #[rstest]
    #[case::output_path(br#"Derive([("out","abc-name","","")],[],[],"","",[],[])"#, "abc-name")]
    #[case::empty_output_path(br#"Derive([("out","","","")],[],[],"","",[],[])"#, "")]
    #[case::input_drv(br#"Derive([],[("def-dep.drv",["out"])],[],"","",[],[])"#, "def-dep.drv")]
    #[case::input_src(br#"Derive([],[],["src1"],"","",[],[])"#, "src1")]
    fn bad_path(#[case] input: &[u8], #[case] path: &str) {
        assert_eq!(
            ParseError::MalformedPath(MalformedPathError(path.to_string())),
            Derivation::from_aterm_bytes(input).expect_err("must fail")
        );
    }

    /// Builder, platform and input derivation output names aren't paths.
    #[test]
    fn no_path_check() {
        let input = br#"Derive([],[("/store/def-dep.drv",["out"])],[],"linux","sh",[],[])"#;
        let drv = Derivation::from_aterm_bytes(input).expect("must parse");
        assert_eq!("sh", drv.builder);
        assert_eq!("linux", drv.platform);
    }

    #[rstest]
    #[case::arg(br#"Derive([],[],[],"","",[[]],[])"#, TermErrorKind::StringExpected, Term::List(vec![]))]
    #[case::builder(br#"Derive([],[],[],"",[],[],[])"#, TermErrorKind::StringExpected, Term::List(vec![]))]
    #[case::env(
        br#"Derive([],[],[],"","",[],[("a","b","c")])"#,
        TermErrorKind::TupleOfStringsExpected,
        Term::tuple(vec![Term::string("a"), Term::string("b"), Term::string("c")])
    )]
    #[case::input_src(br#"Derive([],[],[("a")],"","",[],[])"#, TermErrorKind::NotAPath, Term::tuple(vec![Term::string("a")]))]
    fn malformed_element(#[case] input: &[u8], #[case] kind: TermErrorKind, #[case] term: Term) {
        assert_eq!(
            ParseError::MalformedTerm(MalformedTermError { kind, term }),
            Derivation::from_aterm_bytes(input).expect_err("must fail")
        );
    }

    /// Policy values this crate doesn't know are kept and written back as is.
    #[rstest]
    #[case::share_type(
        br#"Derive([],[("out","","","","","db","true","private","none","","","alice","","")],[],[],[],"","",[],[])"#
    )]
    #[case::synchronization(
        br#"Derive([],[("out","","","","","db","true","full","shared-lock","","","alice","","")],[],[],[],"","",[],[])"#
    )]
    #[case::blank_dir_type(br#"Derive([],[],[("/state/x/log","","")],[],[],"","",[],[])"#)]
    #[case::unknown_dir_type(br#"Derive([],[],[("/state/x/log","hourly","1")],[],[],"","",[],[])"#)]
    fn unknown_values_roundtrip(#[case] input: &[u8]) {
        let drv = Derivation::from_aterm_bytes(input).expect("must parse");
        assert_eq!(input, &drv.to_aterm_bytes()[..]);
    }

    #[test]
    fn unknown_values_parsed() {
        let input = br#"Derive([],[("out","","","","","db","true","private","shared-lock","","","alice","","")],[("/state/x/log","","")],[],[],"","",[],[])"#;
        let drv = Derivation::from_aterm_bytes(input).expect("must parse");

        let state = drv.state.expect("must have state");
        let out = &state.state_outputs["out"];
        assert_eq!(Some(ShareType::Other("private".into())), out.share_type);
        assert_eq!(
            Some(Synchronization::Other("shared-lock".into())),
            out.synchronization
        );
        assert_eq!(
            StateDirType::Other("".into()),
            state.state_output_dirs["/state/x/log"].kind
        );
    }

    #[test]
    fn deeply_nested() {
        let input = format!("{}{}", "[".repeat(200_000), "]".repeat(200_000));
        assert!(matches!(
            Derivation::from_aterm_bytes(input.as_bytes()),
            Err(ParseError::Syntax(_))
        ));
    }

    #[test]
    fn syntax_error() {
        assert!(matches!(
            Derivation::from_aterm_bytes(b"Derive(["),
            Err(ParseError::Syntax(_))
        ));
    }
}
