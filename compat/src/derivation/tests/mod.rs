use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use bstr::BStr;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::aterm::Term;
use crate::conf::Settings;
use crate::derivation::{
    check_path, hash_term, is_derivation, read_derivation, write_derivation, Derivation,
    GrammarPolicy, MalformedPathError, Output, ReadError, StateExtension,
};
use crate::store::{LocalStore, MemoryStore, Store};
use crate::store_path::{build_text_path, StoreDir, StorePath};

const RESOURCES_PATHS: &str = "src/derivation/tests/derivation_tests";

fn read_file(name: &str) -> Vec<u8> {
    std::fs::read(Path::new(RESOURCES_PATHS).join(name)).expect("unable to read fixture")
}

fn read_json(name: &str) -> Derivation {
    serde_json::from_slice(&read_file(&format!("{}.json", name)))
        .expect("JSON was not well-formatted")
}

fn test_store() -> MemoryStore {
    MemoryStore::new(StoreDir::new("/store").unwrap())
}

/// The derivation from `foo.drv`: one output, one input source, no state.
fn simple_derivation() -> Derivation {
    Derivation {
        arguments: vec!["-c".to_string(), "true".to_string()],
        builder: "/bin/sh".to_string(),
        environment: BTreeMap::from([("out".to_string(), "/store/abc-name".to_string())]),
        input_sources: BTreeSet::from(["/store/src1".to_string()]),
        outputs: BTreeMap::from([(
            "out".to_string(),
            Output::new("/store/abc-name").unwrap(),
        )]),
        platform: "x86_64-linux".to_string(),
        ..Default::default()
    }
}

/// `with-state.drv`, but with every state output disabled.
fn disabled_state_derivation() -> Derivation {
    let mut drv = Derivation::from_aterm_bytes(&read_file("with-state.drv")).unwrap();
    for state_output in drv.state.as_mut().unwrap().state_outputs.values_mut() {
        state_output.enabled = "false".to_string();
    }
    drv
}

#[rstest]
#[case::simple("foo.drv")]
#[case::with_state("with-state.drv")]
#[case::fixed("fixed.drv")]
fn check_to_aterm_bytes(#[case] name: &str) {
    let derivation = read_json(name);
    let expected = read_file(name);

    assert_eq!(BStr::new(&expected), BStr::new(&derivation.to_aterm_bytes()));
}

#[rstest]
#[case::simple("foo.drv")]
#[case::with_state("with-state.drv")]
#[case::fixed("fixed.drv")]
fn check_from_aterm_bytes(#[case] name: &str) {
    let parsed = Derivation::from_aterm_bytes(&read_file(name)).expect("must parse");

    assert_eq!(read_json(name), parsed);

    let expected: serde_json::Value =
        serde_json::from_slice(&read_file(&format!("{}.json", name))).unwrap();
    assert_eq!(expected, serde_json::to_value(&parsed).unwrap());
}

#[rstest]
#[case::simple("foo.drv")]
#[case::with_state("with-state.drv")]
#[case::fixed("fixed.drv")]
fn validate(#[case] name: &str) {
    read_json(name)
        .validate()
        .expect("derivation failed to validate")
}

#[rstest]
#[case::simple("foo.drv")]
#[case::with_state("with-state.drv")]
#[case::fixed("fixed.drv")]
fn roundtrip(#[case] name: &str) {
    let data = read_file(name);
    let derivation = Derivation::from_aterm_bytes(&data).expect("must parse");

    assert_eq!(BStr::new(&data), BStr::new(&derivation.to_aterm_bytes()));
    assert_eq!(
        derivation,
        Derivation::from_term(&derivation.to_term()).expect("must parse")
    );
}

#[rstest]
#[case::simple("foo", "if36vvkq9qbcnfk9y6d7jj76p4aj2gf3-foo.drv")]
#[case::with_state("app", "h3d2i139d7v2i2d1m2nmlgqz14wvg98b-app.drv")]
#[case::fixed("source", "r720xgii983h59gizxjd10swimk40cnd-source.drv")]
fn derivation_path(#[case] name: &str, #[case] expected_path: &str) {
    let file = match name {
        "foo" => "foo.drv",
        "app" => "with-state.drv",
        _ => "fixed.drv",
    };
    let derivation = read_json(file);
    let store_dir = StoreDir::new("/store").unwrap();

    assert_eq!(
        expected_path,
        derivation
            .calculate_derivation_path(&store_dir, name)
            .expect("must succeed")
            .to_string()
    );
}

/// Writing a derivation stores its rendering, under a `.drv` name, with
/// only its inputs as references.
#[test]
fn write_to_store() {
    let store = test_store();
    let drv = read_json("with-state.drv");

    let path = write_derivation(&store, &Settings::default(), &drv, "app").expect("must write");

    assert_eq!("h3d2i139d7v2i2d1m2nmlgqz14wvg98b-app.drv", path.to_string());
    assert_eq!(
        Some(read_file("with-state.drv")),
        store.read_text(&path).unwrap()
    );
    assert_eq!(
        Some(BTreeSet::from([
            "/store/283i8hwv9nhpx2bz3c359xnwh6h4clyb-builder.sh".to_string(),
            "/store/8m1l25wd3n4n345gq0kl6ls3rp3d1yp9-dep.drv".to_string(),
        ])),
        store.references(&path)
    );
}

#[test]
fn write_deterministic() {
    let store = test_store();
    let drv = simple_derivation();

    let p1 = write_derivation(&store, &Settings::default(), &drv, "name").unwrap();
    let p2 = write_derivation(&store, &Settings::default(), &drv.clone(), "name").unwrap();

    assert_eq!(p1, p2);
    assert_eq!(1, store.len());
}

#[test]
fn write_read_only() {
    let store = test_store();
    let settings = Settings {
        read_only_mode: true,
        ..Default::default()
    };
    let drv = simple_derivation();

    let path = write_derivation(&store, &settings, &drv, "name").unwrap();

    assert!(store.is_empty());
    assert_eq!(
        write_derivation(&test_store(), &Settings::default(), &drv, "name").unwrap(),
        path
    );
    assert_eq!(
        drv.calculate_derivation_path(store.store_dir(), "name")
            .unwrap(),
        path
    );
}

#[test]
fn references_exclude_outputs() {
    let mut drv = read_json("with-state.drv");
    // an output path that's also an input source stays a reference.
    drv.input_sources.insert("/store/abc-name".to_string());
    drv.outputs
        .insert("dev".to_string(), Output::new("/store/def-name-dev").unwrap());

    let references = drv.references();
    assert!(references.contains("/store/8m1l25wd3n4n345gq0kl6ls3rp3d1yp9-dep.drv"));
    assert!(references.contains("/store/abc-name"));
    assert!(!references.contains("/store/def-name-dev"));
    for output in read_json("with-state.drv").outputs.values() {
        assert!(!references.contains(&output.path));
    }

    let store = test_store();
    let path = write_derivation(&store, &Settings::default(), &drv, "app").unwrap();
    assert_eq!(Some(references), store.references(&path));
}

/// Writes the simple derivation into a store on disk, and reads it back.
#[test]
fn end_to_end() {
    let tmpdir = tempfile::tempdir().unwrap();
    let store =
        LocalStore::open(StoreDir::new(tmpdir.path().to_str().unwrap()).unwrap()).unwrap();
    let drv = simple_derivation();

    let path = write_derivation(&store, &Settings::default(), &drv, "name").expect("must write");

    let rendered = read_file("foo.drv");
    assert_eq!(
        build_text_path(store.store_dir(), "name.drv", &rendered, ["/store/src1"]).unwrap(),
        path
    );
    assert_eq!(
        Some(BTreeSet::from(["/store/src1".to_string()])),
        store.references(&path).unwrap()
    );

    let read_back = read_derivation(&store, &path).expect("must read");
    assert_eq!(drv.outputs, read_back.outputs);
    assert_eq!(drv.input_sources, read_back.input_sources);
    assert_eq!(drv.input_derivations, read_back.input_derivations);
    assert_eq!("/bin/sh", read_back.builder);
    assert_eq!("x86_64-linux", read_back.platform);
    assert_eq!(vec!["-c", "true"], read_back.arguments);
    assert_eq!(drv, read_back);
}

#[test]
fn end_to_end_pinned_path() {
    let store = test_store();
    let path = write_derivation(&store, &Settings::default(), &simple_derivation(), "name")
        .expect("must write");

    assert_eq!(
        "/store/yixfp6fn2wdp1vf54kccgik7sy4i3521-name.drv",
        store.store_dir().print_path(&path)
    );
}

#[test]
fn read_errors() {
    let store = test_store();

    let not_drv: StorePath = "00bgd045z0d4icpbc2yyz4gx48ak44la-foo".parse().unwrap();
    assert!(matches!(
        read_derivation(&store, &not_drv),
        Err(ReadError::NotADerivation(_))
    ));

    let missing: StorePath = "00bgd045z0d4icpbc2yyz4gx48ak44la-foo.drv".parse().unwrap();
    assert!(matches!(
        read_derivation(&store, &missing),
        Err(ReadError::NotFound(_))
    ));

    let garbage = store
        .add_text_to_store("garbage.drv", b"Derive(", &BTreeSet::new())
        .unwrap();
    assert!(matches!(
        read_derivation(&store, &garbage),
        Err(ReadError::Parse(_, _))
    ));
}

/// Under the declared policy, disabled state outputs survive a round trip.
#[test]
fn declared_keeps_disabled_state() {
    let drv = disabled_state_derivation();
    let bytes = drv.to_aterm_bytes_with(GrammarPolicy::Declared);

    assert_eq!(drv, Derivation::from_aterm_bytes(&bytes).unwrap());
}

/// An empty state extension is still written in the state-extended grammar.
#[test]
fn declared_empty_state() {
    let drv = Derivation {
        state: Some(StateExtension::default()),
        ..simple_derivation()
    };

    assert_eq!(
        BStr::new(br#"Derive([("out","/store/abc-name","","")],[],[],[],["/store/src1"],"x86_64-linux","/bin/sh",["-c","true"],[("out","/store/abc-name")])"#),
        BStr::new(&drv.to_aterm_bytes())
    );
    assert_eq!(drv, Derivation::from_aterm_bytes(&drv.to_aterm_bytes()).unwrap());
}

/// With every state output disabled, the legacy policy writes the plain
/// grammar, and the state is gone after parsing.
#[test]
fn enabled_state_only_drops_disabled_state() {
    let drv = disabled_state_derivation();
    assert!(!drv.uses_state_grammar(GrammarPolicy::EnabledStateOnly));

    let bytes = drv.to_aterm_bytes_with(GrammarPolicy::EnabledStateOnly);
    let parsed = Derivation::from_aterm_bytes(&bytes).unwrap();

    assert_eq!(None, parsed.state);
    assert_eq!(
        Derivation {
            state: None,
            ..drv.clone()
        },
        parsed
    );

    let settings = Settings {
        state_grammar: GrammarPolicy::EnabledStateOnly,
        ..Default::default()
    };
    let path = write_derivation(&test_store(), &settings, &drv, "app").unwrap();
    assert_eq!("f4qp8ik1f7vp72gr7b6zl0krm6rivb2v-app.drv", path.to_string());
}

#[test]
fn enabled_state_only_keeps_enabled_state() {
    let data = read_file("with-state.drv");
    let drv = Derivation::from_aterm_bytes(&data).unwrap();

    assert!(drv.uses_state_grammar(GrammarPolicy::EnabledStateOnly));
    assert_eq!(
        BStr::new(&data),
        BStr::new(&drv.to_aterm_bytes_with(GrammarPolicy::EnabledStateOnly))
    );
}

#[rstest]
#[case::plain("foo.drv", true)]
#[case::extension_only(".drv", true)]
#[case::store_path("/store/if36vvkq9qbcnfk9y6d7jj76p4aj2gf3-foo.drv", true)]
#[case::backup("foo.drv.bak", false)]
#[case::no_dot("drv", false)]
#[case::other_extension("foo.nix", false)]
#[case::empty("", false)]
fn extension(#[case] file_name: &str, #[case] expected: bool) {
    assert_eq!(expected, is_derivation(file_name));
}

#[rstest]
#[case::absolute("/store/abc-name", true)]
#[case::root("/", true)]
#[case::relative("store/abc-name", false)]
#[case::empty("", false)]
fn path_check(#[case] s: &str, #[case] ok: bool) {
    let result = check_path(s);
    if ok {
        assert_eq!(Ok(()), result);
    } else {
        assert_eq!(Err(MalformedPathError(s.to_string())), result);
    }
}

#[test]
fn hash_of_term() {
    let term = crate::aterm::parse(&read_file("foo.drv")).unwrap();
    assert_eq!(
        "sha256:4dc19a2fa92f721e3796cfe714cb68373b459107bca494d85c16e6266a2ddf62",
        hash_term(&term).to_nix_hex_string()
    );
    assert_eq!(hash_term(&term), hash_term(&simple_derivation().to_term()));
    assert_ne!(hash_term(&term), hash_term(&Term::List(vec![])));
}

#[test]
fn state_invariant_hash() {
    let drv = read_json("with-state.drv");
    assert_eq!(
        "sha256:daf46d0537cba4503ea82f9870f535999e833c5f48225313ab48f3491ba888a3",
        drv.state_invariant_hash().to_nix_hex_string()
    );

    // runtime parameters don't change the hash
    let mut moved = drv.clone();
    for state_output in moved.state.as_mut().unwrap().state_outputs.values_mut() {
        state_output.statepath = "/elsewhere".to_string();
        state_output.enabled = "false".to_string();
        state_output.synchronization = None;
        state_output.external_state = "/var/lib/app".to_string();
    }
    assert_ne!(drv.to_aterm_bytes(), moved.to_aterm_bytes());
    assert_eq!(drv.state_invariant_hash(), moved.state_invariant_hash());

    // the username is kept
    let mut other_user = drv.clone();
    for state_output in other_user.state.as_mut().unwrap().state_outputs.values_mut() {
        state_output.username = "bob".to_string();
    }
    assert_ne!(drv.state_invariant_hash(), other_user.state_invariant_hash());

    // clearing is idempotent
    let cleared = drv.without_state_runtime_parameters();
    assert_eq!(cleared, cleared.without_state_runtime_parameters());
}
