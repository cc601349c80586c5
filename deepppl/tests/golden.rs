use std::fs;
use std::path::{Path, PathBuf};

use deepppl::{compile, compile_source, Config};
use deepppl_backend_pyro::normalize;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn assert_golden(name: &str) {
    let dir = fixtures().join("golden");
    let stan = dir.join(format!("{name}.stan"));
    let expected = fs::read_to_string(dir.join(format!("{name}.py"))).expect("read expected");
    let got = compile(&stan, &Config::default()).expect("compile");
    assert_eq!(
        normalize(&got),
        normalize(&expected),
        "generated code for {name} differs:\n{got}"
    );
}

#[test]
fn golden_coin() {
    assert_golden("coin");
}

#[test]
fn golden_regression() {
    assert_golden("regression");
}

#[test]
fn golden_bayesian_mlp() {
    assert_golden("bayesian_mlp");
}

#[test]
fn compilation_is_deterministic() {
    let src = fs::read_to_string(fixtures().join("golden").join("regression.stan")).expect("read");
    let first = compile_source(&src, &Config::default()).expect("compile");
    let second = compile_source(&src, &Config::default()).expect("compile");
    assert_eq!(first, second);
}

#[test]
fn config_file_turns_on_annotations() {
    let stan = fixtures().join("verbose").join("locals.stan");
    let config = deepppl::load_config(&stan).expect("config");
    assert!(config.verbose);

    let verbose = compile(&stan, &config).expect("compile");
    assert!(verbose.contains("half: float = 0.5\n"), "{verbose}");
    assert!(verbose.contains("buf: torch.Tensor = zeros(N)\n"), "{verbose}");

    let plain = compile(&stan, &Config::default()).expect("compile");
    assert!(plain.contains("half = 0.5\n"), "{plain}");
    assert_eq!(normalize(&plain), normalize(&verbose));
}
