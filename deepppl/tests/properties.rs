use std::collections::HashSet;

use deepppl::{compile_source, Config};
use proptest::{
    prelude::prop,
    test_runner::{Config as RunnerConfig, TestCaseError, TestRunner},
};

/// `params` scalar parameters with standard normal priors, plus `queries` factor statements
/// over anonymous shape queries.
fn program(params: usize, queries: &[u8]) -> String {
    let mut src = String::from("data { vector[3] a; }\nparameters {\n");
    for p in 0..params {
        src.push_str(&format!("    real p{p};\n"));
    }
    src.push_str("}\nmodel {\n");
    for p in 0..params {
        src.push_str(&format!("    p{p} ~ normal(0, 1);\n"));
    }
    for q in queries {
        src.push_str(&format!("    target += (a * {q})$shape;\n"));
    }
    src.push_str("}\n");
    src
}

/// Every synthesized `anonN`, once per definition or sample site.
fn anon_names(python: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in python.lines().map(str::trim) {
        if line.starts_with("anon") {
            if let Some((name, _)) = line.split_once(" = ") {
                names.push(name.to_string());
            }
        }
        if let Some(rest) = line.strip_prefix("pyro.sample('anon") {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            names.push(format!("anon{digits}"));
        }
    }
    names
}

#[test]
fn generation_is_deterministic_and_names_are_unique() {
    let mut runner = TestRunner::new(RunnerConfig {
        cases: 64,
        ..RunnerConfig::default()
    });
    let strat = (1usize..5, prop::collection::vec(0u8..10, 0..6));

    runner
        .run(&strat, |(params, queries)| {
            let src = program(params, &queries);
            let first = compile_source(&src, &Config::default())
                .map_err(|e| TestCaseError::fail(format!("{e}\n{src}")))?;
            let second = compile_source(&src, &Config::default())
                .map_err(|e| TestCaseError::fail(format!("{e}\n{src}")))?;
            if first != second {
                return Err(TestCaseError::fail("output differs between runs"));
            }

            let names = anon_names(&first);
            let distinct: HashSet<&String> = names.iter().collect();
            if names.len() != 2 * queries.len() || distinct.len() != names.len() {
                return Err(TestCaseError::fail(format!("anonymous names {names:?} in\n{first}")));
            }
            Ok(())
        })
        .map_err(|e| e.to_string())
        .expect("property");
}
