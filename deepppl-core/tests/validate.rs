use deepppl_core::{assemble, check_program, SemanticError};
use deepppl_parse::parse_source;

fn check(src: &str) -> Result<(), SemanticError> {
    let blocks = parse_source(src).expect("parse");
    let mut program = assemble(blocks).expect("assemble");
    check_program(&mut program)
}

fn condition(src: &str) -> &'static str {
    check(src).expect_err("should fail").condition()
}

#[test]
fn accepts_model_with_guide() {
    let src = r#"
        data { real y; }
        parameters { real theta; }
        guide parameters { real m; real<lower=0> s; }
        guide { theta ~ normal(m, s); }
        model { theta ~ normal(0, 1); y ~ normal(theta, 1); }
    "#;
    check(src).expect("check");
}

#[test]
fn missing_guide_for_a_parameter() {
    let src = r#"
        parameters { real theta; real mu; }
        guide { theta ~ normal(0, 1); }
        model { theta ~ normal(0, 1); mu ~ normal(0, 1); }
    "#;
    let err = check(src).expect_err("should fail");
    assert!(
        matches!(&err, SemanticError::MissingGuide { name, .. } if name == "mu"),
        "unexpected error: {err}"
    );
}

#[test]
fn observing_data_in_the_guide() {
    let src = r#"
        data { real y; }
        parameters { real theta; }
        guide { y ~ normal(0, 1); theta ~ normal(0, 1); }
        model { theta ~ normal(0, 1); y ~ normal(theta, 1); }
    "#;
    assert_eq!(condition(src), "observe-on-guide");
}

#[test]
fn missing_model_without_covering_prior() {
    let src = r#"
        parameters { real theta; }
        guide { theta ~ normal(0, 1); }
    "#;
    assert_eq!(condition(src), "missing-model");
}

#[test]
fn prior_covering_every_parameter_replaces_the_model() {
    let src = r#"
        parameters { real theta; }
        prior { theta ~ normal(0, 1); }
    "#;
    check(src).expect("check");
}

#[test]
fn sampling_an_undeclared_network_parameter() {
    let src = r#"
        networks { MLP mlp; }
        parameters { real mlp.l1.weight; }
        model { mlp.l2.bias ~ normal(0, 1); }
    "#;
    let err = check(src).expect_err("should fail");
    assert!(
        matches!(&err, SemanticError::UndeclaredParameters { name, .. } if name == "mlp.l2.bias"),
        "unexpected error: {err}"
    );
}

#[test]
fn calling_an_undeclared_network() {
    let src = "data { real x; } model { x ~ normal(mlp(x), 1); }";
    assert_eq!(condition(src), "undeclared-network");
}

#[test]
fn reading_an_undeclared_variable() {
    let src = "parameters { real theta; } model { theta ~ normal(mu, 1); }";
    assert_eq!(condition(src), "undeclared-variable");
}

#[test]
fn guide_must_sample_network_parameters() {
    let src = r#"
        networks { MLP mlp; }
        data { real x; }
        parameters { real mlp.l1.weight; }
        guide { }
        prior { mlp.l1.weight ~ normal(0, 1); }
        model { x ~ normal(mlp(x), 1); }
    "#;
    assert_eq!(condition(src), "missing-guide-net");
}

#[test]
fn guide_calling_an_undeclared_network() {
    let src = r#"
        data { real x; }
        parameters { real z; }
        guide { z ~ normal(encoder(x), 1); }
        model { z ~ normal(0, 1); }
    "#;
    assert_eq!(condition(src), "missing-guide-net");
}

#[test]
fn network_parameter_without_prior() {
    let src = r#"
        networks { MLP mlp; }
        data { real x; }
        parameters { real mlp.l1.weight; }
        guide { mlp.l1.weight ~ normal(0, 1); }
        model { x ~ normal(mlp(x), 1); }
    "#;
    assert_eq!(condition(src), "missing-prior-net");
}

#[test]
fn elementwise_operands_of_different_lengths() {
    let src = "data { vector[3] a; vector[4] b; real y; } model { y ~ normal(a + b, 1); }";
    let err = check(src).expect_err("should fail");
    assert!(
        matches!(err, SemanticError::IncompatibleShapes { .. }),
        "unexpected error: {err}"
    );
    assert_eq!(err.to_string(), "incompatible shapes [3] and [4]");
}

#[test]
fn matrix_product_inner_dimensions() {
    let src = r#"
        data { matrix[2, 3] m; vector[4] v; vector[2] y; }
        model { y ~ normal(m * v, 1); }
    "#;
    assert_eq!(condition(src), "incompatible-shapes");
}

#[test]
fn elementwise_operands_of_different_rank() {
    let src = r#"
        data { matrix[2, 3] m; vector[3] a; }
        transformed data { matrix[2, 3] r = m .* a; }
        model { }
    "#;
    let err = check(src).expect_err("should fail");
    assert_eq!(err.to_string(), "incompatible shapes [2, 3] and [3]");
}

#[test]
fn scalar_operands_combine_with_any_rank() {
    let src = r#"
        data { matrix[2, 3] m; real c; }
        transformed data { matrix[2, 3] r = m .* c + 1; }
        model { }
    "#;
    check(src).expect("check");
}

#[test]
fn sampling_target_and_argument_shapes() {
    let src = "data { vector[3] y; vector[4] mu; } model { y ~ normal(mu, 1); }";
    assert_eq!(condition(src), "incompatible-shapes");
}

#[test]
fn symbolic_dimensions_are_compatible() {
    let src = r#"
        data { int N; vector[N] y; vector[N] mu; }
        model { y ~ normal(mu + mu, 1); }
    "#;
    check(src).expect("check");
}

#[test]
fn sampling_outside_sampling_blocks() {
    let src = r#"
        transformed data { real z = 1; z ~ normal(0, 1); }
        model { }
    "#;
    assert_eq!(condition(src), "invalid-sampling");
}

#[test]
fn sampling_from_a_function() {
    let src = "data { real y; } model { y ~ exp(1); }";
    let err = check(src).expect_err("should fail");
    assert!(
        err.to_string().contains("'exp' is a function"),
        "unexpected error: {err}"
    );
}

#[test]
fn sampling_a_transformed_parameter() {
    let src = r#"
        parameters { real theta; }
        transformed parameters { real w = theta * 2; }
        model { theta ~ normal(0, 1); w ~ normal(0, 1); }
    "#;
    let err = check(src).expect_err("should fail");
    assert!(
        matches!(&err, SemanticError::NonRandomSampling { name, .. } if name == "w"),
        "unexpected error: {err}"
    );
}

#[test]
fn sampling_a_network_handle() {
    let src = r#"
        networks { MLP mlp; }
        data { real x; }
        model { mlp ~ normal(0, 1); x ~ normal(mlp(x), 1); }
    "#;
    let err = check(src).expect_err("should fail");
    assert!(
        matches!(&err, SemanticError::NonRandomSampling { name, .. } if name == "mlp"),
        "unexpected error: {err}"
    );
}

#[test]
fn unknown_distribution() {
    let src = "parameters { real theta; } model { theta ~ foo(0, 1); }";
    assert_eq!(condition(src), "unknown-distribution");
}

#[test]
fn redeclaring_a_visible_name() {
    let src = "data { real x; } parameters { real x; } model { x ~ normal(0, 1); }";
    assert_eq!(condition(src), "already-declared");
}

#[test]
fn property_other_than_shape() {
    let src = "data { vector[3] y; } transformed data { real n = y$size; } model { }";
    let err = check(src).expect_err("should fail");
    assert!(
        matches!(&err, SemanticError::UnsupportedProperty { name, .. } if name == "size"),
        "unexpected error: {err}"
    );
}

#[test]
fn real_value_into_int() {
    let src = "data { real y; } transformed data { int n = y; } model { }";
    assert_eq!(condition(src), "unsupported-coercion");
}

#[test]
fn fractional_literal_into_int() {
    let src = "transformed data { int n = 2.5; } model { }";
    let err = check(src).expect_err("should fail");
    assert!(err.to_string().contains("2.5"), "unexpected error: {err}");
}

#[test]
fn integral_real_literal_into_int() {
    let src = "transformed data { int n = 2.0; } model { }";
    check(src).expect("check");
}
