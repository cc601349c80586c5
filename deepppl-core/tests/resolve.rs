use deepppl_ast::{BlockKind, Constant, Dim, ExprKind, Program, SamplingRole, SamplingStmt, Shape};
use deepppl_core::{assemble, check_program, walk, SemanticError};
use deepppl_parse::parse_source;

fn check(src: &str) -> Result<Program, SemanticError> {
    let blocks = parse_source(src).expect("parse");
    let mut program = assemble(blocks).expect("assemble");
    check_program(&mut program)?;
    Ok(program)
}

fn samplings(program: &Program, kind: BlockKind) -> Vec<SamplingStmt> {
    let block = program.block(kind).expect("block");
    walk::samplings(&block.body)
        .into_iter()
        .map(|(s, _)| s.clone())
        .collect()
}

const REGRESSION: &str = r#"
data {
    int N;
    real y[N];
}
parameters {
    real mu;
}
guide parameters {
    real m;
}
guide {
    mu ~ normal(m, 1);
}
model {
    mu ~ normal(0, 1);
    for (i in 1:N)
        y[i] ~ normal(mu, 1);
}
"#;

#[test]
fn sampling_roles_follow_the_target_block() {
    let program = check(REGRESSION).expect("check");

    let guide = samplings(&program, BlockKind::Guide);
    assert_eq!(guide[0].role, SamplingRole::Declaration);

    let model = samplings(&program, BlockKind::Model);
    assert_eq!(model[0].role, SamplingRole::Parameters);
    assert_eq!(model[1].role, SamplingRole::Observed);
}

#[test]
fn sampled_sets_record_root_identifiers() {
    let program = check(REGRESSION).expect("check");
    let model = program.block(BlockKind::Model).expect("model");
    let sampled: Vec<_> = model.sampled().iter().map(String::as_str).collect();
    assert_eq!(sampled, vec!["mu", "y"]);
    assert!(program.block(BlockKind::Guide).expect("guide").is_sampled("mu"));
}

#[test]
fn variables_are_tagged_with_their_declaring_block() {
    let program = check(REGRESSION).expect("check");
    let model = samplings(&program, BlockKind::Model);
    assert!(model[1].target.is_data_var());
    let ExprKind::Subscript { index, .. } = &model[1].target.kind else {
        panic!("expected subscript target");
    };
    // Loop variables belong to the block that opened the loop.
    assert!(index.in_block(BlockKind::Model));
    assert!(model[1].args[0].is_params_var());
}

#[test]
fn factor_statements_are_not_sampled() {
    let src = "parameters { real x; } model { x ~ normal(0, 1); target += 2 * x; }";
    let program = check(src).expect("check");
    let model = samplings(&program, BlockKind::Model);
    assert_eq!(model[1].role, SamplingRole::Factor);
    assert_eq!(program.block(BlockKind::Model).expect("model").sampled().len(), 1);
}

#[test]
fn whole_vector_target_with_scalar_arguments_gets_a_batch_shape() {
    let src = "parameters { vector[3] z; } model { z ~ normal(0, 1); }";
    let program = check(src).expect("check");
    let model = samplings(&program, BlockKind::Model);
    assert_eq!(model[0].shape, Some(Shape(vec![Dim::Known(3)])));
}

#[test]
fn subscripted_target_has_no_batch_shape() {
    let src = "parameters { vector[3] z; } model { for (i in 1:3) z[i] ~ normal(0, 1); }";
    let program = check(src).expect("check");
    let model = samplings(&program, BlockKind::Model);
    assert_eq!(model[0].shape, None);
}

#[test]
fn declaration_shape_lists_array_dims_then_size() {
    let src = "data { int N; matrix[N, 3] m[2]; } model { }";
    let program = check(src).expect("check");
    let decl = program.decls(BlockKind::Data).nth(1).expect("matrix decl");
    assert_eq!(
        decl.shape,
        Some(Shape(vec![Dim::Known(2), Dim::Symbol("N".into()), Dim::Known(3)]))
    );
}

#[test]
fn parameters_are_not_visible_in_transformed_data() {
    let src = r#"
        parameters { real theta; }
        transformed data { real y = theta; }
        model { theta ~ normal(0, 1); }
    "#;
    let err = check(src).expect_err("should fail");
    assert!(
        matches!(&err, SemanticError::UndeclaredVariable { name, .. } if name == "theta"),
        "unexpected error: {err}"
    );
}

#[test]
fn guide_parameters_are_not_visible_in_the_model() {
    let src = r#"
        parameters { real theta; }
        guide parameters { real m; }
        guide { theta ~ normal(m, 1); }
        model { theta ~ normal(m, 1); }
    "#;
    let err = check(src).expect_err("should fail");
    assert!(
        matches!(&err, SemanticError::UndeclaredVariable { name, .. } if name == "m"),
        "unexpected error: {err}"
    );
}

#[test]
fn loop_variables_go_out_of_scope() {
    let src = "model { for (i in 1:3) { real a = i; } a ~ normal(0, 1); }";
    let err = check(src).expect_err("should fail");
    assert!(
        matches!(&err, SemanticError::UndeclaredVariable { name, .. } if name == "a"),
        "unexpected error: {err}"
    );
}

#[test]
fn generated_quantities_may_reuse_guide_names() {
    let src = r#"
        parameters { real theta; }
        guide parameters { real m; }
        guide { theta ~ normal(m, 1); }
        model { theta ~ normal(0, 1); }
        generated quantities { real m = theta; }
    "#;
    check(src).expect("check");
}

#[test]
fn network_parameters_are_tagged_as_parameters() {
    let src = r#"
        networks { MLP mlp; }
        data { real x; }
        parameters { real mlp.l1.weight; }
        guide { mlp.l1.weight ~ normal(0, 1); }
        model {
            mlp.l1.weight ~ normal(0, 1);
            x ~ normal(mlp(x), 1);
        }
    "#;
    let program = check(src).expect("check");
    let model = samplings(&program, BlockKind::Model);
    assert_eq!(model[0].role, SamplingRole::Parameters);
    assert!(model[0].target.is_params_var());
    assert!(program
        .block(BlockKind::Guide)
        .expect("guide")
        .is_sampled("mlp.l1.weight"));
}

#[test]
fn int_literals_are_promoted_in_real_declarations() {
    let src = "transformed data { real y = 1; } model { }";
    let program = check(src).expect("check");
    let decl = program.decls(BlockKind::TransformedData).next().expect("decl");
    let init = decl.init.as_ref().and_then(|e| e.as_constant());
    assert_eq!(init, Some(Constant::Real(1.0)));
}
