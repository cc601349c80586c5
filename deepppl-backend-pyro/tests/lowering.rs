use deepppl_backend_pyro::{emit_program, normalize, EmitOptions};
use deepppl_core::{assemble, check_program};
use deepppl_parse::parse_source;

fn lower(src: &str, verbose: bool) -> String {
    let blocks = parse_source(src).expect("parse");
    let mut program = assemble(blocks).expect("assemble");
    check_program(&mut program).expect("check");
    emit_program(&program, &EmitOptions { verbose }).expect("emit")
}

fn assert_has(out: &str, needle: &str) {
    assert!(out.contains(needle), "missing `{needle}` in:\n{out}");
}

#[test]
fn header_comes_first() {
    let out = lower("parameters { real theta; } model { theta ~ normal(0, 1); }", false);
    assert!(out.starts_with("import torch\n"), "{out}");
    assert_has(&out, "import pyro.distributions as dist\n");
    assert_has(&out, "\n\n\ndef model():\n");
}

#[test]
fn factor_statement_observes_an_exponential() {
    let src = r#"
        data { real x; }
        parameters { real theta; }
        model { theta ~ normal(0, 1); target += 2 * x; }
    "#;
    let out = lower(src, false);
    assert_has(&out, "pyro.sample('theta' + '__1', dist.Normal(0, 1), obs=theta)");
    assert_has(&out, "pyro.sample('anon0', dist.Exponential(1), obs=-(2 * x))");
}

#[test]
fn shape_queries_get_distinct_names() {
    let src = r#"
        data { vector[3] a; vector[3] b; }
        transformed data {
            real s = (a + b)$shape;
            real t = (a - b)$shape;
            real u = (a * b)$shape;
        }
        model { }
    "#;
    let out = lower(src, false);
    assert_has(&out, "    anon0 = a + b\n    s = anon0.shape\n");
    assert_has(&out, "    anon1 = a - b\n    t = anon1.shape\n");
    assert_has(&out, "    anon2 = a * b\n    u = anon2.shape\n");
    assert_has(&out, "return {'s': s, 't': t, 'u': u}");
}

#[test]
fn while_test_rebinds_shape_queries_each_iteration() {
    let src = r#"
        data { vector[3] a; }
        transformed data {
            int k = 1;
            int j = 0;
            while (k < (a * k)$shape[1]) { k = k + 1; }
            while (j < 3) { j = j + 1; }
        }
        model { }
    "#;
    let out = lower(src, false);
    assert_has(
        &out,
        "    while True:\n        anon0 = a * k\n        if not (k < anon0.shape[1 - 1]):\n            break\n        k = k + 1\n",
    );
    assert_has(&out, "    while j < 3:\n        j = j + 1\n");
}

#[test]
fn int_division_truncates() {
    let src = r#"
        data { int n; }
        transformed data { int q = n / 2; int r = -7 / 2; real h = n / 2.0; }
        model { }
    "#;
    let out = lower(src, false);
    assert_has(&out, "q = int(n / 2)\n");
    assert_has(&out, "r = int(-7 / 2)\n");
    assert_has(&out, "h = n / 2.0\n");
}

#[test]
fn guide_parameters_are_registered() {
    let src = r#"
        data { real y; }
        parameters { real theta; }
        guide parameters { real m; real<lower=0> s; }
        guide { theta ~ normal(m, s); }
        model { theta ~ normal(0, 1); y ~ normal(theta, 1); }
    "#;
    let out = lower(src, false);
    assert_has(&out, "def guide_(y=None):\n");
    assert_has(&out, "    m = pyro.param('m', randn(()))\n");
    assert_has(
        &out,
        "    s = pyro.param('s', rand(()), constraint=constraints.positive)\n",
    );
    assert_has(&out, "    theta = pyro.sample('theta', dist.Normal(m, s))\n");
    assert_has(&out, "pyro.sample('y' + '__2', dist.Normal(theta, 1), obs=y)");
}

#[test]
fn networks_used_by_the_model_are_registered() {
    let src = r#"
        networks { MLP mlp; }
        data { real x; real y; }
        model { y ~ normal(mlp(x), 1); }
    "#;
    let out = lower(src, false);
    assert_has(&out, "def model(x=None, y=None):\n    pyro.module('mlp', mlp)\n");
    assert_has(&out, "dist.Normal(mlp(x), 1), obs=y)");
}

#[test]
fn sampled_network_parameters_are_lifted() {
    let src = r#"
        networks { MLP mlp; }
        data { real x; real y; }
        parameters { real mlp.l1.weight; }
        guide parameters { real w_mu; }
        guide { mlp.l1.weight ~ normal(w_mu, 1); }
        prior { mlp.l1.weight ~ normal(0, 1); }
        model { y ~ normal(mlp(x), 1); }
    "#;
    let out = lower(src, false);
    assert_has(&out, "guide_mlp['l1.weight'] = dist.Normal(w_mu, 1)");
    assert_has(&out, "lifted_mlp = pyro.random_module('mlp', mlp, guide_mlp)()");
    assert_has(&out, "lifted_mlp = pyro.random_module('mlp', mlp, prior_mlp)()");
    assert_has(&out, "return {'mlp': lifted_mlp}");
    assert_has(&out, "prior_values = prior_(x=x, y=y)");
    assert_has(&out, "lifted_mlp = prior_values['mlp']");
    assert_has(&out, "dist.Normal(lifted_mlp(x), 1)");
    assert!(!out.contains("pyro.module("), "{out}");
}

#[test]
fn model_gets_implicit_priors_and_shifted_loops() {
    let src = r#"
        data { int N; real y[N]; }
        parameters { real mu; real<lower=0> sigma; vector[N] z; }
        model {
            for (i in 1:N)
                y[i] ~ normal(mu, sigma);
        }
    "#;
    let out = lower(src, false);
    assert_has(&out, "mu = pyro.sample('mu', ImproperUniform())");
    assert_has(&out, "sigma = pyro.sample('sigma', LowerConstrainedImproperUniform(0.0))");
    assert_has(&out, "z = pyro.sample('z', ImproperUniform(shape=N))");
    assert_has(&out, "    for i in range(1, N + 1):\n");
    assert_has(
        &out,
        "        pyro.sample('y' + '__1' + '__{}'.format(i), dist.Normal(mu, sigma), obs=y[i - 1])\n",
    );
}

#[test]
fn covering_prior_stands_in_for_the_model() {
    let src = "parameters { real theta; } prior { theta ~ normal(0, 1); }";
    let out = lower(src, false);
    assert_has(&out, "def prior_():\n    theta = pyro.sample('theta', dist.Normal(0, 1))\n");
    assert_has(&out, "    return {'theta': theta}\n");
    assert_has(&out, "def model():\n    prior_()\n");
}

#[test]
fn verbose_output_only_adds_annotations() {
    let src = r#"
        data { int N; }
        transformed data { real a = 1.5; vector[N] v; int k; }
        parameters { real theta; }
        model { theta ~ normal(a, 1); }
    "#;
    let plain = lower(src, false);
    let verbose = lower(src, true);
    assert_ne!(plain, verbose);
    assert_has(&verbose, "k: int\n");
    assert_has(&verbose, "a: float = 1.5\n");
    assert_has(&plain, "v = zeros(N)\n");
    assert_has(&plain, "a = transformed_data['a']\n");
    assert_eq!(normalize(&plain), normalize(&verbose));
}

#[test]
fn generated_quantities_return_their_declarations() {
    let src = r#"
        parameters { real theta; }
        model { theta ~ normal(0, 1); }
        generated quantities { real t2 = theta * theta; int up = theta > 0; }
    "#;
    let out = lower(src, false);
    assert_has(&out, "def generated_quantities(theta=None):\n");
    assert_has(&out, "    t2 = theta * theta\n    up = theta > 0\n");
    assert_has(&out, "return {'t2': t2, 'up': up}");
}
