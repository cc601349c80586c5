#![forbid(unsafe_code)]

//! Distributions and functions the compiler recognizes without a declaration.

/// A sampling distribution and the Pyro constructor it lowers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Distribution {
    pub name: &'static str,
    pub pyro: &'static str,
    /// Keyword under which the last argument is passed (`logits=`, `scale_tril=`).
    pub last_keyword: Option<&'static str>,
    /// Draws are integers.
    pub discrete: bool,
}

const fn dist(name: &'static str, pyro: &'static str) -> Distribution {
    Distribution {
        name,
        pyro,
        last_keyword: None,
        discrete: false,
    }
}

const fn discrete(name: &'static str, pyro: &'static str) -> Distribution {
    Distribution {
        name,
        pyro,
        last_keyword: None,
        discrete: true,
    }
}

const fn logits(name: &'static str, pyro: &'static str) -> Distribution {
    Distribution {
        name,
        pyro,
        last_keyword: Some("logits"),
        discrete: true,
    }
}

pub const DISTRIBUTIONS: &[Distribution] = &[
    discrete("bernoulli", "Bernoulli"),
    logits("bernoulli_logit", "Bernoulli"),
    dist("beta", "Beta"),
    discrete("binomial", "Binomial"),
    logits("binomial_logit", "Binomial"),
    discrete("categorical", "Categorical"),
    logits("categorical_logit", "Categorical"),
    logits("categorical_logits", "Categorical"),
    dist("cauchy", "Cauchy"),
    dist("chi_square", "Chi2"),
    dist("dirichlet", "Dirichlet"),
    dist("double_exponential", "Laplace"),
    dist("exponential", "Exponential"),
    dist("gamma", "Gamma"),
    discrete("geometric", "Geometric"),
    dist("inv_gamma", "InverseGamma"),
    dist("laplace", "Laplace"),
    dist("lognormal", "LogNormal"),
    dist("multi_normal", "MultivariateNormal"),
    Distribution {
        name: "multi_normal_cholesky",
        pyro: "MultivariateNormal",
        last_keyword: Some("scale_tril"),
        discrete: false,
    },
    dist("normal", "Normal"),
    discrete("poisson", "Poisson"),
    dist("student_t", "StudentT"),
    dist("uniform", "Uniform"),
    dist("von_mises", "VonMises"),
];

const FUNCTIONS: &[&str] = &[
    "abs", "acos", "append_col", "append_row", "asin", "atan", "atan2", "cbrt", "ceil", "cols",
    "cos", "cosh", "cumulative_sum", "diag_matrix", "digamma", "dot_product", "erf", "erfc",
    "exp", "exp2", "expm1", "fabs", "floor", "fmax", "fmin", "fmod", "inv", "inv_logit",
    "inv_sqrt", "inv_square", "lgamma", "log", "log10", "log1p", "log2", "log_softmax",
    "log_sum_exp", "logit", "max", "mean", "min", "num_elements", "ones", "pow", "print", "prod",
    "rand", "randn", "relu", "rep_array", "rep_matrix", "rep_vector", "round", "rows", "sd",
    "sigmoid", "sin", "sinh", "size", "softmax", "softplus", "sqrt", "square", "sum", "tan",
    "tanh", "tensor", "tgamma", "to_vector", "transpose", "trunc", "variance", "zeros",
];

/// Functions whose result is an integer.
const INT_FUNCTIONS: &[&str] = &["cols", "num_elements", "rows", "size"];

pub fn distribution(name: &str) -> Option<&'static Distribution> {
    DISTRIBUTIONS.iter().find(|d| d.name == name)
}

pub fn is_distribution(name: &str) -> bool {
    distribution(name).is_some()
}

/// `normal_rng` resolves to `normal`.
pub fn rng_distribution(name: &str) -> Option<&'static Distribution> {
    name.strip_suffix("_rng").and_then(distribution)
}

pub fn is_builtin_function(name: &str) -> bool {
    FUNCTIONS.contains(&name) || rng_distribution(name).is_some()
}

pub fn returns_int(name: &str) -> bool {
    INT_FUNCTIONS.contains(&name) || rng_distribution(name).is_some_and(|d| d.discrete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_names_are_unique() {
        for (i, d) in DISTRIBUTIONS.iter().enumerate() {
            assert!(
                DISTRIBUTIONS[i + 1..].iter().all(|o| o.name != d.name),
                "duplicate distribution {}",
                d.name
            );
        }
    }

    #[test]
    fn rng_calls_are_builtin_functions() {
        assert!(is_builtin_function("normal_rng"));
        assert!(returns_int("poisson_rng"));
        assert!(!returns_int("normal_rng"));
        assert!(!is_builtin_function("mlp"));
    }

    #[test]
    fn logit_variants_pass_logits_by_keyword() {
        let d = distribution("categorical_logits").unwrap();
        assert_eq!(d.pyro, "Categorical");
        assert_eq!(d.last_keyword, Some("logits"));
    }
}
