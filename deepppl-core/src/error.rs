#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use deepppl_ast::{BlockKind, OpaqueChildren, Shape, Span};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("duplicate '{kind}' block")]
#[diagnostic(
    code(deepppl::assemble),
    help("each block may appear at most once; merge the two bodies")
)]
#[allow(unused_assignments)]
pub struct AssemblyError {
    pub kind: BlockKind,
    #[label("second occurrence")]
    pub span: Span,
    #[label("first declared here")]
    pub first: Span,
}

/// Scope, type and structural violations. One variant per condition; the resolver and the
/// validator stop at the first one they find.
#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum SemanticError {
    #[error("parameter '{name}' is not sampled in the guide")]
    #[diagnostic(code(deepppl::missing_guide))]
    MissingGuide {
        name: String,
        #[label("declared here")]
        span: Span,
    },

    #[error("cannot observe '{name}' inside the guide")]
    #[diagnostic(code(deepppl::observe_on_guide))]
    ObserveOnGuide {
        name: String,
        #[label]
        span: Span,
    },

    #[error("program has no model block")]
    #[diagnostic(
        code(deepppl::missing_model),
        help("add a model block, or a prior block that samples every parameter")
    )]
    MissingModel {
        #[label]
        span: Span,
    },

    #[error("'{name}' is not declared in the parameters block")]
    #[diagnostic(code(deepppl::undeclared_parameters))]
    UndeclaredParameters {
        name: String,
        #[label]
        span: Span,
    },

    #[error("network '{name}' is not declared")]
    #[diagnostic(code(deepppl::undeclared_network))]
    UndeclaredNetwork {
        name: String,
        #[label]
        span: Span,
    },

    #[error("variable '{name}' is not declared")]
    #[diagnostic(code(deepppl::undeclared_variable))]
    UndeclaredVariable {
        name: String,
        #[label]
        span: Span,
    },

    #[error("network parameter '{name}' is not sampled in the guide")]
    #[diagnostic(code(deepppl::missing_guide_net))]
    MissingGuideNet {
        name: String,
        #[label]
        span: Span,
    },

    #[error("network parameter '{name}' has no prior")]
    #[diagnostic(code(deepppl::missing_prior_net))]
    MissingPriorNet {
        name: String,
        #[label]
        span: Span,
    },

    #[error("incompatible shapes {left} and {right}")]
    #[diagnostic(code(deepppl::incompatible_shapes))]
    IncompatibleShapes {
        left: Shape,
        right: Shape,
        #[label]
        span: Span,
    },

    #[error("invalid sampling: {reason}")]
    #[diagnostic(code(deepppl::invalid_sampling))]
    InvalidSampling {
        reason: String,
        #[label]
        span: Span,
    },

    #[error("cannot sample '{name}': it is not a random variable")]
    #[diagnostic(code(deepppl::non_random_sampling))]
    NonRandomSampling {
        name: String,
        #[label]
        span: Span,
    },

    #[error("unknown distribution '{name}'")]
    #[diagnostic(code(deepppl::unknown_distribution))]
    UnknownDistribution {
        name: String,
        #[label]
        span: Span,
    },

    #[error("'{name}' is already declared")]
    #[diagnostic(code(deepppl::already_declared))]
    AlreadyDeclared {
        name: String,
        #[label("redeclared here")]
        span: Span,
    },

    #[error("unsupported property '{name}'; only 'shape' is available")]
    #[diagnostic(code(deepppl::unsupported_property))]
    UnsupportedProperty {
        name: String,
        #[label]
        span: Span,
    },

    #[error("unsupported coercion: {reason}")]
    #[diagnostic(code(deepppl::unsupported_coercion))]
    UnsupportedCoercion {
        reason: String,
        #[label]
        span: Span,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Opaque(#[from] OpaqueChildren),
}

impl SemanticError {
    /// Stable condition name, as used in reports.
    pub fn condition(&self) -> &'static str {
        match self {
            SemanticError::MissingGuide { .. } => "missing-guide",
            SemanticError::ObserveOnGuide { .. } => "observe-on-guide",
            SemanticError::MissingModel { .. } => "missing-model",
            SemanticError::UndeclaredParameters { .. } => "undeclared-parameters",
            SemanticError::UndeclaredNetwork { .. } => "undeclared-network",
            SemanticError::UndeclaredVariable { .. } => "undeclared-variable",
            SemanticError::MissingGuideNet { .. } => "missing-guide-net",
            SemanticError::MissingPriorNet { .. } => "missing-prior-net",
            SemanticError::IncompatibleShapes { .. } => "incompatible-shapes",
            SemanticError::InvalidSampling { .. } => "invalid-sampling",
            SemanticError::NonRandomSampling { .. } => "non-random-sampling",
            SemanticError::UnknownDistribution { .. } => "unknown-distribution",
            SemanticError::AlreadyDeclared { .. } => "already-declared",
            SemanticError::UnsupportedProperty { .. } => "unsupported-property",
            SemanticError::UnsupportedCoercion { .. } => "unsupported-coercion",
            SemanticError::Opaque(_) => "internal",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            SemanticError::MissingGuide { span, .. }
            | SemanticError::ObserveOnGuide { span, .. }
            | SemanticError::MissingModel { span, .. }
            | SemanticError::UndeclaredParameters { span, .. }
            | SemanticError::UndeclaredNetwork { span, .. }
            | SemanticError::UndeclaredVariable { span, .. }
            | SemanticError::MissingGuideNet { span, .. }
            | SemanticError::MissingPriorNet { span, .. }
            | SemanticError::IncompatibleShapes { span, .. }
            | SemanticError::InvalidSampling { span, .. }
            | SemanticError::NonRandomSampling { span, .. }
            | SemanticError::UnknownDistribution { span, .. }
            | SemanticError::AlreadyDeclared { span, .. }
            | SemanticError::UnsupportedProperty { span, .. }
            | SemanticError::UnsupportedCoercion { span, .. } => *span,
            SemanticError::Opaque(e) => e.span,
        }
    }
}
