#![forbid(unsafe_code)]

use std::collections::HashSet;

use deepppl_ast::{span, BlockKind, ExprKind, Program, SamplingRole, Shape, Span};
use tracing::trace;

use crate::builtins;
use crate::error::SemanticError;
use crate::types::{binary_shape, broadcast, infer_shape};
use crate::walk;

type Check = fn(&Program) -> Result<(), SemanticError>;

/// Structural checks over a resolved program, in reporting order.
const CHECKS: &[(&str, Check)] = &[
    ("sampling-context", check_sampling_context),
    ("distributions", check_distributions),
    ("random-targets", check_random_targets),
    ("guide-observations", check_guide_observations),
    ("model-present", check_model_present),
    ("guide-coverage", check_guide_coverage),
    ("guide-networks", check_guide_networks),
    ("prior-networks", check_prior_networks),
    ("properties", check_properties),
    ("shapes", check_shapes),
];

/// Runs the checks in order and reports the first violation.
pub fn validate_program(program: &Program) -> Result<(), SemanticError> {
    for (name, check) in CHECKS {
        trace!(check = name, "validate");
        check(program)?;
    }
    Ok(())
}

fn network_names(program: &Program) -> HashSet<&str> {
    program
        .block(BlockKind::Networks)
        .into_iter()
        .flat_map(|b| b.net_decls())
        .map(|n| n.name.node.as_str())
        .collect()
}

fn check_sampling_context(program: &Program) -> Result<(), SemanticError> {
    let networks = network_names(program);
    for block in program.blocks() {
        for (sampling, span) in walk::samplings(&block.body) {
            if !block.kind.is_sampling() {
                return Err(SemanticError::InvalidSampling {
                    reason: format!("sampling is not allowed in the '{}' block", block.kind),
                    span,
                });
            }
            if let Some(dist) = &sampling.dist {
                let name = dist.node.as_str();
                if builtins::is_builtin_function(name) || networks.contains(name) {
                    return Err(SemanticError::InvalidSampling {
                        reason: format!("'{name}' is a function, not a distribution"),
                        span: dist.span,
                    });
                }
            }
        }
    }
    Ok(())
}

fn check_distributions(program: &Program) -> Result<(), SemanticError> {
    for block in program.blocks() {
        for (sampling, _) in walk::samplings(&block.body) {
            let Some(dist) = &sampling.dist else {
                continue;
            };
            if !builtins::is_distribution(&dist.node) {
                return Err(SemanticError::UnknownDistribution {
                    name: dist.node.clone(),
                    span: dist.span,
                });
            }
        }
    }
    Ok(())
}

fn check_random_targets(program: &Program) -> Result<(), SemanticError> {
    for block in program.blocks() {
        for (sampling, _) in walk::samplings(&block.body) {
            if sampling.is_factor() {
                continue;
            }
            let target = &sampling.target;
            let non_random = match target.root_block() {
                Some(kind) => matches!(
                    kind,
                    BlockKind::Networks
                        | BlockKind::TransformedParameters
                        | BlockKind::GeneratedQuantities
                        | BlockKind::GuideParameters
                ),
                None => sampling.role != SamplingRole::Observed,
            };
            if non_random {
                return Err(SemanticError::NonRandomSampling {
                    name: target.root_id().unwrap_or_else(|| "expression".to_string()),
                    span: target.span,
                });
            }
        }
    }
    Ok(())
}

fn check_guide_observations(program: &Program) -> Result<(), SemanticError> {
    let Some(guide) = program.block(BlockKind::Guide) else {
        return Ok(());
    };
    for (sampling, span) in walk::samplings(&guide.body) {
        if sampling.role == SamplingRole::Observed {
            return Err(SemanticError::ObserveOnGuide {
                name: sampling
                    .target
                    .root_id()
                    .unwrap_or_else(|| "expression".to_string()),
                span,
            });
        }
    }
    Ok(())
}

/// Without a model, the prior must sample every declared parameter.
fn check_model_present(program: &Program) -> Result<(), SemanticError> {
    if program.has(BlockKind::Model) {
        return Ok(());
    }
    let prior = program.block(BlockKind::Prior);
    let uncovered = program
        .decls(BlockKind::Parameters)
        .find(|d| !prior.is_some_and(|p| p.is_sampled(d.name())));
    match (prior, uncovered) {
        (Some(_), None) => Ok(()),
        (_, Some(decl)) => Err(SemanticError::MissingModel { span: decl.id.span }),
        (None, None) => Err(SemanticError::MissingModel {
            span: program.blocks().next().map_or(span(0, 0), |b| b.span),
        }),
    }
}

fn check_guide_coverage(program: &Program) -> Result<(), SemanticError> {
    let Some(guide) = program.block(BlockKind::Guide) else {
        return Ok(());
    };
    for decl in program.decls(BlockKind::Parameters) {
        if !decl.is_net_param() && !guide.is_sampled(decl.name()) {
            return Err(SemanticError::MissingGuide {
                name: decl.name().to_string(),
                span: decl.id.span,
            });
        }
    }
    Ok(())
}

fn check_guide_networks(program: &Program) -> Result<(), SemanticError> {
    let Some(guide) = program.block(BlockKind::Guide) else {
        return Ok(());
    };
    for decl in program.decls(BlockKind::Parameters) {
        if decl.is_net_param() && !guide.is_sampled(decl.name()) {
            return Err(SemanticError::MissingGuideNet {
                name: decl.name().to_string(),
                span: decl.id.span,
            });
        }
    }
    Ok(())
}

fn check_prior_networks(program: &Program) -> Result<(), SemanticError> {
    let sampled_in = |kind: BlockKind, id: &str| {
        program.block(kind).is_some_and(|b| b.is_sampled(id))
    };
    for decl in program.decls(BlockKind::Parameters) {
        if decl.is_net_param()
            && !sampled_in(BlockKind::Model, decl.name())
            && !sampled_in(BlockKind::Prior, decl.name())
        {
            return Err(SemanticError::MissingPriorNet {
                name: decl.name().to_string(),
                span: decl.id.span,
            });
        }
    }
    Ok(())
}

fn check_properties(program: &Program) -> Result<(), SemanticError> {
    for block in program.blocks() {
        for expr in walk::all_exprs(&block.body) {
            let prop = match &expr.kind {
                ExprKind::Property { prop, .. } | ExprKind::NetProperty { prop, .. } => prop,
                _ => continue,
            };
            if prop.node != "shape" {
                return Err(SemanticError::UnsupportedProperty {
                    name: prop.node.clone(),
                    span: prop.span,
                });
            }
        }
    }
    Ok(())
}

fn check_shapes(program: &Program) -> Result<(), SemanticError> {
    for block in program.blocks() {
        for expr in walk::all_exprs(&block.body) {
            let ExprKind::Binary { left, op, right } = &expr.kind else {
                continue;
            };
            if op.is_logical() {
                continue;
            }
            let (Some(l), Some(r)) = (infer_shape(left), infer_shape(right)) else {
                continue;
            };
            binary_shape(*op, &l, &r).map_err(|m| mismatch(m.left, m.right, expr.span))?;
        }

        for (sampling, span) in walk::samplings(&block.body) {
            if sampling.is_factor() {
                continue;
            }
            let Some(target) = infer_shape(&sampling.target).filter(|s| !s.is_scalar()) else {
                continue;
            };
            for arg in &sampling.args {
                let Some(shape) = infer_shape(arg).filter(|s| !s.is_scalar()) else {
                    continue;
                };
                broadcast(&target, &shape).map_err(|m| mismatch(m.left, m.right, span))?;
            }
        }
    }
    Ok(())
}

fn mismatch(left: Shape, right: Shape, span: Span) -> SemanticError {
    SemanticError::IncompatibleShapes { left, right, span }
}
