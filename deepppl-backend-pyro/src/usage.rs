#![forbid(unsafe_code)]

//! Which networks and transformed-data names a generated function touches.

use std::collections::BTreeSet;

use deepppl_ast::{BlockKind, ExprKind, Program, ProgramBlock, Stmt};
use deepppl_core::walk;

/// Declared networks in declaration order.
pub fn networks(program: &Program) -> Vec<String> {
    program
        .block(BlockKind::Networks)
        .into_iter()
        .flat_map(|b| b.net_decls())
        .map(|n| n.name.node.clone())
        .collect()
}

/// Networks and transformed-data names read by a set of blocks.
#[derive(Debug, Default)]
pub struct Usage {
    pub networks: BTreeSet<String>,
    pub transformed_data: BTreeSet<String>,
}

impl Usage {
    pub fn of(program: &Program, kinds: &[BlockKind]) -> Self {
        let declared: BTreeSet<String> = networks(program).into_iter().collect();
        let mut usage = Usage::default();
        for block in kinds.iter().filter_map(|k| program.block(*k)) {
            for expr in walk::all_exprs(&block.body) {
                match &expr.kind {
                    ExprKind::Variable(v) => match v.block {
                        Some(BlockKind::TransformedData) => {
                            usage.transformed_data.insert(v.id.clone());
                        }
                        Some(BlockKind::Networks) => {
                            usage.networks.insert(v.id.clone());
                        }
                        _ => {}
                    },
                    ExprKind::NetVariable(net) | ExprKind::NetProperty { net, .. } => {
                        usage.networks.insert(net.name.clone());
                    }
                    ExprKind::Call { callee, .. } if declared.contains(&callee.node) => {
                        usage.networks.insert(callee.node.clone());
                    }
                    _ => {}
                }
            }
        }
        usage
    }
}

/// Networks whose parameters `block` samples, each with the index of the last top-level
/// statement that does so. The lifted module is built right after that statement.
pub fn lifted(block: &ProgramBlock) -> Vec<(String, usize)> {
    let mut out: Vec<(String, usize)> = Vec::new();
    for (idx, stmt) in block.body.iter().enumerate() {
        for net in sampled_networks(stmt) {
            match out.iter_mut().find(|(n, _)| *n == net) {
                Some(entry) => entry.1 = idx,
                None => out.push((net, idx)),
            }
        }
    }
    out
}

fn sampled_networks(stmt: &Stmt) -> Vec<String> {
    walk::samplings(std::slice::from_ref(stmt))
        .into_iter()
        .filter_map(|(s, _)| match &s.target.kind {
            ExprKind::NetVariable(net) if !s.is_factor() => Some(net.name.clone()),
            _ => None,
        })
        .collect()
}
