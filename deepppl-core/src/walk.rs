#![forbid(unsafe_code)]

//! Read-only traversals shared by the validator and the code generator.

use deepppl_ast::{Expr, NodeRef, SamplingStmt, Span, Stmt, StmtKind};

/// Every statement of `body` in pre-order, nested bodies included.
pub fn statements(body: &[Stmt]) -> Vec<&Stmt> {
    let mut out = Vec::new();
    for stmt in body {
        push_stmt(stmt, &mut out);
    }
    out
}

fn push_stmt<'a>(stmt: &'a Stmt, out: &mut Vec<&'a Stmt>) {
    out.push(stmt);
    // Sampling statements have no nested statements.
    if let Ok(children) = stmt.children() {
        for child in children {
            if let NodeRef::Stmt(s) = child {
                push_stmt(s, out);
            }
        }
    }
}

/// Sampling statements of `body` with the span of their enclosing statement.
pub fn samplings(body: &[Stmt]) -> Vec<(&SamplingStmt, Span)> {
    statements(body)
        .into_iter()
        .filter_map(|s| match &s.kind {
            StmtKind::Sampling(sampling) => Some((sampling, s.span)),
            _ => None,
        })
        .collect()
}

/// Expressions held directly by `stmt`, not those of nested statements.
pub fn own_exprs(stmt: &Stmt) -> Vec<&Expr> {
    if let StmtKind::Sampling(sampling) = &stmt.kind {
        return sampling.operands().collect();
    }
    let mut out = Vec::new();
    if let Ok(children) = stmt.children() {
        for child in children {
            push_node(child, &mut out);
        }
    }
    out
}

fn push_node<'a>(node: NodeRef<'a>, out: &mut Vec<&'a Expr>) {
    match node {
        NodeRef::Expr(e) => out.push(e),
        NodeRef::Type(ty) => {
            for child in ty.children() {
                push_node(child, out);
            }
        }
        NodeRef::Constraint(c) => out.push(&c.value),
        NodeRef::Stmt(_) | NodeRef::Block(_) => {}
    }
}

/// `expr` and all its sub-expressions in pre-order.
pub fn subexprs(expr: &Expr) -> Vec<&Expr> {
    let mut out = vec![expr];
    for child in expr.children() {
        out.extend(subexprs(child));
    }
    out
}

/// Every expression node under `body`.
pub fn all_exprs(body: &[Stmt]) -> Vec<&Expr> {
    statements(body)
        .into_iter()
        .flat_map(own_exprs)
        .flat_map(subexprs)
        .collect()
}
