#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

use crate::{Constraint, Expr, ExprKind, Program, ProgramBlock, Span, Stmt, StmtKind, Type};

/// Borrowed child of a node.
#[derive(Clone, Copy, Debug)]
pub enum NodeRef<'a> {
    Block(&'a ProgramBlock),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
    Type(&'a Type),
    Constraint(&'a Constraint),
}

/// Mutable slot into a named field of the parent; assigning through it rewrites that field.
#[derive(Debug)]
pub enum NodeMut<'a> {
    Block(&'a mut ProgramBlock),
    Stmt(&'a mut Stmt),
    Expr(&'a mut Expr),
    Type(&'a mut Type),
    Constraint(&'a mut Constraint),
}

#[derive(Debug, Error, Diagnostic)]
#[error("sampling statements do not expose generic children")]
#[diagnostic(code(deepppl::opaque_children))]
#[allow(unused_assignments)]
pub struct OpaqueChildren {
    #[label]
    pub span: Span,
}

impl Program {
    pub fn children(&self) -> Vec<NodeRef<'_>> {
        self.blocks().map(NodeRef::Block).collect()
    }

    pub fn children_mut(&mut self) -> Vec<NodeMut<'_>> {
        self.blocks_mut().map(NodeMut::Block).collect()
    }
}

impl ProgramBlock {
    pub fn children(&self) -> Vec<NodeRef<'_>> {
        self.body.iter().map(NodeRef::Stmt).collect()
    }

    pub fn children_mut(&mut self) -> Vec<NodeMut<'_>> {
        self.body.iter_mut().map(NodeMut::Stmt).collect()
    }
}

impl Stmt {
    /// Ordered children. Sampling statements refuse: use `SamplingStmt::operands`.
    pub fn children(&self) -> Result<Vec<NodeRef<'_>>, OpaqueChildren> {
        let out = match &self.kind {
            StmtKind::Decl(d) => {
                let mut out = vec![NodeRef::Type(&d.ty)];
                out.extend(d.dims.iter().map(NodeRef::Expr));
                out.extend(d.init.iter().map(NodeRef::Expr));
                out
            }
            StmtKind::NetDecl(n) => n.params.iter().map(NodeRef::Expr).collect(),
            StmtKind::Assign(a) => vec![NodeRef::Expr(&a.target), NodeRef::Expr(&a.value)],
            StmtKind::Sampling(_) => return Err(OpaqueChildren { span: self.span }),
            StmtKind::For(f) => vec![
                NodeRef::Expr(&f.from),
                NodeRef::Expr(&f.to),
                NodeRef::Stmt(&f.body),
            ],
            StmtKind::Conditional(c) => {
                let mut out = vec![NodeRef::Expr(&c.test), NodeRef::Stmt(&c.then_branch)];
                out.extend(c.else_branch.iter().map(|s| NodeRef::Stmt(s)));
                out
            }
            StmtKind::While(w) => vec![NodeRef::Expr(&w.test), NodeRef::Stmt(&w.body)],
            StmtKind::Block(b) => b.body.iter().map(NodeRef::Stmt).collect(),
            StmtKind::Call(c) => c.args.iter().map(NodeRef::Expr).collect(),
            StmtKind::Break | StmtKind::Continue => Vec::new(),
        };
        Ok(out)
    }

    pub fn children_mut(&mut self) -> Result<Vec<NodeMut<'_>>, OpaqueChildren> {
        let span = self.span;
        let out = match &mut self.kind {
            StmtKind::Decl(d) => {
                let mut out = vec![NodeMut::Type(&mut d.ty)];
                out.extend(d.dims.iter_mut().map(NodeMut::Expr));
                out.extend(d.init.iter_mut().map(NodeMut::Expr));
                out
            }
            StmtKind::NetDecl(n) => n.params.iter_mut().map(NodeMut::Expr).collect(),
            StmtKind::Assign(a) => vec![NodeMut::Expr(&mut a.target), NodeMut::Expr(&mut a.value)],
            StmtKind::Sampling(_) => return Err(OpaqueChildren { span }),
            StmtKind::For(f) => vec![
                NodeMut::Expr(&mut f.from),
                NodeMut::Expr(&mut f.to),
                NodeMut::Stmt(&mut f.body),
            ],
            StmtKind::Conditional(c) => {
                let mut out = vec![NodeMut::Expr(&mut c.test), NodeMut::Stmt(&mut c.then_branch)];
                out.extend(c.else_branch.iter_mut().map(|s| NodeMut::Stmt(s)));
                out
            }
            StmtKind::While(w) => vec![NodeMut::Expr(&mut w.test), NodeMut::Stmt(&mut w.body)],
            StmtKind::Block(b) => b.body.iter_mut().map(NodeMut::Stmt).collect(),
            StmtKind::Call(c) => c.args.iter_mut().map(NodeMut::Expr).collect(),
            StmtKind::Break | StmtKind::Continue => Vec::new(),
        };
        Ok(out)
    }
}

impl Type {
    pub fn children(&self) -> Vec<NodeRef<'_>> {
        let mut out: Vec<NodeRef<'_>> = self.constraints.iter().map(NodeRef::Constraint).collect();
        out.extend(self.size.iter().map(NodeRef::Expr));
        out
    }

    pub fn children_mut(&mut self) -> Vec<NodeMut<'_>> {
        let mut out: Vec<NodeMut<'_>> = self.constraints.iter_mut().map(NodeMut::Constraint).collect();
        out.extend(self.size.iter_mut().map(NodeMut::Expr));
        out
    }
}

impl Constraint {
    pub fn children(&self) -> Vec<NodeRef<'_>> {
        vec![NodeRef::Expr(&self.value)]
    }

    pub fn children_mut(&mut self) -> Vec<NodeMut<'_>> {
        vec![NodeMut::Expr(&mut self.value)]
    }
}

impl Expr {
    /// Sub-expressions in source order. Network references are leaves.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Constant(_)
            | ExprKind::Str(_)
            | ExprKind::Variable(_)
            | ExprKind::NetVariable(_)
            | ExprKind::NetProperty { .. } => Vec::new(),
            ExprKind::Tuple(items) | ExprKind::List(items) => items.iter().collect(),
            ExprKind::Binary { left, right, .. } => vec![&**left, &**right],
            ExprKind::Unary { operand, .. } => vec![&**operand],
            ExprKind::Subscript { base, index } => vec![&**base, &**index],
            ExprKind::Call { args, .. } => args.iter().collect(),
            ExprKind::Property { base, .. } => vec![&**base],
            ExprKind::AnonymousShape { value } => vec![&**value],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Constant(_)
            | ExprKind::Str(_)
            | ExprKind::Variable(_)
            | ExprKind::NetVariable(_)
            | ExprKind::NetProperty { .. } => Vec::new(),
            ExprKind::Tuple(items) | ExprKind::List(items) => items.iter_mut().collect(),
            ExprKind::Binary { left, right, .. } => vec![&mut **left, &mut **right],
            ExprKind::Unary { operand, .. } => vec![&mut **operand],
            ExprKind::Subscript { base, index } => vec![&mut **base, &mut **index],
            ExprKind::Call { args, .. } => args.iter_mut().collect(),
            ExprKind::Property { base, .. } => vec![&mut **base],
            ExprKind::AnonymousShape { value } => vec![&mut **value],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{span, AssignStmt, BinOp, BlockKind, Constant, SamplingStmt, Spanned, Variable};

    fn var(id: &str) -> Expr {
        Expr::new(span(0, 1), ExprKind::Variable(Variable::new(id)))
    }

    #[test]
    fn sampling_statements_are_opaque() {
        let stmt = Stmt::new(
            span(3, 9),
            StmtKind::Sampling(SamplingStmt::new(
                var("x"),
                Spanned::new(span(0, 6), "normal".to_string()),
                vec![var("mu")],
            )),
        );
        let err = stmt.children().unwrap_err();
        assert_eq!(err.span, span(3, 9));
    }

    #[test]
    fn rewriting_through_a_slot_updates_the_named_field() {
        let mut stmt = Stmt::new(
            span(0, 5),
            StmtKind::Assign(AssignStmt {
                target: var("x"),
                value: var("y"),
            }),
        );
        for child in stmt.children_mut().unwrap() {
            if let NodeMut::Expr(e) = child {
                if matches!(&e.kind, ExprKind::Variable(v) if v.id == "y") {
                    *e = Expr::new(span(0, 1), ExprKind::Constant(Constant::Int(2)));
                }
            }
        }
        let StmtKind::Assign(assign) = &stmt.kind else {
            panic!("assignment expected");
        };
        assert_eq!(assign.value.as_constant(), Some(Constant::Int(2)));
        assert!(matches!(&assign.target.kind, ExprKind::Variable(v) if v.id == "x"));
    }

    #[test]
    fn binary_children_are_left_then_right() {
        let e = Expr::new(
            span(0, 3),
            ExprKind::Binary {
                left: Box::new(var("a")),
                op: BinOp::Minus,
                right: Box::new(var("b")),
            },
        );
        let ids: Vec<_> = e.children().iter().filter_map(|c| c.root_id()).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn program_children_follow_block_order() {
        let mut program = Program::new();
        program
            .insert(ProgramBlock::new(BlockKind::Model, span(0, 0), Vec::new()))
            .unwrap();
        program
            .insert(ProgramBlock::new(BlockKind::Data, span(0, 0), Vec::new()))
            .unwrap();
        let kinds: Vec<_> = program
            .children()
            .into_iter()
            .filter_map(|c| match c {
                NodeRef::Block(b) => Some(b.kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![BlockKind::Data, BlockKind::Model]);
    }
}
