#![forbid(unsafe_code)]

use crate::{
    AssignStmt, BinOp, BlockKind, BlockStmt, CallStmt, ConditionalStmt, Constant, Constraint, Expr,
    ExprKind, ForStmt, Ident, NetDeclaration, NetVariable, Program, ProgramBlock, SamplingRole,
    SamplingStmt, Span, Stmt, StmtKind, Type, UnaryOp, Variable, VariableDecl, WhileStmt,
};

/// One method per node variant; `accept` dispatches with an exhaustive match, so adding a
/// variant without a method fails to compile.
pub trait Visitor {
    type Expr;
    type Stmt;
    type Block;

    fn visit_program(&mut self, program: &Program) -> Self::Block;

    fn visit_networks(&mut self, block: &ProgramBlock) -> Self::Block;
    fn visit_data(&mut self, block: &ProgramBlock) -> Self::Block;
    fn visit_transformed_data(&mut self, block: &ProgramBlock) -> Self::Block;
    fn visit_parameters(&mut self, block: &ProgramBlock) -> Self::Block;
    fn visit_transformed_parameters(&mut self, block: &ProgramBlock) -> Self::Block;
    fn visit_guide_parameters(&mut self, block: &ProgramBlock) -> Self::Block;
    fn visit_guide(&mut self, block: &ProgramBlock) -> Self::Block;
    fn visit_prior(&mut self, block: &ProgramBlock) -> Self::Block;
    fn visit_model(&mut self, block: &ProgramBlock) -> Self::Block;
    fn visit_generated_quantities(&mut self, block: &ProgramBlock) -> Self::Block;

    fn visit_variable_decl(&mut self, decl: &VariableDecl, span: Span) -> Self::Stmt;
    fn visit_net_decl(&mut self, decl: &NetDeclaration, span: Span) -> Self::Stmt;
    fn visit_assign(&mut self, assign: &AssignStmt, span: Span) -> Self::Stmt;
    fn visit_sampling_declaration(&mut self, sampling: &SamplingStmt, span: Span) -> Self::Stmt;
    fn visit_sampling_observed(&mut self, sampling: &SamplingStmt, span: Span) -> Self::Stmt;
    fn visit_sampling_parameters(&mut self, sampling: &SamplingStmt, span: Span) -> Self::Stmt;
    fn visit_sampling_factor(&mut self, sampling: &SamplingStmt, span: Span) -> Self::Stmt;
    fn visit_for(&mut self, stmt: &ForStmt, span: Span) -> Self::Stmt;
    fn visit_conditional(&mut self, stmt: &ConditionalStmt, span: Span) -> Self::Stmt;
    fn visit_while(&mut self, stmt: &WhileStmt, span: Span) -> Self::Stmt;
    fn visit_block_stmt(&mut self, stmt: &BlockStmt, span: Span) -> Self::Stmt;
    fn visit_call_stmt(&mut self, stmt: &CallStmt, span: Span) -> Self::Stmt;
    fn visit_break(&mut self, span: Span) -> Self::Stmt;
    fn visit_continue(&mut self, span: Span) -> Self::Stmt;

    fn visit_constant(&mut self, value: Constant, span: Span) -> Self::Expr;
    fn visit_tuple(&mut self, items: &[Expr], span: Span) -> Self::Expr;
    fn visit_str(&mut self, value: &str, span: Span) -> Self::Expr;
    fn visit_list(&mut self, items: &[Expr], span: Span) -> Self::Expr;
    fn visit_binary(&mut self, left: &Expr, op: BinOp, right: &Expr, span: Span) -> Self::Expr;
    fn visit_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> Self::Expr;
    fn visit_subscript(&mut self, base: &Expr, index: &Expr, span: Span) -> Self::Expr;
    fn visit_call(&mut self, callee: &Ident, args: &[Expr], span: Span) -> Self::Expr;
    fn visit_variable(&mut self, var: &Variable, span: Span) -> Self::Expr;
    fn visit_property(&mut self, base: &Expr, prop: &Ident, span: Span) -> Self::Expr;
    fn visit_net_property(&mut self, net: &NetVariable, prop: &Ident, span: Span) -> Self::Expr;
    fn visit_anonymous_shape(&mut self, value: &Expr, span: Span) -> Self::Expr;
    fn visit_net_variable(&mut self, net: &NetVariable, span: Span) -> Self::Expr;

    fn visit_type(&mut self, ty: &Type) -> Self::Expr;
    fn visit_constraint(&mut self, constraint: &Constraint) -> Self::Expr;
}

impl Program {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> V::Block {
        visitor.visit_program(self)
    }
}

impl ProgramBlock {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> V::Block {
        match self.kind {
            BlockKind::Networks => visitor.visit_networks(self),
            BlockKind::Data => visitor.visit_data(self),
            BlockKind::TransformedData => visitor.visit_transformed_data(self),
            BlockKind::Parameters => visitor.visit_parameters(self),
            BlockKind::TransformedParameters => visitor.visit_transformed_parameters(self),
            BlockKind::GuideParameters => visitor.visit_guide_parameters(self),
            BlockKind::Guide => visitor.visit_guide(self),
            BlockKind::Prior => visitor.visit_prior(self),
            BlockKind::Model => visitor.visit_model(self),
            BlockKind::GeneratedQuantities => visitor.visit_generated_quantities(self),
        }
    }
}

impl Stmt {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> V::Stmt {
        let span = self.span;
        match &self.kind {
            StmtKind::Decl(d) => visitor.visit_variable_decl(d, span),
            StmtKind::NetDecl(n) => visitor.visit_net_decl(n, span),
            StmtKind::Assign(a) => visitor.visit_assign(a, span),
            StmtKind::Sampling(s) => match s.role {
                SamplingRole::Declaration => visitor.visit_sampling_declaration(s, span),
                SamplingRole::Observed => visitor.visit_sampling_observed(s, span),
                SamplingRole::Parameters => visitor.visit_sampling_parameters(s, span),
                SamplingRole::Factor => visitor.visit_sampling_factor(s, span),
            },
            StmtKind::For(f) => visitor.visit_for(f, span),
            StmtKind::Conditional(c) => visitor.visit_conditional(c, span),
            StmtKind::While(w) => visitor.visit_while(w, span),
            StmtKind::Block(b) => visitor.visit_block_stmt(b, span),
            StmtKind::Call(c) => visitor.visit_call_stmt(c, span),
            StmtKind::Break => visitor.visit_break(span),
            StmtKind::Continue => visitor.visit_continue(span),
        }
    }
}

impl Expr {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> V::Expr {
        let span = self.span;
        match &self.kind {
            ExprKind::Constant(c) => visitor.visit_constant(*c, span),
            ExprKind::Tuple(items) => visitor.visit_tuple(items, span),
            ExprKind::Str(s) => visitor.visit_str(s, span),
            ExprKind::List(items) => visitor.visit_list(items, span),
            ExprKind::Binary { left, op, right } => visitor.visit_binary(left, *op, right, span),
            ExprKind::Unary { op, operand } => visitor.visit_unary(*op, operand, span),
            ExprKind::Subscript { base, index } => visitor.visit_subscript(base, index, span),
            ExprKind::Call { callee, args } => visitor.visit_call(callee, args, span),
            ExprKind::Variable(v) => visitor.visit_variable(v, span),
            ExprKind::Property { base, prop } => visitor.visit_property(base, prop, span),
            ExprKind::NetProperty { net, prop } => visitor.visit_net_property(net, prop, span),
            ExprKind::AnonymousShape { value } => visitor.visit_anonymous_shape(value, span),
            ExprKind::NetVariable(n) => visitor.visit_net_variable(n, span),
        }
    }
}

impl Type {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> V::Expr {
        visitor.visit_type(self)
    }
}

impl Constraint {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> V::Expr {
        visitor.visit_constraint(self)
    }
}
