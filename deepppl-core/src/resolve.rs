#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use deepppl_ast::{
    AssignStmt, BlockKind, Expr, ExprKind, Ident, NetVariable, NodeMut, Primitive, Program,
    ProgramBlock, SamplingRole, SamplingStmt, Shape, Span, Stmt, StmtKind, VarType, Variable,
    VariableDecl,
};
use tracing::{debug, trace};

use crate::builtins;
use crate::error::SemanticError;
use crate::types::{decl_shape, infer_kind, infer_shape, NumKind};

/// Binds every variable reference, classifies sampling statements and records the
/// sampled identifiers of model, guide and prior.
pub fn resolve_program(program: &mut Program) -> Result<(), SemanticError> {
    Resolver::new().resolve(program)
}

#[derive(Clone, Debug)]
struct Binding {
    block: BlockKind,
    prim: Primitive,
    shape: Shape,
}

struct Resolver {
    /// Top-level declarations of the declaring blocks.
    globals: HashMap<String, Binding>,
    /// Locals of the current block: loop variables, sampling-block and nested declarations.
    scopes: Vec<HashMap<String, Binding>>,
    networks: HashSet<String>,
    net_params: HashSet<String>,
    current: BlockKind,
    sampled: Vec<String>,
}

/// Whether a top-level declaration of `declared` can be referenced from `current`.
fn visible_from(declared: BlockKind, current: BlockKind) -> bool {
    match declared {
        BlockKind::Data | BlockKind::TransformedData => true,
        BlockKind::Parameters => current >= BlockKind::Parameters,
        BlockKind::TransformedParameters => matches!(
            current,
            BlockKind::TransformedParameters | BlockKind::Model | BlockKind::GeneratedQuantities
        ),
        BlockKind::GuideParameters => {
            matches!(current, BlockKind::GuideParameters | BlockKind::Guide)
        }
        _ => declared == current,
    }
}

impl Resolver {
    fn new() -> Self {
        Self {
            globals: HashMap::new(),
            scopes: Vec::new(),
            networks: HashSet::new(),
            net_params: HashSet::new(),
            current: BlockKind::Networks,
            sampled: Vec::new(),
        }
    }

    fn resolve(&mut self, program: &mut Program) -> Result<(), SemanticError> {
        if let Some(nets) = program.block(BlockKind::Networks) {
            for net in nets.net_decls() {
                if !self.networks.insert(net.name.node.clone()) {
                    return Err(SemanticError::AlreadyDeclared {
                        name: net.name.node.clone(),
                        span: net.name.span,
                    });
                }
            }
        }

        for block in program.blocks_mut() {
            if block.kind != BlockKind::Networks {
                self.resolve_block(block)?;
            }
        }

        // Constructor arguments only see data, which is complete by now.
        if let Some(nets) = program.block_mut(BlockKind::Networks) {
            self.resolve_block(nets)?;
        }
        Ok(())
    }

    fn resolve_block(&mut self, block: &mut ProgramBlock) -> Result<(), SemanticError> {
        self.current = block.kind;
        let local = block.kind.is_sampling();
        if local {
            self.push_scope();
        }
        for stmt in &mut block.body {
            self.resolve_stmt(stmt)?;
        }
        if local {
            self.pop_scope();
        }
        for id in self.sampled.drain(..) {
            block.add_sampled(id);
        }
        debug!(
            block = block.kind.name(),
            sampled = block.sampled().len(),
            "resolved block"
        );
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) -> Result<(), SemanticError> {
        match &mut stmt.kind {
            StmtKind::Decl(decl) => return self.declare(decl),
            StmtKind::Sampling(sampling) => return self.resolve_sampling(sampling),
            StmtKind::Assign(assign) => return self.resolve_assign(assign),
            StmtKind::For(f) => {
                self.resolve_expr(&mut f.from)?;
                self.resolve_expr(&mut f.to)?;
                self.push_scope();
                self.define(&f.var, Primitive::Int, Shape::scalar())?;
                self.resolve_stmt(&mut f.body)?;
                self.pop_scope();
                return Ok(());
            }
            StmtKind::Call(call) => self.check_callee(&call.callee)?,
            _ => {}
        }

        let scoped = matches!(stmt.kind, StmtKind::Block(_));
        if scoped {
            self.push_scope();
        }
        for child in stmt.children_mut()? {
            match child {
                NodeMut::Expr(e) => self.resolve_expr(e)?,
                NodeMut::Stmt(s) => self.resolve_stmt(s)?,
                NodeMut::Block(_) | NodeMut::Type(_) | NodeMut::Constraint(_) => {}
            }
        }
        if scoped {
            self.pop_scope();
        }
        Ok(())
    }

    fn declare(&mut self, decl: &mut VariableDecl) -> Result<(), SemanticError> {
        let prim = decl.ty.prim;
        let name = decl.name().to_string();

        for c in &mut decl.ty.constraints {
            self.resolve_expr(&mut c.value)?;
            if prim == Primitive::Int && infer_kind(&c.value) != NumKind::Int {
                return Err(SemanticError::UnsupportedCoercion {
                    reason: format!("{} bound of int '{name}' is not an integer", c.sort.name()),
                    span: c.value.span,
                });
            }
        }
        for size in &mut decl.ty.size {
            self.resolve_expr(size)?;
        }
        if let Some(dims) = decl.dims.as_mut() {
            self.resolve_expr(dims)?;
        }
        if let Some(init) = decl.init.as_mut() {
            self.resolve_expr(init)?;
            check_coercion(prim, init, &name)?;
        }

        if decl.is_net_param() {
            return self.declare_net_param(decl);
        }

        let shape = decl_shape(&decl.shape_exprs());
        decl.shape = Some(shape.clone());
        self.define(&decl.id, prim, shape)
    }

    fn declare_net_param(&mut self, decl: &VariableDecl) -> Result<(), SemanticError> {
        let name = decl.name().to_string();
        if self.current != BlockKind::Parameters {
            return Err(SemanticError::UndeclaredParameters {
                name,
                span: decl.id.span,
            });
        }
        let root = decl.net_root().unwrap_or_default();
        if !self.networks.contains(root) {
            return Err(SemanticError::UndeclaredNetwork {
                name: root.to_string(),
                span: decl.id.span,
            });
        }
        if !self.net_params.insert(name.clone()) {
            return Err(SemanticError::AlreadyDeclared {
                name,
                span: decl.id.span,
            });
        }
        trace!(param = %name, "network parameter");
        Ok(())
    }

    fn define(&mut self, id: &Ident, prim: Primitive, shape: Shape) -> Result<(), SemanticError> {
        if self.lookup(&id.node).is_some() || self.networks.contains(&id.node) {
            return Err(SemanticError::AlreadyDeclared {
                name: id.node.clone(),
                span: id.span,
            });
        }
        let binding = Binding {
            block: self.current,
            prim,
            shape,
        };
        trace!(name = %id.node, block = self.current.name(), "define");
        match self.scopes.last_mut() {
            Some(scope) => scope.insert(id.node.clone(), binding),
            None => self.globals.insert(id.node.clone(), binding),
        };
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        for scope in self.scopes.iter().rev() {
            if let Some(binding) = scope.get(name) {
                return Some(binding);
            }
        }
        self.globals
            .get(name)
            .filter(|b| visible_from(b.block, self.current))
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        let _ = self.scopes.pop();
    }

    fn resolve_assign(&mut self, assign: &mut AssignStmt) -> Result<(), SemanticError> {
        self.resolve_expr(&mut assign.target)?;
        self.resolve_expr(&mut assign.value)?;
        let prim = match root_variable(&assign.target).and_then(|v| v.ty.as_ref()) {
            Some(ty) => ty.prim,
            None => return Ok(()),
        };
        let name = assign.target.root_id().unwrap_or_default();
        check_coercion(prim, &mut assign.value, &name)
    }

    fn resolve_sampling(&mut self, sampling: &mut SamplingStmt) -> Result<(), SemanticError> {
        for operand in sampling.operands_mut() {
            self.resolve_expr(operand)?;
        }
        if sampling.is_factor() {
            return Ok(());
        }

        if let ExprKind::NetVariable(net) = &sampling.target.kind {
            let id = net.id();
            if !self.net_params.contains(&id) {
                return Err(SemanticError::UndeclaredParameters {
                    name: id,
                    span: sampling.target.span,
                });
            }
        }

        sampling.role = self.classify(&sampling.target);
        sampling.shape = batch_shape(sampling);
        if let Some(id) = sampling.target.root_id() {
            trace!(target = %id, role = ?sampling.role, "sampled");
            self.sampled.push(id);
        }
        Ok(())
    }

    fn classify(&self, target: &Expr) -> SamplingRole {
        match target.root_block() {
            Some(BlockKind::Data | BlockKind::TransformedData) => SamplingRole::Observed,
            Some(BlockKind::Parameters) if self.current == BlockKind::Model => {
                SamplingRole::Parameters
            }
            Some(_) => SamplingRole::Declaration,
            None if data_only(target) => SamplingRole::Observed,
            None => SamplingRole::Declaration,
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr) -> Result<(), SemanticError> {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Variable(v) => return self.bind_variable(v, span),
            ExprKind::NetVariable(net) | ExprKind::NetProperty { net, .. } => {
                return self.bind_network(net, span);
            }
            ExprKind::Call { callee, .. } => self.check_callee(callee)?,
            _ => {}
        }
        for child in expr.children_mut() {
            self.resolve_expr(child)?;
        }
        Ok(())
    }

    fn bind_variable(&self, var: &mut Variable, span: Span) -> Result<(), SemanticError> {
        if let Some(binding) = self.lookup(&var.id) {
            var.bind(
                binding.block,
                VarType {
                    prim: binding.prim,
                    shape: binding.shape.clone(),
                },
            );
            return Ok(());
        }
        if self.networks.contains(&var.id) {
            var.bind(
                BlockKind::Networks,
                VarType {
                    prim: Primitive::Real,
                    shape: Shape::scalar(),
                },
            );
            return Ok(());
        }
        Err(SemanticError::UndeclaredVariable {
            name: var.id.clone(),
            span,
        })
    }

    fn bind_network(&self, net: &mut NetVariable, span: Span) -> Result<(), SemanticError> {
        self.check_network(&net.name, span)?;
        net.block = Some(if self.net_params.contains(&net.id()) {
            BlockKind::Parameters
        } else {
            BlockKind::Networks
        });
        Ok(())
    }

    fn check_callee(&self, callee: &Ident) -> Result<(), SemanticError> {
        if builtins::is_builtin_function(&callee.node) {
            return Ok(());
        }
        self.check_network(&callee.node, callee.span)
    }

    /// A missing network is reported against the block that needed it.
    fn check_network(&self, name: &str, span: Span) -> Result<(), SemanticError> {
        if self.networks.contains(name) {
            return Ok(());
        }
        let name = name.to_string();
        Err(match self.current {
            BlockKind::Guide => SemanticError::MissingGuideNet { name, span },
            BlockKind::Prior => SemanticError::MissingPriorNet { name, span },
            _ => SemanticError::UndeclaredNetwork { name, span },
        })
    }
}

fn root_variable(expr: &Expr) -> Option<&Variable> {
    match &expr.kind {
        ExprKind::Variable(v) => Some(v),
        ExprKind::Subscript { base, .. } => root_variable(base),
        _ => None,
    }
}

/// Literal values take the kind of the receiving variable; a real value never flows into
/// an int.
fn check_coercion(prim: Primitive, value: &mut Expr, name: &str) -> Result<(), SemanticError> {
    let span = value.span;
    value
        .coerce_literal(prim)
        .map_err(|c| SemanticError::UnsupportedCoercion {
            reason: format!("cannot store real literal {c} in int '{name}'"),
            span,
        })?;
    if prim == Primitive::Int && infer_kind(value) == NumKind::Real {
        return Err(SemanticError::UnsupportedCoercion {
            reason: format!("cannot store a real value in int '{name}'"),
            span,
        });
    }
    Ok(())
}

/// True when every variable the expression reads is data or transformed data.
fn data_only(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Variable(v) => matches!(
            v.block,
            Some(BlockKind::Data | BlockKind::TransformedData)
        ),
        ExprKind::NetVariable(_) | ExprKind::NetProperty { .. } | ExprKind::Call { .. } => false,
        ExprKind::Subscript { base, .. } => data_only(base),
        _ => expr.children().into_iter().all(data_only),
    }
}

/// Shape a whole-variable target imposes on scalar-parameterized distributions.
fn batch_shape(sampling: &SamplingStmt) -> Option<Shape> {
    let ExprKind::Variable(v) = &sampling.target.kind else {
        return None;
    };
    let shape = v.ty.as_ref().map(|t| t.shape.clone())?;
    if shape.is_scalar() {
        return None;
    }
    let scalar_args = sampling
        .args
        .iter()
        .all(|a| infer_shape(a).is_some_and(|s| s.is_scalar()));
    scalar_args.then_some(shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_are_hidden_from_data_blocks() {
        assert!(!visible_from(BlockKind::Parameters, BlockKind::TransformedData));
        assert!(visible_from(BlockKind::Parameters, BlockKind::Model));
        assert!(visible_from(BlockKind::Data, BlockKind::Networks));
    }

    #[test]
    fn guide_parameters_stay_in_the_guide() {
        assert!(visible_from(BlockKind::GuideParameters, BlockKind::Guide));
        assert!(!visible_from(BlockKind::GuideParameters, BlockKind::Model));
    }

    #[test]
    fn generated_quantities_are_private() {
        assert!(!visible_from(BlockKind::GeneratedQuantities, BlockKind::Model));
        assert!(visible_from(
            BlockKind::TransformedParameters,
            BlockKind::GeneratedQuantities
        ));
    }
}
