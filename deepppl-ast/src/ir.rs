#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use miette::Diagnostic;
use thiserror::Error;

use crate::{Ident, Span};

/// The ten block kinds, declared in canonical evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockKind {
    Networks,
    Data,
    TransformedData,
    Parameters,
    TransformedParameters,
    GuideParameters,
    Guide,
    Prior,
    Model,
    GeneratedQuantities,
}

impl BlockKind {
    pub const COUNT: usize = 10;

    pub const ALL: [BlockKind; BlockKind::COUNT] = [
        BlockKind::Networks,
        BlockKind::Data,
        BlockKind::TransformedData,
        BlockKind::Parameters,
        BlockKind::TransformedParameters,
        BlockKind::GuideParameters,
        BlockKind::Guide,
        BlockKind::Prior,
        BlockKind::Model,
        BlockKind::GeneratedQuantities,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical tag (`transformeddata`, `guideparameters`, ...).
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Networks => "networks",
            BlockKind::Data => "data",
            BlockKind::TransformedData => "transformeddata",
            BlockKind::Parameters => "parameters",
            BlockKind::TransformedParameters => "transformedparameters",
            BlockKind::GuideParameters => "guideparameters",
            BlockKind::Guide => "guide",
            BlockKind::Prior => "prior",
            BlockKind::Model => "model",
            BlockKind::GeneratedQuantities => "generatedquantities",
        }
    }

    /// Block header as written in source.
    pub fn source_name(self) -> &'static str {
        match self {
            BlockKind::Networks => "networks",
            BlockKind::Data => "data",
            BlockKind::TransformedData => "transformed data",
            BlockKind::Parameters => "parameters",
            BlockKind::TransformedParameters => "transformed parameters",
            BlockKind::GuideParameters => "guide parameters",
            BlockKind::Guide => "guide",
            BlockKind::Prior => "prior",
            BlockKind::Model => "model",
            BlockKind::GeneratedQuantities => "generated quantities",
        }
    }

    /// Blocks in which `~` and `target +=` are meaningful.
    pub fn is_sampling(self) -> bool {
        matches!(self, BlockKind::Model | BlockKind::Guide | BlockKind::Prior)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    blocks: [Option<ProgramBlock>; BlockKind::COUNT],
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `block` in its slot. A second block of the same kind is handed back untouched.
    pub fn insert(&mut self, block: ProgramBlock) -> Result<(), ProgramBlock> {
        let slot = &mut self.blocks[block.kind.index()];
        if slot.is_some() {
            return Err(block);
        }
        *slot = Some(block);
        Ok(())
    }

    pub fn block(&self, kind: BlockKind) -> Option<&ProgramBlock> {
        self.blocks[kind.index()].as_ref()
    }

    pub fn block_mut(&mut self, kind: BlockKind) -> Option<&mut ProgramBlock> {
        self.blocks[kind.index()].as_mut()
    }

    pub fn has(&self, kind: BlockKind) -> bool {
        self.blocks[kind.index()].is_some()
    }

    /// Present blocks in canonical order.
    pub fn blocks(&self) -> impl Iterator<Item = &ProgramBlock> {
        self.blocks.iter().flatten()
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut ProgramBlock> {
        self.blocks.iter_mut().flatten()
    }

    /// Top-level declarations of `kind`, empty when the block is absent.
    pub fn decls(&self, kind: BlockKind) -> impl Iterator<Item = &VariableDecl> {
        self.block(kind).into_iter().flat_map(|b| b.decls())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgramBlock {
    pub kind: BlockKind,
    pub span: Span,
    pub body: Vec<Stmt>,
    sampled: BTreeSet<String>,
}

impl ProgramBlock {
    pub fn new(kind: BlockKind, span: Span, body: Vec<Stmt>) -> Self {
        Self {
            kind,
            span,
            body,
            sampled: BTreeSet::new(),
        }
    }

    /// Records that `id` is the target of a sampling statement in this block.
    /// Only model, guide and prior blocks keep this set.
    pub fn add_sampled(&mut self, id: impl Into<String>) {
        if self.kind.is_sampling() {
            self.sampled.insert(id.into());
        }
    }

    pub fn sampled(&self) -> &BTreeSet<String> {
        &self.sampled
    }

    pub fn is_sampled(&self, id: &str) -> bool {
        self.sampled.contains(id)
    }

    pub fn decls(&self) -> impl Iterator<Item = &VariableDecl> {
        self.body.iter().filter_map(|s| match &s.kind {
            StmtKind::Decl(d) => Some(d),
            _ => None,
        })
    }

    pub fn net_decls(&self) -> impl Iterator<Item = &NetDeclaration> {
        self.body.iter().filter_map(|s| match &s.kind {
            StmtKind::NetDecl(d) => Some(d),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(span: Span, kind: StmtKind) -> Self {
        Self { span, kind }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Decl(VariableDecl),
    NetDecl(NetDeclaration),
    Assign(AssignStmt),
    Sampling(SamplingStmt),
    For(ForStmt),
    Conditional(ConditionalStmt),
    While(WhileStmt),
    Block(BlockStmt),
    Call(CallStmt),
    Break,
    Continue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub target: Expr,
    pub value: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplingRole {
    /// Introduces a latent sample (guide, prior, block locals).
    Declaration,
    /// Conditions on data.
    Observed,
    /// Scores a parameter inside the model.
    Parameters,
    /// `target += e`.
    Factor,
}

/// `target ~ dist(args)` or `target += e`.
///
/// The generic child protocol refuses to enter sampling statements; passes reach the
/// operands through [`SamplingStmt::operands`] and [`SamplingStmt::operands_mut`].
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingStmt {
    pub role: SamplingRole,
    pub target: Expr,
    pub dist: Option<Ident>,
    pub args: Vec<Expr>,
    /// Batch shape of the target when the distribution arguments are all scalars.
    pub shape: Option<Shape>,
}

impl SamplingStmt {
    /// Role is provisional until the resolver classifies the statement.
    pub fn new(target: Expr, dist: Ident, args: Vec<Expr>) -> Self {
        Self {
            role: SamplingRole::Declaration,
            target,
            dist: Some(dist),
            args,
            shape: None,
        }
    }

    pub fn factor(value: Expr) -> Self {
        Self {
            role: SamplingRole::Factor,
            target: value,
            dist: None,
            args: Vec::new(),
            shape: None,
        }
    }

    pub fn is_factor(&self) -> bool {
        self.role == SamplingRole::Factor
    }

    pub fn dist_name(&self) -> Option<&str> {
        self.dist.as_ref().map(|d| d.node.as_str())
    }

    /// Target followed by the distribution arguments.
    pub fn operands(&self) -> impl Iterator<Item = &Expr> {
        std::iter::once(&self.target).chain(self.args.iter())
    }

    pub fn operands_mut(&mut self) -> impl Iterator<Item = &mut Expr> {
        std::iter::once(&mut self.target).chain(self.args.iter_mut())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub var: Ident,
    pub from: Expr,
    pub to: Expr,
    pub body: Box<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalStmt {
    pub test: Expr,
    pub then_branch: Box<Stmt>,
    pub else_branch: Option<Box<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub test: Expr,
    pub body: Box<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockStmt {
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallStmt {
    pub callee: Ident,
    pub args: Vec<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclRole {
    Data,
    TransformedData,
    Parameters,
    TransformedParameters,
    GeneratedQuantities,
}

impl DeclRole {
    /// Role given to top-level declarations of `kind`; `None` for blocks whose
    /// declarations are locals or guide parameters.
    pub fn for_block(kind: BlockKind) -> Option<DeclRole> {
        match kind {
            BlockKind::Data => Some(DeclRole::Data),
            BlockKind::TransformedData => Some(DeclRole::TransformedData),
            BlockKind::Parameters => Some(DeclRole::Parameters),
            BlockKind::TransformedParameters => Some(DeclRole::TransformedParameters),
            BlockKind::GeneratedQuantities => Some(DeclRole::GeneratedQuantities),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDecl {
    pub id: Ident,
    /// Array dimensions: a single expression, or a `Tuple` for several.
    pub dims: Option<Expr>,
    pub init: Option<Expr>,
    pub ty: Type,
    role: Option<DeclRole>,
    /// Filled by the resolver.
    pub shape: Option<Shape>,
}

impl VariableDecl {
    pub fn new(id: Ident, dims: Option<Expr>, init: Option<Expr>, ty: Type) -> Self {
        Self {
            id,
            dims,
            init,
            ty,
            role: None,
            shape: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.id.node
    }

    pub fn role(&self) -> Option<DeclRole> {
        self.role
    }

    /// Setting a role replaces any previous one: a declaration has at most one.
    pub fn set_role(&mut self, role: DeclRole) {
        self.role = Some(role);
    }

    pub fn is_data(&self) -> bool {
        self.role == Some(DeclRole::Data)
    }

    pub fn is_transformed_data(&self) -> bool {
        self.role == Some(DeclRole::TransformedData)
    }

    pub fn is_parameters(&self) -> bool {
        self.role == Some(DeclRole::Parameters)
    }

    pub fn is_transformed_parameters(&self) -> bool {
        self.role == Some(DeclRole::TransformedParameters)
    }

    pub fn is_generated_quantities(&self) -> bool {
        self.role == Some(DeclRole::GeneratedQuantities)
    }

    /// `real mlp.l1.weight;` declares a parameter of network `mlp`.
    pub fn is_net_param(&self) -> bool {
        self.id.node.contains('.')
    }

    pub fn net_root(&self) -> Option<&str> {
        self.id.node.split_once('.').map(|(root, _)| root)
    }

    /// Array dimension expressions in order.
    pub fn dim_exprs(&self) -> Vec<&Expr> {
        match &self.dims {
            None => Vec::new(),
            Some(Expr {
                kind: ExprKind::Tuple(items),
                ..
            }) => items.iter().collect(),
            Some(e) => vec![e],
        }
    }

    /// Array dimensions followed by the vector/matrix size.
    pub fn shape_exprs(&self) -> Vec<&Expr> {
        let mut out = self.dim_exprs();
        out.extend(self.ty.size.iter());
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    Real,
    Vector,
    Matrix,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Real => "real",
            Primitive::Vector => "vector",
            Primitive::Matrix => "matrix",
        }
    }

    /// Number of size expressions the primitive carries.
    pub fn rank(self) -> usize {
        match self {
            Primitive::Int | Primitive::Real => 0,
            Primitive::Vector => 1,
            Primitive::Matrix => 2,
        }
    }
}

impl FromStr for Primitive {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(Primitive::Int),
            "real" => Ok(Primitive::Real),
            "vector" => Ok(Primitive::Vector),
            "matrix" => Ok(Primitive::Matrix),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum ConstructionError {
    #[error("unknown type '{name}'")]
    #[diagnostic(code(deepppl::unknown_type))]
    UnknownPrimitive {
        name: String,
        #[label]
        span: Span,
    },
    #[error("unknown constraint '{name}'; expected 'lower' or 'upper'")]
    #[diagnostic(code(deepppl::unknown_constraint))]
    UnknownConstraint {
        name: String,
        #[label]
        span: Span,
    },
    #[error("bound of an int type must be an integer, found {value}")]
    #[diagnostic(code(deepppl::non_integral_bound))]
    NonIntegralBound {
        value: f64,
        #[label]
        span: Span,
    },
    #[error("type '{prim}' takes {expected} size expression(s), found {found}")]
    #[diagnostic(code(deepppl::type_size))]
    SizeArity {
        prim: Primitive,
        expected: usize,
        found: usize,
        #[label]
        span: Span,
    },
}

impl ConstructionError {
    pub fn span(&self) -> Span {
        match self {
            ConstructionError::UnknownPrimitive { span, .. }
            | ConstructionError::UnknownConstraint { span, .. }
            | ConstructionError::NonIntegralBound { span, .. }
            | ConstructionError::SizeArity { span, .. } => *span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Type {
    pub span: Span,
    pub prim: Primitive,
    pub constraints: Vec<Constraint>,
    pub is_array: bool,
    /// `vector[N]` carries `[N]`, `matrix[M, N]` carries `[M, N]`.
    pub size: Vec<Expr>,
}

impl Type {
    /// Builds a declaration type, coercing literal bounds to the primitive's numeric kind.
    pub fn new(
        span: Span,
        prim: &str,
        mut constraints: Vec<Constraint>,
        is_array: bool,
        size: Vec<Expr>,
    ) -> Result<Self, ConstructionError> {
        let prim: Primitive = prim.parse().map_err(|()| ConstructionError::UnknownPrimitive {
            name: prim.to_string(),
            span,
        })?;
        if size.len() != prim.rank() {
            return Err(ConstructionError::SizeArity {
                prim,
                expected: prim.rank(),
                found: size.len(),
                span,
            });
        }
        for c in &mut constraints {
            let span = c.value.span;
            c.value
                .coerce_literal(prim)
                .map_err(|value| ConstructionError::NonIntegralBound {
                    value: value.as_f64(),
                    span,
                })?;
        }
        Ok(Self {
            span,
            prim,
            constraints,
            is_array,
            size,
        })
    }

    pub fn is_int(&self) -> bool {
        self.prim == Primitive::Int
    }

    pub fn lower(&self) -> Option<&Expr> {
        self.bound(ConstraintSort::Lower)
    }

    pub fn upper(&self) -> Option<&Expr> {
        self.bound(ConstraintSort::Upper)
    }

    fn bound(&self, sort: ConstraintSort) -> Option<&Expr> {
        self.constraints
            .iter()
            .find(|c| c.sort == sort)
            .map(|c| &c.value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintSort {
    Lower,
    Upper,
}

impl ConstraintSort {
    pub fn parse(name: &Ident) -> Result<Self, ConstructionError> {
        match name.node.as_str() {
            "lower" => Ok(ConstraintSort::Lower),
            "upper" => Ok(ConstraintSort::Upper),
            other => Err(ConstructionError::UnknownConstraint {
                name: other.to_string(),
                span: name.span,
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConstraintSort::Lower => "lower",
            ConstraintSort::Upper => "upper",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub span: Span,
    pub sort: ConstraintSort,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NetDeclaration {
    pub name: Ident,
    pub net_cls: Ident,
    pub params: Vec<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constant {
    Int(i64),
    Real(f64),
}

impl Constant {
    /// Integral reals become ints; other reals are returned as the error.
    pub fn ensure_int(self) -> Result<Constant, Constant> {
        match self {
            Constant::Int(_) => Ok(self),
            Constant::Real(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                Ok(Constant::Int(v as i64))
            }
            Constant::Real(_) => Err(self),
        }
    }

    pub fn ensure_real(self) -> Constant {
        match self {
            Constant::Int(n) => Constant::Real(n as f64),
            Constant::Real(_) => self,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, Constant::Int(_))
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Constant::Int(n) => n as f64,
            Constant::Real(v) => v,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{n}"),
            Constant::Real(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{v:.1}"),
            Constant::Real(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Dim {
    Known(i64),
    Symbol(String),
    #[default]
    Unknown,
}

impl Dim {
    /// Two dims conflict only when both are known and differ.
    pub fn compatible(&self, other: &Dim) -> bool {
        !matches!((self, other), (Dim::Known(a), Dim::Known(b)) if a != b)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Known(n) => write!(f, "{n}"),
            Dim::Symbol(s) => f.write_str(s),
            Dim::Unknown => f.write_str("?"),
        }
    }
}

/// Static shape; the empty shape is a scalar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape(pub Vec<Dim>);

impl Shape {
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    /// Shape left after indexing the first `n` dimensions.
    pub fn drop_leading(&self, n: usize) -> Shape {
        Shape(self.0.iter().skip(n).cloned().collect())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self
            .0
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{dims}]")
    }
}

/// Resolved type of a variable reference.
#[derive(Clone, Debug, PartialEq)]
pub struct VarType {
    pub prim: Primitive,
    pub shape: Shape,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub id: String,
    pub block: Option<BlockKind>,
    pub ty: Option<VarType>,
}

impl Variable {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            block: None,
            ty: None,
        }
    }

    pub fn bind(&mut self, block: BlockKind, ty: VarType) {
        debug_assert!(self.block.is_none(), "variable '{}' bound twice", self.id);
        self.block = Some(block);
        self.ty = Some(ty);
    }
}

/// `mlp.l1.weight`: a network root followed by a member path.
#[derive(Clone, Debug, PartialEq)]
pub struct NetVariable {
    pub name: String,
    pub path: Vec<String>,
    pub block: Option<BlockKind>,
}

impl NetVariable {
    pub fn new(name: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            name: name.into(),
            path,
            block: None,
        }
    }

    pub fn id(&self) -> String {
        std::iter::once(self.name.as_str())
            .chain(self.path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Path below the network root (`l1.weight`).
    pub fn member(&self) -> String {
        self.path.join(".")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Plus,
    Minus,
    Pow,
    Mult,
    DotMult,
    Div,
    DotDiv,
    Mod,
    And,
    Or,
    LE,
    GE,
    LT,
    GT,
    EQ,
    NE,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Plus => "+",
            BinOp::Minus => "-",
            BinOp::Pow => "^",
            BinOp::Mult => "*",
            BinOp::DotMult => ".*",
            BinOp::Div => "/",
            BinOp::DotDiv => "./",
            BinOp::Mod => "%",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::LE => "<=",
            BinOp::GE => ">=",
            BinOp::LT => "<",
            BinOp::GT => ">",
            BinOp::EQ => "==",
            BinOp::NE => "!=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::LE | BinOp::GE | BinOp::LT | BinOp::GT | BinOp::EQ | BinOp::NE
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    UPlus,
    UMinus,
    UNot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Constant(Constant),
    Tuple(Vec<Expr>),
    Str(String),
    List(Vec<Expr>),
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Several indices are carried as a `Tuple`.
    Subscript {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    Variable(Variable),
    /// `x$prop`
    Property {
        base: Box<Expr>,
        prop: Ident,
    },
    /// `mlp.l1.weight$prop`
    NetProperty {
        net: NetVariable,
        prop: Ident,
    },
    /// `(e)$shape`: the generator binds `e` to a fresh name before querying its shape.
    AnonymousShape {
        value: Box<Expr>,
    },
    NetVariable(NetVariable),
}

impl Expr {
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind }
    }

    /// True when every variable reachable from this expression is bound to `kind`.
    pub fn in_block(&self, kind: BlockKind) -> bool {
        match &self.kind {
            ExprKind::Variable(v) => v.block == Some(kind),
            ExprKind::NetVariable(n) | ExprKind::NetProperty { net: n, .. } => n.block == Some(kind),
            ExprKind::Subscript { base, .. } => base.in_block(kind),
            _ => self.children().into_iter().all(|c| c.in_block(kind)),
        }
    }

    pub fn is_data_var(&self) -> bool {
        self.in_block(BlockKind::Data)
    }

    pub fn is_transformed_data_var(&self) -> bool {
        self.in_block(BlockKind::TransformedData)
    }

    pub fn is_params_var(&self) -> bool {
        self.in_block(BlockKind::Parameters)
    }

    pub fn is_guide_var(&self) -> bool {
        self.in_block(BlockKind::Guide)
    }

    pub fn is_guide_parameters_var(&self) -> bool {
        self.in_block(BlockKind::GuideParameters)
    }

    pub fn is_prior_var(&self) -> bool {
        self.in_block(BlockKind::Prior)
    }

    pub fn is_generated_quantities_var(&self) -> bool {
        self.in_block(BlockKind::GeneratedQuantities)
    }

    /// Identifier of the variable this expression designates, looking through subscripts.
    pub fn root_id(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Variable(v) => Some(v.id.clone()),
            ExprKind::NetVariable(n) => Some(n.id()),
            ExprKind::Subscript { base, .. } => base.root_id(),
            _ => None,
        }
    }

    /// Block tag of the designated variable, looking through subscripts.
    pub fn root_block(&self) -> Option<BlockKind> {
        match &self.kind {
            ExprKind::Variable(v) => v.block,
            ExprKind::NetVariable(n) => n.block,
            ExprKind::Subscript { base, .. } => base.root_block(),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<Constant> {
        match &self.kind {
            ExprKind::Constant(c) => Some(*c),
            ExprKind::Unary {
                op: UnaryOp::UMinus,
                operand,
            } => match operand.as_constant()? {
                Constant::Int(n) => Some(Constant::Int(-n)),
                Constant::Real(v) => Some(Constant::Real(-v)),
            },
            ExprKind::Unary {
                op: UnaryOp::UPlus,
                operand,
            } => operand.as_constant(),
            _ => None,
        }
    }

    /// Rewrites a (possibly signed) literal into the numeric representation of `prim`.
    ///
    /// Returns `Ok(false)` when the expression is not a literal and the offending
    /// constant when an int is required but the literal is not integral.
    pub fn coerce_literal(&mut self, prim: Primitive) -> Result<bool, Constant> {
        match &mut self.kind {
            ExprKind::Constant(c) => {
                *c = if prim == Primitive::Int {
                    c.ensure_int()?
                } else {
                    c.ensure_real()
                };
                Ok(true)
            }
            ExprKind::Unary {
                op: UnaryOp::UMinus | UnaryOp::UPlus,
                operand,
            } => operand.coerce_literal(prim),
            _ => Ok(false),
        }
    }

    /// Index expressions of a subscript, in order.
    pub fn indices(index: &Expr) -> Vec<&Expr> {
        match &index.kind {
            ExprKind::Tuple(items) => items.iter().collect(),
            _ => vec![index],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span;

    fn var(id: &str, block: Option<BlockKind>) -> Expr {
        let mut v = Variable::new(id);
        v.block = block;
        Expr::new(span(0, 1), ExprKind::Variable(v))
    }

    fn int(n: i64) -> Expr {
        Expr::new(span(0, 1), ExprKind::Constant(Constant::Int(n)))
    }

    fn real(v: f64) -> Expr {
        Expr::new(span(0, 1), ExprKind::Constant(Constant::Real(v)))
    }

    fn bound(sort: ConstraintSort, value: Expr) -> Constraint {
        Constraint {
            span: span(0, 1),
            sort,
            value,
        }
    }

    #[test]
    fn program_rejects_second_block_of_a_kind() {
        let mut program = Program::new();
        program
            .insert(ProgramBlock::new(BlockKind::Model, span(0, 1), Vec::new()))
            .unwrap();
        let rejected = program
            .insert(ProgramBlock::new(BlockKind::Model, span(5, 1), Vec::new()))
            .unwrap_err();
        assert_eq!(rejected.span, span(5, 1));
        assert_eq!(program.blocks().count(), 1);
    }

    #[test]
    fn blocks_iterate_in_canonical_order() {
        let mut program = Program::new();
        for kind in [BlockKind::Model, BlockKind::Data, BlockKind::Guide, BlockKind::Networks] {
            program
                .insert(ProgramBlock::new(kind, span(0, 0), Vec::new()))
                .unwrap();
        }
        let kinds: Vec<_> = program.blocks().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![BlockKind::Networks, BlockKind::Data, BlockKind::Guide, BlockKind::Model]
        );
    }

    #[test]
    fn only_sampling_blocks_record_sampled_ids() {
        let mut model = ProgramBlock::new(BlockKind::Model, span(0, 0), Vec::new());
        let mut data = ProgramBlock::new(BlockKind::Data, span(0, 0), Vec::new());
        model.add_sampled("theta");
        data.add_sampled("theta");
        assert!(model.is_sampled("theta"));
        assert!(data.sampled().is_empty());
    }

    #[test]
    fn int_type_coerces_integral_real_bounds() {
        let ty = Type::new(
            span(0, 3),
            "int",
            vec![bound(ConstraintSort::Lower, real(0.0))],
            false,
            Vec::new(),
        )
        .unwrap();
        assert_eq!(ty.lower().and_then(Expr::as_constant), Some(Constant::Int(0)));
    }

    #[test]
    fn real_type_promotes_int_bounds() {
        let ty = Type::new(
            span(0, 4),
            "real",
            vec![bound(ConstraintSort::Upper, int(1))],
            false,
            Vec::new(),
        )
        .unwrap();
        assert_eq!(ty.upper().and_then(Expr::as_constant), Some(Constant::Real(1.0)));
    }

    #[test]
    fn int_type_rejects_fractional_bound() {
        let err = Type::new(
            span(0, 3),
            "int",
            vec![bound(ConstraintSort::Lower, real(0.5))],
            false,
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConstructionError::NonIntegralBound { .. }));
    }

    #[test]
    fn unknown_primitive_is_a_construction_error() {
        let err = Type::new(span(0, 7), "simplex", Vec::new(), false, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("simplex"));
    }

    #[test]
    fn vector_requires_one_size() {
        let err = Type::new(span(0, 6), "vector", Vec::new(), false, Vec::new()).unwrap_err();
        assert!(matches!(err, ConstructionError::SizeArity { expected: 1, found: 0, .. }));
    }

    #[test]
    fn block_predicates_fold_over_children() {
        let sum = Expr::new(
            span(0, 5),
            ExprKind::Binary {
                left: Box::new(var("x", Some(BlockKind::Data))),
                op: BinOp::Plus,
                right: Box::new(var("y", Some(BlockKind::Data))),
            },
        );
        assert!(sum.is_data_var());

        let mixed = Expr::new(
            span(0, 5),
            ExprKind::Binary {
                left: Box::new(var("x", Some(BlockKind::Data))),
                op: BinOp::Plus,
                right: Box::new(var("theta", Some(BlockKind::Parameters))),
            },
        );
        assert!(!mixed.is_data_var());
        assert!(!mixed.is_params_var());
    }

    #[test]
    fn subscript_delegates_to_its_base() {
        let sub = Expr::new(
            span(0, 4),
            ExprKind::Subscript {
                base: Box::new(var("y", Some(BlockKind::Data))),
                index: Box::new(var("i", Some(BlockKind::Model))),
            },
        );
        assert!(sub.is_data_var());
        assert_eq!(sub.root_id().as_deref(), Some("y"));
    }

    #[test]
    fn net_variable_id_is_dot_joined() {
        let net = NetVariable::new("mlp", vec!["l1".into(), "weight".into()]);
        assert_eq!(net.id(), "mlp.l1.weight");
        assert_eq!(net.member(), "l1.weight");
    }

    #[test]
    fn real_constants_display_with_a_fraction() {
        assert_eq!(Constant::Real(1.0).to_string(), "1.0");
        assert_eq!(Constant::Real(0.25).to_string(), "0.25");
        assert_eq!(Constant::Int(3).to_string(), "3");
    }
}
