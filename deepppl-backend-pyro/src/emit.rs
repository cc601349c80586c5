#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::collections::HashSet;

use deepppl_ast::{
    AssignStmt, BinOp, BlockKind, BlockStmt, CallStmt, ConditionalStmt, Constant, Constraint,
    ConstraintSort, Dim, Expr, ExprKind, ForStmt, Ident, NetDeclaration, NetVariable, Primitive,
    Program, ProgramBlock, SamplingStmt, Shape, Span, Stmt, StmtKind, Type, UnaryOp, Variable,
    VariableDecl, Visitor, WhileStmt,
};
use deepppl_core::builtins::{self, Distribution};
use deepppl_core::types::{infer_kind, infer_shape, is_matmul, NumKind};
use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, trace};

use crate::names::{py_name, quote, NameGen};
use crate::usage::{self, Usage};

const HEADER: &str = "\
import torch
from torch import tensor, rand, randn, zeros, ones
import pyro
import torch.distributions.constraints as constraints
import pyro.distributions as dist
from deepppl.utils.utils import ImproperUniform, LowerConstrainedImproperUniform, UpperConstrainedImproperUniform
";

#[derive(Debug, Error, Diagnostic)]
#[error("code generation failed: {message}")]
#[diagnostic(code(deepppl::generate))]
#[allow(unused_assignments)]
pub struct GenError {
    pub message: String,
    #[label]
    pub span: Span,
}

impl GenError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// Annotate local declarations with Python types.
    pub verbose: bool,
}

/// Lowers a resolved and validated program to a Pyro module.
pub fn emit_program(program: &Program, options: &EmitOptions) -> Result<String, GenError> {
    let mut names = NameGen::new();
    emit_program_with(program, options, &mut names)
}

/// Like [`emit_program`], drawing synthesized names from `names`.
pub fn emit_program_with(
    program: &Program,
    options: &EmitOptions,
    names: &mut NameGen,
) -> Result<String, GenError> {
    let mut emitter = Emitter {
        program,
        options: *options,
        names,
        out: String::new(),
        indent: 0,
        hoisted: Vec::new(),
        loop_vars: Vec::new(),
        lifted: HashSet::new(),
        current: BlockKind::Networks,
    };
    program.accept(&mut emitter)?;
    debug!(
        bytes = emitter.out.len(),
        anon = emitter.names.anon_count(),
        "generated python"
    );
    Ok(emitter.out)
}

/// Python binding strength, weakest first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest,
    Or,
    And,
    Not,
    Cmp,
    Add,
    Mul,
    Unary,
    Pow,
    Postfix,
    Primary,
}

/// A rendered Python expression.
#[derive(Clone, Debug)]
pub struct Py {
    text: String,
    prec: Prec,
}

impl Py {
    fn new(text: impl Into<String>, prec: Prec) -> Self {
        Self {
            text: text.into(),
            prec,
        }
    }

    fn primary(text: impl Into<String>) -> Self {
        Self::new(text, Prec::Primary)
    }

    /// Text, parenthesized when it binds looser than `min`.
    fn at(self, min: Prec) -> String {
        if self.prec < min {
            format!("({})", self.text)
        } else {
            self.text
        }
    }
}

type ExprResult = Result<Py, GenError>;
type StmtResult = Result<(), GenError>;

struct Emitter<'a> {
    program: &'a Program,
    options: EmitOptions,
    names: &'a mut NameGen,
    out: String,
    indent: usize,
    /// `anonN = ...` bindings that must precede the statement being emitted.
    hoisted: Vec<String>,
    loop_vars: Vec<String>,
    /// Networks referenced through their `lifted_` module in the current function.
    lifted: HashSet<String>,
    current: BlockKind,
}

impl Emitter<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Writes pending hoisted bindings, then `text`.
    fn emit(&mut self, text: &str) {
        for binding in std::mem::take(&mut self.hoisted) {
            self.line(&binding);
        }
        self.line(text);
    }

    fn expr(&mut self, e: &Expr) -> Result<String, GenError> {
        Ok(e.accept(self)?.text)
    }

    fn operand(&mut self, e: &Expr, min: Prec) -> Result<String, GenError> {
        Ok(e.accept(self)?.at(min))
    }

    fn args(&mut self, args: &[Expr]) -> Result<Vec<String>, GenError> {
        args.iter().map(|a| self.expr(a)).collect()
    }

    fn function(
        &mut self,
        name: &str,
        params: &str,
        body: impl FnOnce(&mut Self) -> StmtResult,
    ) -> StmtResult {
        trace!(function = name, "emit function");
        self.out.push_str("\n\n");
        self.line(&format!("def {name}({params}):"));
        self.indent += 1;
        let start = self.out.len();
        let result = body(self);
        if self.out.len() == start {
            self.line("pass");
        }
        self.indent -= 1;
        self.lifted.clear();
        self.loop_vars.clear();
        self.hoisted.clear();
        result
    }

    fn nested(&mut self, stmt: &Stmt) -> StmtResult {
        self.indent += 1;
        let start = self.out.len();
        let result = stmt.accept(self);
        if self.out.len() == start {
            self.line("pass");
        }
        self.indent -= 1;
        result
    }

    fn data_names(&self) -> Vec<String> {
        self.program
            .decls(BlockKind::Data)
            .map(|d| py_name(d.name()))
            .collect()
    }

    /// Keyword parameters defaulting to `None`: data, then `extra`, then transformed data.
    fn signature(&self, extra: &[String]) -> String {
        let mut params: Vec<String> = self
            .data_names()
            .into_iter()
            .chain(extra.iter().cloned())
            .map(|n| format!("{n}=None"))
            .collect();
        if self.program.has(BlockKind::TransformedData) {
            params.push("transformed_data=None".to_string());
        }
        params.join(", ")
    }

    fn call_args(&self) -> String {
        let mut args: Vec<String> = self
            .data_names()
            .into_iter()
            .map(|n| format!("{n}={n}"))
            .collect();
        if self.program.has(BlockKind::TransformedData) {
            args.push("transformed_data=transformed_data".to_string());
        }
        args.join(", ")
    }

    fn register_networks(&mut self, kinds: &[BlockKind], lifted: &[String]) {
        let usage = Usage::of(self.program, kinds);
        for net in usage::networks(self.program) {
            if usage.networks.contains(&net) && !lifted.contains(&net) {
                self.line(&format!("pyro.module({}, {})", quote(&net), py_name(&net)));
            }
        }
    }

    fn unpack_transformed_data(&mut self, kinds: &[BlockKind]) {
        let usage = Usage::of(self.program, kinds);
        let program = self.program;
        for decl in program.decls(BlockKind::TransformedData) {
            if usage.transformed_data.contains(decl.name()) {
                let name = py_name(decl.name());
                self.line(&format!("{name} = transformed_data[{}]", quote(decl.name())));
            }
        }
    }

    /// Dictionary collecting the parameter distributions of `net` in the current block.
    fn lift_dict(&self, net: &str) -> String {
        format!("{}_{}", self.current.name(), net)
    }

    fn open_lift_dicts(&mut self, nets: &[String]) {
        for net in nets {
            let dict = self.lift_dict(net);
            self.line(&format!("{dict} = {{}}"));
        }
    }

    /// Top-level statements of `block`, building each lifted module after the last
    /// statement that samples its parameters.
    fn body_with_lifts(&mut self, block: &ProgramBlock, skip: &HashSet<usize>) -> StmtResult {
        let lifts = usage::lifted(block);
        for (idx, stmt) in block.body.iter().enumerate() {
            if !skip.contains(&idx) {
                stmt.accept(self)?;
            }
            for (net, _) in lifts.iter().filter(|(_, last)| *last == idx) {
                let dict = self.lift_dict(net);
                self.emit(&format!(
                    "lifted_{net} = pyro.random_module({}, {}, {dict})()",
                    quote(net),
                    py_name(net)
                ));
            }
        }
        Ok(())
    }

    fn net_ref(&self, name: &str) -> String {
        if self.lifted.contains(name) {
            format!("lifted_{name}")
        } else {
            py_name(name)
        }
    }

    /// Python shape of a declaration: `()`, `N`, or `(M, N)`.
    fn shape_tuple(&mut self, decl: &VariableDecl) -> Result<String, GenError> {
        let dims = self.shape_list(decl)?;
        Ok(match decl.shape_exprs().len() {
            0 => "()".to_string(),
            1 => dims,
            _ => format!("({dims})"),
        })
    }

    fn shape_list(&mut self, decl: &VariableDecl) -> Result<String, GenError> {
        let dims = decl
            .shape_exprs()
            .into_iter()
            .map(|e| self.expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dims.join(", "))
    }

    fn bound(&mut self, ty: &Type, sort: ConstraintSort) -> Result<Option<String>, GenError> {
        match ty.constraints.iter().find(|c| c.sort == sort) {
            Some(c) => Ok(Some(c.accept(self)?.text)),
            None => Ok(None),
        }
    }

    fn param_constraint(&mut self, ty: &Type) -> Result<Option<String>, GenError> {
        let positive = ty
            .lower()
            .and_then(Expr::as_constant)
            .is_some_and(|c| c.as_f64() == 0.0);
        let lower = self.bound(ty, ConstraintSort::Lower)?;
        let upper = self.bound(ty, ConstraintSort::Upper)?;
        Ok(match (lower, upper) {
            (Some(lo), Some(hi)) => Some(format!("constraints.interval({lo}, {hi})")),
            (Some(_), None) if positive => Some("constraints.positive".to_string()),
            (Some(lo), None) => Some(format!("constraints.greater_than({lo})")),
            (None, Some(hi)) => Some(format!("constraints.less_than({hi})")),
            (None, None) => None,
        })
    }

    /// `w = pyro.param('w', init)` for each guide parameter. Returns the guide statements
    /// consumed as initializers.
    fn guide_params(&mut self, guide: &ProgramBlock) -> Result<HashSet<usize>, GenError> {
        let mut consumed = HashSet::new();
        let program = self.program;
        let Some(params) = program.block(BlockKind::GuideParameters) else {
            return Ok(consumed);
        };
        for decl in params.decls() {
            let init = match (&decl.init, initial_assignment(guide, decl.name())) {
                (Some(init), _) => self.expr(init)?,
                (None, Some((idx, value))) => {
                    consumed.insert(idx);
                    self.expr(value)?
                }
                (None, None) => {
                    let sampler = if decl.ty.constraints.is_empty() {
                        "randn"
                    } else {
                        "rand"
                    };
                    format!("{sampler}({})", self.shape_tuple(decl)?)
                }
            };
            let mut args = vec![quote(decl.name()), init];
            if let Some(constraint) = self.param_constraint(&decl.ty)? {
                args.push(format!("constraint={constraint}"));
            }
            let name = py_name(decl.name());
            self.emit(&format!("{name} = pyro.param({})", args.join(", ")));
        }
        Ok(consumed)
    }

    /// Prior assumed by the model for a parameter that no prior block samples.
    fn implicit_prior(&mut self, decl: &VariableDecl) -> StmtResult {
        let shaped = !decl.shape_exprs().is_empty();
        let lower = self.bound(&decl.ty, ConstraintSort::Lower)?;
        let upper = self.bound(&decl.ty, ConstraintSort::Upper)?;
        let shape = if shaped {
            Some(format!("shape={}", self.shape_tuple(decl)?))
        } else {
            None
        };
        let improper = |ctor: &str, bound: Option<String>| {
            let args: Vec<String> = bound.into_iter().chain(shape.clone()).collect();
            format!("{ctor}({})", args.join(", "))
        };
        let prior = match (lower, upper) {
            (Some(lo), Some(hi)) => {
                let mut d = format!("dist.Uniform({lo}, {hi})");
                if shaped {
                    d.push_str(&format!(".expand([{}])", self.shape_list(decl)?));
                }
                d
            }
            (Some(lo), None) => improper("LowerConstrainedImproperUniform", Some(lo)),
            (None, Some(hi)) => improper("UpperConstrainedImproperUniform", Some(hi)),
            (None, None) => improper("ImproperUniform", None),
        };
        let name = py_name(decl.name());
        self.emit(&format!("{name} = pyro.sample({}, {prior})", quote(decl.name())));
        Ok(())
    }

    fn dist_args(&mut self, dist: &Distribution, args: &[Expr]) -> Result<String, GenError> {
        let mut rendered = self.args(args)?;
        if let (Some(keyword), Some(last)) = (dist.last_keyword, rendered.last_mut()) {
            *last = format!("{keyword}={last}");
        }
        Ok(rendered.join(", "))
    }

    fn distribution(&mut self, sampling: &SamplingStmt, span: Span) -> Result<String, GenError> {
        let name = sampling
            .dist_name()
            .ok_or_else(|| GenError::new("sampling statement has no distribution", span))?;
        let dist = builtins::distribution(name)
            .ok_or_else(|| GenError::new(format!("unknown distribution '{name}'"), span))?;
        let args = self.dist_args(dist, &sampling.args)?;
        let mut text = format!("dist.{}({args})", dist.pyro);
        if let Some(dims) = sampling.shape.as_ref().and_then(render_dims) {
            text.push_str(&format!(".expand([{dims}])"));
        }
        Ok(text)
    }

    /// Sample site name, suffixed with the site number and the enclosing loop indices.
    fn site(&self, base: &str, number: Option<u32>) -> String {
        let mut parts = vec![quote(base)];
        if let Some(k) = number {
            parts.push(quote(&format!("__{k}")));
        }
        for var in &self.loop_vars {
            parts.push(format!("'__{{}}'.format({var})"));
        }
        parts.join(" + ")
    }

    fn observe(&mut self, sampling: &SamplingStmt, span: Span) -> StmtResult {
        let dist = self.distribution(sampling, span)?;
        let obs = self.expr(&sampling.target)?;
        let base = match sampling.target.root_id() {
            Some(id) => id,
            None => self.names.fresh_anon(),
        };
        let number = self.names.fresh_site();
        let site = self.site(&base, Some(number));
        self.emit(&format!("pyro.sample({site}, {dist}, obs={obs})"));
        Ok(())
    }

    /// `<block>_mlp['l1.weight'] = dist...` feeding `pyro.random_module`.
    fn lift_entry(&mut self, net: &NetVariable, sampling: &SamplingStmt, span: Span) -> StmtResult {
        let dist = self.distribution(sampling, span)?;
        let dict = self.lift_dict(&net.name);
        self.emit(&format!("{dict}[{}] = {dist}", quote(&net.member())));
        Ok(())
    }

    fn is_matmul(&self, left: &Expr, right: &Expr) -> bool {
        match (infer_shape(left), infer_shape(right)) {
            (Some(l), Some(r)) => is_matmul(BinOp::Mult, &l, &r),
            _ => false,
        }
    }

    fn declarations_dict(decls: impl Iterator<Item = String>) -> String {
        let entries: Vec<String> = decls.map(|n| format!("{}: {}", quote(&n), py_name(&n))).collect();
        format!("return {{{}}}", entries.join(", "))
    }
}

fn initial_assignment<'p>(guide: &'p ProgramBlock, name: &str) -> Option<(usize, &'p Expr)> {
    guide.body.iter().enumerate().find_map(|(idx, stmt)| match &stmt.kind {
        StmtKind::Assign(AssignStmt {
            target:
                Expr {
                    kind: ExprKind::Variable(v),
                    ..
                },
            value,
        }) if v.id == name => Some((idx, value)),
        _ => None,
    })
}

fn render_dims(shape: &Shape) -> Option<String> {
    let dims = shape
        .dims()
        .iter()
        .map(|d| match d {
            Dim::Known(n) => Some(n.to_string()),
            Dim::Symbol(s) => Some(py_name(s)),
            Dim::Unknown => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(dims.join(", "))
}

fn lifted_names(block: &ProgramBlock) -> Vec<String> {
    usage::lifted(block).into_iter().map(|(net, _)| net).collect()
}

impl Visitor for Emitter<'_> {
    type Expr = ExprResult;
    type Stmt = StmtResult;
    type Block = StmtResult;

    fn visit_program(&mut self, program: &Program) -> StmtResult {
        self.out.push_str(HEADER);
        for block in program.blocks() {
            block.accept(self)?;
        }
        if !program.has(BlockKind::Model) && program.has(BlockKind::Prior) {
            self.current = BlockKind::Model;
            let sig = self.signature(&[]);
            let call = self.call_args();
            self.function("model", &sig, |this| {
                this.emit(&format!("prior_({call})"));
                Ok(())
            })?;
        }
        Ok(())
    }

    fn visit_networks(&mut self, _block: &ProgramBlock) -> StmtResult {
        Ok(())
    }

    fn visit_data(&mut self, _block: &ProgramBlock) -> StmtResult {
        Ok(())
    }

    fn visit_transformed_data(&mut self, block: &ProgramBlock) -> StmtResult {
        self.current = BlockKind::TransformedData;
        let params: Vec<String> = self
            .data_names()
            .into_iter()
            .map(|n| format!("{n}=None"))
            .collect();
        self.function("transformed_data", &params.join(", "), |this| {
            for stmt in &block.body {
                stmt.accept(this)?;
            }
            let ret = Self::declarations_dict(block.decls().map(|d| d.name().to_string()));
            this.emit(&ret);
            Ok(())
        })
    }

    fn visit_parameters(&mut self, _block: &ProgramBlock) -> StmtResult {
        Ok(())
    }

    /// Inlined into the model and generated quantities.
    fn visit_transformed_parameters(&mut self, _block: &ProgramBlock) -> StmtResult {
        Ok(())
    }

    /// Registered inside the guide.
    fn visit_guide_parameters(&mut self, _block: &ProgramBlock) -> StmtResult {
        Ok(())
    }

    fn visit_guide(&mut self, block: &ProgramBlock) -> StmtResult {
        self.current = BlockKind::Guide;
        let lifts = lifted_names(block);
        let sig = self.signature(&[]);
        let kinds = [BlockKind::Parameters, BlockKind::GuideParameters, BlockKind::Guide];
        self.function("guide_", &sig, |this| {
            this.register_networks(&kinds, &lifts);
            this.unpack_transformed_data(&kinds);
            this.lifted.extend(lifts.iter().cloned());
            this.open_lift_dicts(&lifts);
            let consumed = this.guide_params(block)?;
            this.body_with_lifts(block, &consumed)
        })
    }

    fn visit_prior(&mut self, block: &ProgramBlock) -> StmtResult {
        self.current = BlockKind::Prior;
        let lifts = lifted_names(block);
        let sig = self.signature(&[]);
        let kinds = [BlockKind::Parameters, BlockKind::Prior];
        let program = self.program;
        self.function("prior_", &sig, |this| {
            this.register_networks(&kinds, &lifts);
            this.unpack_transformed_data(&kinds);
            this.lifted.extend(lifts.iter().cloned());
            this.open_lift_dicts(&lifts);
            this.body_with_lifts(block, &HashSet::new())?;

            let mut entries: Vec<String> = program
                .decls(BlockKind::Parameters)
                .filter(|d| !d.is_net_param() && block.is_sampled(d.name()))
                .map(|d| format!("{}: {}", quote(d.name()), py_name(d.name())))
                .collect();
            entries.extend(lifts.iter().map(|n| format!("{}: lifted_{n}", quote(n))));
            this.emit(&format!("return {{{}}}", entries.join(", ")));
            Ok(())
        })
    }

    fn visit_model(&mut self, block: &ProgramBlock) -> StmtResult {
        self.current = BlockKind::Model;
        let program = self.program;
        let prior = program.block(BlockKind::Prior);
        let from_prior = prior.map(lifted_names).unwrap_or_default();
        let lifts = lifted_names(block);
        let excluded: Vec<String> = from_prior.iter().chain(lifts.iter()).cloned().collect();
        let sig = self.signature(&[]);
        let call = self.call_args();
        let kinds = [
            BlockKind::Parameters,
            BlockKind::TransformedParameters,
            BlockKind::Model,
        ];
        self.function("model", &sig, |this| {
            this.register_networks(&kinds, &excluded);
            this.unpack_transformed_data(&kinds);
            this.lifted.extend(excluded.iter().cloned());

            if let Some(prior) = prior {
                this.emit(&format!("prior_values = prior_({call})"));
                for decl in program.decls(BlockKind::Parameters) {
                    if !decl.is_net_param() && prior.is_sampled(decl.name()) {
                        let name = py_name(decl.name());
                        this.emit(&format!("{name} = prior_values[{}]", quote(decl.name())));
                    }
                }
                for net in &from_prior {
                    this.emit(&format!("lifted_{net} = prior_values[{}]", quote(net)));
                }
            }
            for decl in program.decls(BlockKind::Parameters) {
                let covered = prior.is_some_and(|p| p.is_sampled(decl.name()));
                if !decl.is_net_param() && !covered {
                    this.implicit_prior(decl)?;
                }
            }
            this.open_lift_dicts(&lifts);
            if let Some(tp) = program.block(BlockKind::TransformedParameters) {
                for stmt in &tp.body {
                    stmt.accept(this)?;
                }
            }
            this.body_with_lifts(block, &HashSet::new())
        })
    }

    fn visit_generated_quantities(&mut self, block: &ProgramBlock) -> StmtResult {
        self.current = BlockKind::GeneratedQuantities;
        let program = self.program;
        let params: Vec<String> = program
            .decls(BlockKind::Parameters)
            .filter(|d| !d.is_net_param())
            .map(|d| py_name(d.name()))
            .collect();
        let sig = self.signature(&params);
        let kinds = [BlockKind::TransformedParameters, BlockKind::GeneratedQuantities];
        self.function("generated_quantities", &sig, |this| {
            this.unpack_transformed_data(&kinds);
            if let Some(tp) = program.block(BlockKind::TransformedParameters) {
                for stmt in &tp.body {
                    stmt.accept(this)?;
                }
            }
            for stmt in &block.body {
                stmt.accept(this)?;
            }
            let ret = Self::declarations_dict(block.decls().map(|d| d.name().to_string()));
            this.emit(&ret);
            Ok(())
        })
    }

    fn visit_variable_decl(&mut self, decl: &VariableDecl, _span: Span) -> StmtResult {
        let name = py_name(decl.name());
        let annotation = if self.options.verbose {
            Some(decl.ty.accept(self)?.text)
        } else {
            None
        };
        let value = match &decl.init {
            Some(init) => Some(self.expr(init)?),
            None if decl.shape_exprs().is_empty() => None,
            None => {
                let shape = self.shape_tuple(decl)?;
                Some(if decl.ty.is_int() {
                    format!("zeros({shape}, dtype=torch.long)")
                } else {
                    format!("zeros({shape})")
                })
            }
        };
        match (annotation, value) {
            (Some(ann), Some(value)) => self.emit(&format!("{name}: {ann} = {value}")),
            (None, Some(value)) => self.emit(&format!("{name} = {value}")),
            (Some(ann), None) => self.emit(&format!("{name}: {ann}")),
            (None, None) => {}
        }
        Ok(())
    }

    fn visit_net_decl(&mut self, _decl: &NetDeclaration, _span: Span) -> StmtResult {
        Ok(())
    }

    fn visit_assign(&mut self, assign: &AssignStmt, _span: Span) -> StmtResult {
        let target = self.expr(&assign.target)?;
        let value = self.expr(&assign.value)?;
        self.emit(&format!("{target} = {value}"));
        Ok(())
    }

    fn visit_sampling_declaration(&mut self, sampling: &SamplingStmt, span: Span) -> StmtResult {
        if let ExprKind::NetVariable(net) = &sampling.target.kind {
            return self.lift_entry(net, sampling, span);
        }
        let root = sampling
            .target
            .root_id()
            .ok_or_else(|| GenError::new("sampled declaration has no target variable", span))?;
        let dist = self.distribution(sampling, span)?;
        let target = self.expr(&sampling.target)?;
        let site = self.site(&root, None);
        self.emit(&format!("{target} = pyro.sample({site}, {dist})"));
        Ok(())
    }

    fn visit_sampling_observed(&mut self, sampling: &SamplingStmt, span: Span) -> StmtResult {
        self.observe(sampling, span)
    }

    fn visit_sampling_parameters(&mut self, sampling: &SamplingStmt, span: Span) -> StmtResult {
        if let ExprKind::NetVariable(net) = &sampling.target.kind {
            return self.lift_entry(net, sampling, span);
        }
        self.observe(sampling, span)
    }

    fn visit_sampling_factor(&mut self, sampling: &SamplingStmt, _span: Span) -> StmtResult {
        let value = self.expr(&sampling.target)?;
        let base = self.names.fresh_anon();
        let site = self.site(&base, None);
        self.emit(&format!(
            "pyro.sample({site}, dist.Exponential(1), obs=-({value}))"
        ));
        Ok(())
    }

    fn visit_for(&mut self, stmt: &ForStmt, _span: Span) -> StmtResult {
        let from = self.expr(&stmt.from)?;
        let to = self.operand(&stmt.to, Prec::Add)?;
        let var = py_name(&stmt.var.node);
        self.emit(&format!("for {var} in range({from}, {to} + 1):"));
        self.loop_vars.push(var);
        let result = self.nested(&stmt.body);
        self.loop_vars.pop();
        result
    }

    fn visit_conditional(&mut self, stmt: &ConditionalStmt, _span: Span) -> StmtResult {
        let test = self.expr(&stmt.test)?;
        self.emit(&format!("if {test}:"));
        self.nested(&stmt.then_branch)?;
        if let Some(else_branch) = &stmt.else_branch {
            self.line("else:");
            self.nested(else_branch)?;
        }
        Ok(())
    }

    /// Shape queries in the test are rebound on every iteration.
    fn visit_while(&mut self, stmt: &WhileStmt, _span: Span) -> StmtResult {
        let pending = self.hoisted.len();
        let test = self.expr(&stmt.test)?;
        if self.hoisted.len() == pending {
            self.emit(&format!("while {test}:"));
            return self.nested(&stmt.body);
        }
        let bindings = self.hoisted.split_off(pending);
        self.emit("while True:");
        self.indent += 1;
        self.hoisted = bindings;
        self.emit(&format!("if not ({test}):"));
        self.indent += 1;
        self.line("break");
        self.indent -= 1;
        let body = match &stmt.body.kind {
            StmtKind::Block(block) => self.visit_block_stmt(block, stmt.body.span),
            _ => stmt.body.accept(self),
        };
        self.indent -= 1;
        body
    }

    fn visit_block_stmt(&mut self, stmt: &BlockStmt, _span: Span) -> StmtResult {
        for s in &stmt.body {
            s.accept(self)?;
        }
        Ok(())
    }

    fn visit_call_stmt(&mut self, stmt: &CallStmt, span: Span) -> StmtResult {
        let call = self.visit_call(&stmt.callee, &stmt.args, span)?.text;
        self.emit(&call);
        Ok(())
    }

    fn visit_break(&mut self, _span: Span) -> StmtResult {
        self.emit("break");
        Ok(())
    }

    fn visit_continue(&mut self, _span: Span) -> StmtResult {
        self.emit("continue");
        Ok(())
    }

    fn visit_constant(&mut self, value: Constant, _span: Span) -> ExprResult {
        Ok(Py::primary(value.to_string()))
    }

    fn visit_tuple(&mut self, items: &[Expr], _span: Span) -> ExprResult {
        Ok(Py::primary(format!("({})", self.args(items)?.join(", "))))
    }

    fn visit_str(&mut self, value: &str, _span: Span) -> ExprResult {
        Ok(Py::primary(quote(value)))
    }

    fn visit_list(&mut self, items: &[Expr], _span: Span) -> ExprResult {
        Ok(Py::new(
            format!("tensor([{}])", self.args(items)?.join(", ")),
            Prec::Postfix,
        ))
    }

    fn visit_binary(&mut self, left: &Expr, op: BinOp, right: &Expr, _span: Span) -> ExprResult {
        let int_operands =
            infer_kind(left) == NumKind::Int && infer_kind(right) == NumKind::Int;
        if op == BinOp::Div && int_operands {
            // Truncates toward zero; Python's `//` floors.
            let l = self.operand(left, Prec::Mul)?;
            let r = self.operand(right, Prec::Unary)?;
            return Ok(Py::new(format!("int({l} / {r})"), Prec::Postfix));
        }
        let (symbol, prec, left_min, right_min) = match op {
            BinOp::Or => ("or", Prec::Or, Prec::Or, Prec::And),
            BinOp::And => ("and", Prec::And, Prec::And, Prec::Not),
            BinOp::LE | BinOp::GE | BinOp::LT | BinOp::GT | BinOp::EQ | BinOp::NE => {
                (op.symbol(), Prec::Cmp, Prec::Add, Prec::Add)
            }
            BinOp::Plus => ("+", Prec::Add, Prec::Add, Prec::Mul),
            BinOp::Minus => ("-", Prec::Add, Prec::Add, Prec::Mul),
            BinOp::Mult if self.is_matmul(left, right) => ("@", Prec::Mul, Prec::Mul, Prec::Unary),
            BinOp::Mult | BinOp::DotMult => ("*", Prec::Mul, Prec::Mul, Prec::Unary),
            BinOp::Div | BinOp::DotDiv => ("/", Prec::Mul, Prec::Mul, Prec::Unary),
            BinOp::Mod => ("%", Prec::Mul, Prec::Mul, Prec::Unary),
            BinOp::Pow => ("**", Prec::Pow, Prec::Postfix, Prec::Unary),
        };
        let l = self.operand(left, left_min)?;
        let r = self.operand(right, right_min)?;
        Ok(Py::new(format!("{l} {symbol} {r}"), prec))
    }

    fn visit_unary(&mut self, op: UnaryOp, operand: &Expr, _span: Span) -> ExprResult {
        Ok(match op {
            UnaryOp::UMinus => Py::new(format!("-{}", self.operand(operand, Prec::Unary)?), Prec::Unary),
            UnaryOp::UPlus => Py::new(format!("+{}", self.operand(operand, Prec::Unary)?), Prec::Unary),
            UnaryOp::UNot => Py::new(format!("not {}", self.operand(operand, Prec::Not)?), Prec::Not),
        })
    }

    /// Indices are 1-based in the source.
    fn visit_subscript(&mut self, base: &Expr, index: &Expr, _span: Span) -> ExprResult {
        let base = self.operand(base, Prec::Postfix)?;
        let indices = Expr::indices(index)
            .into_iter()
            .map(|i| Ok(format!("{} - 1", self.operand(i, Prec::Add)?)))
            .collect::<Result<Vec<_>, GenError>>()?;
        Ok(Py::new(format!("{base}[{}]", indices.join(", ")), Prec::Postfix))
    }

    fn visit_call(&mut self, callee: &Ident, args: &[Expr], _span: Span) -> ExprResult {
        if let Some(dist) = builtins::rng_distribution(&callee.node) {
            let args = self.dist_args(dist, args)?;
            return Ok(Py::new(
                format!("dist.{}({args}).sample()", dist.pyro),
                Prec::Postfix,
            ));
        }
        let name = self.net_ref(&callee.node);
        let args = self.args(args)?.join(", ");
        Ok(Py::new(format!("{name}({args})"), Prec::Postfix))
    }

    fn visit_variable(&mut self, var: &Variable, _span: Span) -> ExprResult {
        let text = match var.block {
            Some(BlockKind::Networks) => self.net_ref(&var.id),
            _ => py_name(&var.id),
        };
        Ok(Py::primary(text))
    }

    fn visit_property(&mut self, base: &Expr, prop: &Ident, _span: Span) -> ExprResult {
        let base = self.operand(base, Prec::Postfix)?;
        Ok(Py::new(format!("{base}.{}", prop.node), Prec::Postfix))
    }

    fn visit_net_property(&mut self, net: &NetVariable, prop: &Ident, span: Span) -> ExprResult {
        let net = self.visit_net_variable(net, span)?.text;
        Ok(Py::new(format!("{net}.{}", prop.node), Prec::Postfix))
    }

    fn visit_anonymous_shape(&mut self, value: &Expr, _span: Span) -> ExprResult {
        let value = self.expr(value)?;
        let name = self.names.fresh_anon();
        self.hoisted.push(format!("{name} = {value}"));
        Ok(Py::new(format!("{name}.shape"), Prec::Postfix))
    }

    fn visit_net_variable(&mut self, net: &NetVariable, _span: Span) -> ExprResult {
        let mut text = self.net_ref(&net.name);
        for member in &net.path {
            text.push('.');
            text.push_str(member);
        }
        Ok(Py::new(text, Prec::Postfix))
    }

    fn visit_type(&mut self, ty: &Type) -> ExprResult {
        let annotation = match ty.prim {
            _ if ty.is_array => "torch.Tensor",
            Primitive::Int => "int",
            Primitive::Real => "float",
            Primitive::Vector | Primitive::Matrix => "torch.Tensor",
        };
        Ok(Py::primary(annotation))
    }

    fn visit_constraint(&mut self, constraint: &Constraint) -> ExprResult {
        constraint.value.accept(self)
    }
}
