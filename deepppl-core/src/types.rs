#![forbid(unsafe_code)]

use deepppl_ast::{BinOp, Constant, Dim, Expr, ExprKind, Primitive, Shape, UnaryOp};

use crate::builtins;

/// Numeric kind of an expression after resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumKind {
    Int,
    Real,
    Unknown,
}

impl NumKind {
    pub fn of_prim(prim: Primitive) -> Self {
        match prim {
            Primitive::Int => NumKind::Int,
            Primitive::Real | Primitive::Vector | Primitive::Matrix => NumKind::Real,
        }
    }

    fn join(self, other: NumKind) -> NumKind {
        match (self, other) {
            (NumKind::Int, NumKind::Int) => NumKind::Int,
            (NumKind::Unknown, _) | (_, NumKind::Unknown) => NumKind::Unknown,
            _ => NumKind::Real,
        }
    }
}

/// Kind of a resolved expression. Unbound variables and shape queries are `Unknown`.
pub fn infer_kind(expr: &Expr) -> NumKind {
    match &expr.kind {
        ExprKind::Constant(Constant::Int(_)) => NumKind::Int,
        ExprKind::Constant(Constant::Real(_)) => NumKind::Real,
        ExprKind::Str(_)
        | ExprKind::Property { .. }
        | ExprKind::NetProperty { .. }
        | ExprKind::AnonymousShape { .. } => NumKind::Unknown,
        ExprKind::Tuple(items) | ExprKind::List(items) => items
            .iter()
            .map(infer_kind)
            .reduce(NumKind::join)
            .unwrap_or(NumKind::Unknown),
        ExprKind::Binary { left, op, right } => {
            if op.is_comparison() || op.is_logical() {
                NumKind::Int
            } else if *op == BinOp::Pow {
                NumKind::Real
            } else {
                infer_kind(left).join(infer_kind(right))
            }
        }
        ExprKind::Unary {
            op: UnaryOp::UNot, ..
        } => NumKind::Int,
        ExprKind::Unary { operand, .. } => infer_kind(operand),
        ExprKind::Subscript { base, .. } => infer_kind(base),
        ExprKind::Call { callee, .. } => {
            if builtins::returns_int(&callee.node) {
                NumKind::Int
            } else if builtins::is_builtin_function(&callee.node) {
                NumKind::Real
            } else {
                NumKind::Unknown
            }
        }
        ExprKind::Variable(v) => v
            .ty
            .as_ref()
            .map_or(NumKind::Unknown, |t| NumKind::of_prim(t.prim)),
        ExprKind::NetVariable(_) => NumKind::Real,
    }
}

/// Static shape of a resolved expression, `None` when it cannot be determined.
pub fn infer_shape(expr: &Expr) -> Option<Shape> {
    match &expr.kind {
        ExprKind::Constant(_) => Some(Shape::scalar()),
        ExprKind::Variable(v) => v.ty.as_ref().map(|t| t.shape.clone()),
        ExprKind::Subscript { base, index } => {
            let base = infer_shape(base)?;
            let n = Expr::indices(index).len();
            if n > base.rank() {
                return None;
            }
            Some(base.drop_leading(n))
        }
        ExprKind::Unary { operand, .. } => infer_shape(operand),
        ExprKind::Binary { left, op, right } => {
            let l = infer_shape(left)?;
            let r = infer_shape(right)?;
            binary_shape(*op, &l, &r).ok()
        }
        ExprKind::List(items) => {
            let first = items.first().map_or(Some(Shape::scalar()), infer_shape)?;
            let len = i64::try_from(items.len()).ok()?;
            let mut dims = vec![Dim::Known(len)];
            dims.extend(first.0);
            Some(Shape(dims))
        }
        _ => None,
    }
}

/// Shapes that cannot be combined by a binary operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub left: Shape,
    pub right: Shape,
}

/// `*` between a matrix and a vector or matrix is a matrix product.
pub fn is_matmul(op: BinOp, left: &Shape, right: &Shape) -> bool {
    op == BinOp::Mult && left.rank() == 2 && (1..=2).contains(&right.rank())
}

pub fn binary_shape(op: BinOp, left: &Shape, right: &Shape) -> Result<Shape, ShapeMismatch> {
    if is_matmul(op, left, right) {
        let (l, r) = (left.dims(), right.dims());
        if !l[1].compatible(&r[0]) {
            return Err(ShapeMismatch {
                left: left.clone(),
                right: right.clone(),
            });
        }
        let mut dims = vec![l[0].clone()];
        if right.rank() == 2 {
            dims.push(r[1].clone());
        }
        return Ok(Shape(dims));
    }
    broadcast(left, right)
}

/// Elementwise combination: a scalar combines with anything, otherwise both sides need
/// the same rank and pairwise compatible dims. A known size of 1 stretches to any other.
pub fn broadcast(left: &Shape, right: &Shape) -> Result<Shape, ShapeMismatch> {
    if left.is_scalar() {
        return Ok(right.clone());
    }
    if right.is_scalar() {
        return Ok(left.clone());
    }
    let fail = || ShapeMismatch {
        left: left.clone(),
        right: right.clone(),
    };
    if left.rank() != right.rank() {
        return Err(fail());
    }
    let mut dims = Vec::with_capacity(left.rank());
    for (l, r) in left.dims().iter().zip(right.dims()) {
        let dim = match (l, r) {
            (Dim::Known(1), d) | (d, Dim::Known(1)) => d.clone(),
            (a, b) if a.compatible(b) => merge(a, b),
            _ => return Err(fail()),
        };
        dims.push(dim);
    }
    Ok(Shape(dims))
}

fn merge(a: &Dim, b: &Dim) -> Dim {
    match (a, b) {
        (Dim::Known(_), _) => a.clone(),
        (_, Dim::Known(_)) => b.clone(),
        (Dim::Symbol(_), _) => a.clone(),
        _ => b.clone(),
    }
}

/// Shape of a declaration: array dims, then vector/matrix sizes.
pub fn decl_shape(exprs: &[&Expr]) -> Shape {
    Shape(exprs.iter().map(|e| dim_of(e)).collect())
}

fn dim_of(expr: &Expr) -> Dim {
    match &expr.kind {
        ExprKind::Constant(Constant::Int(n)) => Dim::Known(*n),
        ExprKind::Variable(v) => Dim::Symbol(v.id.clone()),
        _ => Dim::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[Dim]) -> Shape {
        Shape(dims.to_vec())
    }

    #[test]
    fn broadcast_scalar_against_vector() {
        let v = shape(&[Dim::Symbol("N".into())]);
        assert_eq!(broadcast(&Shape::scalar(), &v).unwrap(), v);
    }

    #[test]
    fn broadcast_rejects_known_mismatch() {
        let a = shape(&[Dim::Known(3)]);
        let b = shape(&[Dim::Known(4)]);
        assert!(broadcast(&a, &b).is_err());
    }

    #[test]
    fn broadcast_prefers_known_dims() {
        let a = shape(&[Dim::Symbol("N".into())]);
        let b = shape(&[Dim::Known(4)]);
        assert_eq!(broadcast(&a, &b).unwrap(), b);
    }

    #[test]
    fn broadcast_rejects_rank_mismatch() {
        let a = shape(&[Dim::Known(2), Dim::Known(3)]);
        let b = shape(&[Dim::Known(3)]);
        assert!(broadcast(&a, &b).is_err());
        assert!(broadcast(&b, &a).is_err());
    }

    #[test]
    fn broadcast_stretches_unit_dims() {
        let a = shape(&[Dim::Known(1), Dim::Known(3)]);
        let b = shape(&[Dim::Known(2), Dim::Known(3)]);
        assert_eq!(broadcast(&a, &b).unwrap(), b);
    }

    #[test]
    fn matmul_checks_inner_dims() {
        let m = shape(&[Dim::Known(2), Dim::Known(3)]);
        let v3 = shape(&[Dim::Known(3)]);
        let v4 = shape(&[Dim::Known(4)]);
        assert_eq!(binary_shape(BinOp::Mult, &m, &v3).unwrap(), shape(&[Dim::Known(2)]));
        assert!(binary_shape(BinOp::Mult, &m, &v4).is_err());
        // Elementwise product needs equal ranks.
        assert!(binary_shape(BinOp::DotMult, &m, &v3).is_err());
    }
}
