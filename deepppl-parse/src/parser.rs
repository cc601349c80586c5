#![forbid(unsafe_code)]

use std::mem;

use deepppl_ast::{
    join, span_between, AssignStmt, BinOp, BlockKind, BlockStmt, CallStmt, ConditionalStmt,
    Constant, Constraint, ConstraintSort, Expr, ExprKind, ForStmt, Ident, NetDeclaration,
    NetVariable, ProgramBlock, SamplingStmt, Span, Stmt, StmtKind, Type, UnaryOp, Variable,
    VariableDecl, WhileStmt,
};
use deepppl_lex::{Token, TokenKind};

use crate::error::ParseError;

/// Identifiers that open a declaration inside statement blocks.
const TYPE_NAMES: [&str; 4] = ["int", "real", "vector", "matrix"];

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, idx: 0 }
    }

    pub fn parse_blocks(&mut self) -> Result<Vec<ProgramBlock>, ParseError> {
        let mut blocks = Vec::new();
        while !self.at(TokenKind::Eof) {
            blocks.push(self.parse_block()?);
        }
        Ok(blocks)
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        if !self.at(TokenKind::Eof) {
            return Err(self.error_here("expected end of input"));
        }
        Ok(expr)
    }

    fn parse_block(&mut self) -> Result<ProgramBlock, ParseError> {
        let head = self.expect_ident()?;
        let kind = self.parse_block_kind(&head)?;
        self.expect(TokenKind::LBrace)?;

        let mut body = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(ParseError {
                    message: format!("unterminated '{kind}' block"),
                    span: head.span,
                });
            }
            let stmt = match kind {
                BlockKind::Networks => self.parse_net_decl()?,
                BlockKind::Data | BlockKind::Parameters | BlockKind::GuideParameters => {
                    self.parse_decl()?
                }
                _ => self.parse_stmt()?,
            };
            body.push(stmt);
        }
        let close = self.expect(TokenKind::RBrace)?;

        Ok(ProgramBlock::new(kind, join(head.span, close.span), body))
    }

    fn parse_block_kind(&mut self, head: &Ident) -> Result<BlockKind, ParseError> {
        let kind = match head.node.as_str() {
            "networks" => BlockKind::Networks,
            "data" => BlockKind::Data,
            "parameters" => BlockKind::Parameters,
            "prior" => BlockKind::Prior,
            "model" => BlockKind::Model,
            "guide" => {
                if self.at_ident("parameters") {
                    self.bump()?;
                    BlockKind::GuideParameters
                } else {
                    BlockKind::Guide
                }
            }
            "transformed" => {
                let next = self.expect_ident()?;
                match next.node.as_str() {
                    "data" => BlockKind::TransformedData,
                    "parameters" => BlockKind::TransformedParameters,
                    other => {
                        return Err(ParseError {
                            message: format!("unknown block 'transformed {other}'"),
                            span: join(head.span, next.span),
                        });
                    }
                }
            }
            "generated" => {
                let next = self.expect_ident()?;
                if next.node != "quantities" {
                    return Err(ParseError {
                        message: format!("unknown block 'generated {}'", next.node),
                        span: join(head.span, next.span),
                    });
                }
                BlockKind::GeneratedQuantities
            }
            other => {
                return Err(ParseError {
                    message: format!("unknown block '{other}'"),
                    span: head.span,
                });
            }
        };
        Ok(kind)
    }

    fn parse_net_decl(&mut self) -> Result<Stmt, ParseError> {
        let net_cls = self.expect_ident()?;
        let name = self.expect_ident()?;
        let params = if self.at(TokenKind::LParen) {
            self.bump()?;
            let args = self.parse_args(TokenKind::RParen)?;
            self.expect(TokenKind::RParen)?;
            args
        } else {
            Vec::new()
        };
        let semi = self.expect(TokenKind::Semi)?;
        Ok(Stmt::new(
            join(net_cls.span, semi.span),
            StmtKind::NetDecl(NetDeclaration {
                name,
                net_cls,
                params,
            }),
        ))
    }

    /// `type[<constraints>][[size]] name[[dims]] [= init];`
    fn parse_decl(&mut self) -> Result<Stmt, ParseError> {
        let ty_name = self.expect_ident()?;
        let constraints = if self.at(TokenKind::Lt) {
            self.parse_constraints()?
        } else {
            Vec::new()
        };
        let size = if self.at(TokenKind::LBracket) {
            self.parse_index_list()?.0
        } else {
            Vec::new()
        };
        let id = self.parse_decl_name()?;
        let dims = if self.at(TokenKind::LBracket) {
            let (items, span) = self.parse_index_list()?;
            Some(collapse(items, span))
        } else {
            None
        };
        let init = if self.at(TokenKind::Eq) {
            self.bump()?;
            Some(self.parse_expr()?)
        } else {
            None
        };
        let semi = self.expect(TokenKind::Semi)?;

        let ty = Type::new(ty_name.span, &ty_name.node, constraints, dims.is_some(), size)?;
        Ok(Stmt::new(
            join(ty_name.span, semi.span),
            StmtKind::Decl(VariableDecl::new(id, dims, init, ty)),
        ))
    }

    fn parse_constraints(&mut self) -> Result<Vec<Constraint>, ParseError> {
        self.expect(TokenKind::Lt)?;
        let mut out = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let sort = ConstraintSort::parse(&name)?;
            self.expect(TokenKind::Eq)?;
            // Additive level so that `>` closes the list.
            let value = self.parse_add_expr()?;
            out.push(Constraint {
                span: join(name.span, value.span),
                sort,
                value,
            });
            if !self.at(TokenKind::Comma) {
                break;
            }
            self.bump()?;
        }
        self.expect(TokenKind::Gt)?;
        Ok(out)
    }

    /// Plain name, or a dotted network parameter path.
    fn parse_decl_name(&mut self) -> Result<Ident, ParseError> {
        let mut id = self.expect_ident()?;
        while self.at(TokenKind::Dot) {
            self.bump()?;
            let part = self.expect_ident()?;
            id.node.push('.');
            id.node.push_str(&part.node);
            id.span = join(id.span, part.span);
        }
        Ok(id)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LBrace) => self.parse_block_stmt(),
            Some(TokenKind::KwFor) => self.parse_for_stmt(),
            Some(TokenKind::KwWhile) => self.parse_while_stmt(),
            Some(TokenKind::KwIf) => self.parse_if_stmt(),
            Some(TokenKind::KwBreak | TokenKind::KwContinue) => {
                let tok = self.bump()?;
                let semi = self.expect(TokenKind::Semi)?;
                let kind = if tok.kind == TokenKind::KwBreak {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                };
                Ok(Stmt::new(join(tok.span, semi.span), kind))
            }
            Some(TokenKind::Ident(name)) if TYPE_NAMES.contains(&name.as_str()) => self.parse_decl(),
            Some(TokenKind::Ident(name))
                if name == "target" && matches!(self.peek_kind_n(1), Some(TokenKind::PlusEq)) =>
            {
                self.parse_factor_stmt()
            }
            _ => self.parse_simple_stmt(),
        }
    }

    fn parse_block_stmt(&mut self) -> Result<Stmt, ParseError> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(ParseError {
                    message: "unterminated block statement".to_string(),
                    span: open.span,
                });
            }
            body.push(self.parse_stmt()?);
        }
        let close = self.expect(TokenKind::RBrace)?;
        Ok(Stmt::new(
            join(open.span, close.span),
            StmtKind::Block(BlockStmt { body }),
        ))
    }

    fn parse_for_stmt(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::KwFor)?;
        self.expect(TokenKind::LParen)?;
        let var = self.expect_ident()?;
        self.expect(TokenKind::KwIn)?;
        let from = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let to = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::new(
            join(kw.span, body.span),
            StmtKind::For(ForStmt {
                var,
                from,
                to,
                body: Box::new(body),
            }),
        ))
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::KwWhile)?;
        self.expect(TokenKind::LParen)?;
        let test = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::new(
            join(kw.span, body.span),
            StmtKind::While(WhileStmt {
                test,
                body: Box::new(body),
            }),
        ))
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::KwIf)?;
        self.expect(TokenKind::LParen)?;
        let test = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = self.parse_stmt()?;
        let mut span = join(kw.span, then_branch.span);
        let else_branch = if self.at(TokenKind::KwElse) {
            self.bump()?;
            let s = self.parse_stmt()?;
            span = join(span, s.span);
            Some(Box::new(s))
        } else {
            None
        };
        Ok(Stmt::new(
            span,
            StmtKind::Conditional(ConditionalStmt {
                test,
                then_branch: Box::new(then_branch),
                else_branch,
            }),
        ))
    }

    /// `target += e;`
    fn parse_factor_stmt(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect_ident()?;
        self.expect(TokenKind::PlusEq)?;
        let value = self.parse_expr()?;
        let semi = self.expect(TokenKind::Semi)?;
        Ok(Stmt::new(
            join(kw.span, semi.span),
            StmtKind::Sampling(SamplingStmt::factor(value)),
        ))
    }

    /// Sampling, assignment or call, decided by the token after the leading expression.
    fn parse_simple_stmt(&mut self) -> Result<Stmt, ParseError> {
        let lhs = self.parse_expr()?;
        match self.peek_kind() {
            Some(TokenKind::Tilde) => {
                self.bump()?;
                let dist = self.expect_ident()?;
                self.expect(TokenKind::LParen)?;
                let args = self.parse_args(TokenKind::RParen)?;
                self.expect(TokenKind::RParen)?;
                let semi = self.expect(TokenKind::Semi)?;
                Ok(Stmt::new(
                    join(lhs.span, semi.span),
                    StmtKind::Sampling(SamplingStmt::new(lhs, dist, args)),
                ))
            }
            Some(TokenKind::Eq) => {
                if !is_assignable(&lhs) {
                    return Err(ParseError {
                        message: "invalid assignment target".to_string(),
                        span: lhs.span,
                    });
                }
                self.bump()?;
                let value = self.parse_expr()?;
                let semi = self.expect(TokenKind::Semi)?;
                Ok(Stmt::new(
                    join(lhs.span, semi.span),
                    StmtKind::Assign(AssignStmt { target: lhs, value }),
                ))
            }
            Some(TokenKind::Semi) => {
                let semi = self.bump()?;
                let span = join(lhs.span, semi.span);
                match lhs.kind {
                    ExprKind::Call { callee, args } => {
                        Ok(Stmt::new(span, StmtKind::Call(CallStmt { callee, args })))
                    }
                    _ => Err(ParseError {
                        message: "expression statement has no effect; expected a call".to_string(),
                        span,
                    }),
                }
            }
            _ => Err(self.error_here("expected '~', '=' or ';' after expression")),
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expr()?;
        while self.at(TokenKind::OrOr) {
            self.bump()?;
            let right = self.parse_and_expr()?;
            left = binary(left, BinOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_cmp_expr()?;
        while self.at(TokenKind::AndAnd) {
            self.bump()?;
            let right = self.parse_cmp_expr()?;
            left = binary(left, BinOp::And, right);
        }
        Ok(left)
    }

    fn parse_cmp_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_add_expr()?;
        let Some(op) = self.peek_kind().and_then(cmp_op) else {
            return Ok(left);
        };
        self.bump()?;
        let right = self.parse_add_expr()?;
        let expr = binary(left, op, right);

        if self.peek_kind().and_then(cmp_op).is_some() {
            return Err(self.error_here(
                "chained comparisons are not supported; use parentheses or boolean operators",
            ));
        }
        Ok(expr)
    }

    fn parse_add_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_mul_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Plus,
                Some(TokenKind::Minus) => BinOp::Minus,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_mul_expr()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mult,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::DotStar) => BinOp::DotMult,
                Some(TokenKind::DotSlash) => BinOp::DotDiv,
                Some(TokenKind::Percent) => BinOp::Mod,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_unary_expr()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOp::UMinus,
            Some(TokenKind::Plus) => UnaryOp::UPlus,
            Some(TokenKind::Bang) => UnaryOp::UNot,
            _ => return self.parse_pow_expr(),
        };
        let tok = self.bump()?;
        let operand = self.parse_unary_expr()?;
        Ok(Expr::new(
            join(tok.span, operand.span),
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        ))
    }

    /// `^` binds tighter than unary minus and associates to the right.
    fn parse_pow_expr(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix_expr()?;
        if !self.at(TokenKind::Caret) {
            return Ok(base);
        }
        self.bump()?;
        let exponent = self.parse_unary_expr()?;
        Ok(binary(base, BinOp::Pow, exponent))
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::LBracket) => {
                    let (items, index_span) = self.parse_index_list()?;
                    let span = join(expr.span, index_span);
                    expr = Expr::new(
                        span,
                        ExprKind::Subscript {
                            base: Box::new(expr),
                            index: Box::new(collapse(items, index_span)),
                        },
                    );
                }
                Some(TokenKind::Dollar) => {
                    self.bump()?;
                    let prop = self.expect_ident()?;
                    let span = join(expr.span, prop.span);
                    let kind = if let ExprKind::NetVariable(net) = &expr.kind {
                        ExprKind::NetProperty {
                            net: net.clone(),
                            prop,
                        }
                    } else if prop.node == "shape"
                        && !matches!(expr.kind, ExprKind::Variable(_) | ExprKind::Subscript { .. })
                    {
                        ExprKind::AnonymousShape {
                            value: Box::new(expr),
                        }
                    } else {
                        ExprKind::Property {
                            base: Box::new(expr),
                            prop,
                        }
                    };
                    expr = Expr::new(span, kind);
                }
                Some(TokenKind::Dot) => {
                    self.bump()?;
                    let member = self.expect_ident()?;
                    let span = join(expr.span, member.span);
                    let net = match &expr.kind {
                        ExprKind::Variable(v) => NetVariable::new(v.id.clone(), vec![member.node]),
                        ExprKind::NetVariable(n) => {
                            let mut n = n.clone();
                            n.path.push(member.node);
                            n
                        }
                        _ => {
                            return Err(ParseError {
                                message: "member access is only allowed on network names".to_string(),
                                span,
                            });
                        }
                    };
                    expr = Expr::new(span, ExprKind::NetVariable(net));
                }
                Some(TokenKind::LParen) => {
                    let ExprKind::Variable(v) = &expr.kind else {
                        return Err(ParseError {
                            message: "only named functions and networks can be called".to_string(),
                            span: expr.span,
                        });
                    };
                    let callee = Ident::new(expr.span, v.id.clone());
                    self.bump()?;
                    let args = self.parse_args(TokenKind::RParen)?;
                    let close = self.expect(TokenKind::RParen)?;
                    expr = Expr::new(join(expr.span, close.span), ExprKind::Call { callee, args });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let tok = self.bump()?;
        let kind = match tok.kind {
            TokenKind::Int(n) => ExprKind::Constant(Constant::Int(n)),
            TokenKind::Real(v) => ExprKind::Constant(Constant::Real(v)),
            TokenKind::String(s) => ExprKind::Str(s),
            TokenKind::Ident(name) => ExprKind::Variable(Variable::new(name)),
            TokenKind::LParen => {
                let first = self.parse_expr()?;
                if self.at(TokenKind::RParen) {
                    let close = self.bump()?;
                    return Ok(Expr::new(join(tok.span, close.span), first.kind));
                }
                let mut items = vec![first];
                while self.at(TokenKind::Comma) {
                    self.bump()?;
                    if self.at(TokenKind::RParen) {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                let close = self.expect(TokenKind::RParen)?;
                return Ok(Expr::new(join(tok.span, close.span), ExprKind::Tuple(items)));
            }
            TokenKind::LBrace => {
                let items = self.parse_args(TokenKind::RBrace)?;
                let close = self.expect(TokenKind::RBrace)?;
                return Ok(Expr::new(join(tok.span, close.span), ExprKind::List(items)));
            }
            other => {
                return Err(ParseError {
                    message: format!("expected expression, found {}", other.describe()),
                    span: tok.span,
                });
            }
        };
        Ok(Expr::new(tok.span, kind))
    }

    /// Comma-separated expressions up to (not including) `close`.
    fn parse_args(&mut self, close: TokenKind) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.at(close.clone()) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.at(TokenKind::Comma) {
                break;
            }
            self.bump()?;
        }
        Ok(args)
    }

    /// `[e, ...]` with its full span.
    fn parse_index_list(&mut self) -> Result<(Vec<Expr>, Span), ParseError> {
        let open = self.expect(TokenKind::LBracket)?;
        let items = self.parse_args(TokenKind::RBracket)?;
        let close = self.expect(TokenKind::RBracket)?;
        if items.is_empty() {
            return Err(ParseError {
                message: "empty index list".to_string(),
                span: join(open.span, close.span),
            });
        }
        Ok((items, join(open.span, close.span)))
    }

    fn error_here(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            span: self.peek_span().unwrap_or_else(|| span_between(0, 0)),
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.bump()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident::new(tok.span, name)),
            other => Err(ParseError {
                message: format!("expected identifier, found {}", other.describe()),
                span: tok.span,
            }),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let tok = self.bump()?;
        if mem::discriminant(&tok.kind) == mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError {
                message: format!("expected {}, found {}", expected.describe(), tok.kind.describe()),
                span: tok.span,
            })
        }
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        let tok = self.tokens.get(self.idx).cloned().ok_or_else(|| ParseError {
            message: "unexpected end of input".to_string(),
            span: span_between(0, 0),
        })?;
        self.idx += 1;
        Ok(tok)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(&kind))
    }

    fn at_ident(&self, name: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(n)) if n == name)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_kind_n(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.idx + n).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Option<Span> {
        self.tokens.get(self.idx).map(|t| t.span)
    }
}

fn cmp_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::EqEq => Some(BinOp::EQ),
        TokenKind::Neq => Some(BinOp::NE),
        TokenKind::Lt => Some(BinOp::LT),
        TokenKind::Gt => Some(BinOp::GT),
        TokenKind::Le => Some(BinOp::LE),
        TokenKind::Ge => Some(BinOp::GE),
        _ => None,
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::new(
        join(left.span, right.span),
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
    )
}

/// A single index stays as is; several become a tuple.
fn collapse(mut items: Vec<Expr>, span: Span) -> Expr {
    if items.len() == 1 {
        if let Some(only) = items.pop() {
            return only;
        }
    }
    Expr::new(span, ExprKind::Tuple(items))
}

fn is_assignable(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Variable(_) => true,
        ExprKind::Subscript { base, .. } => is_assignable(base),
        _ => false,
    }
}
