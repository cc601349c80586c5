#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use deepppl_ast::{ConstructionError, Span};
use deepppl_lex::LexError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("parse error: {message}")]
#[diagnostic(code(deepppl::parse))]
#[allow(unused_assignments)]
pub struct ParseError {
    pub message: String,
    #[label]
    pub span: Span,
}

impl From<ConstructionError> for ParseError {
    fn from(err: ConstructionError) -> Self {
        ParseError {
            message: err.to_string(),
            span: err.span(),
        }
    }
}

/// Anything that stops source text from becoming a list of blocks.
#[derive(Debug, Error, Diagnostic)]
pub enum SyntaxError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
}

impl SyntaxError {
    pub fn message(&self) -> &str {
        match self {
            SyntaxError::Lex(e) => &e.message,
            SyntaxError::Parse(e) => &e.message,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            SyntaxError::Lex(e) => e.span,
            SyntaxError::Parse(e) => e.span,
        }
    }
}
