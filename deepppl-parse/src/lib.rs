#![forbid(unsafe_code)]

mod error;
mod parser;

use deepppl_ast::ProgramBlock;
use deepppl_lex::Lexer;

pub use error::{ParseError, SyntaxError};
pub use parser::Parser;

/// Parses source text into its blocks, in source order. Grouping and ordering them into
/// a program is left to the assembler.
pub fn parse_source(src: &str) -> Result<Vec<ProgramBlock>, SyntaxError> {
    let tokens = Lexer::new(src).lex()?;
    let mut parser = Parser::new(&tokens);
    Ok(parser.parse_blocks()?)
}

pub fn parse_expr(src: &str) -> Result<deepppl_ast::Expr, SyntaxError> {
    let tokens = Lexer::new(src).lex()?;
    let mut parser = Parser::new(&tokens);
    Ok(parser.parse_expr_eof()?)
}
