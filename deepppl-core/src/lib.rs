#![forbid(unsafe_code)]

mod assemble;
pub mod builtins;
mod error;
mod resolve;
pub mod types;
mod validate;
pub mod walk;

use deepppl_ast::Program;

pub use assemble::assemble;
pub use error::{AssemblyError, SemanticError};
pub use resolve::resolve_program;
pub use validate::validate_program;

/// Resolution followed by validation; the program is annotated in place.
pub fn check_program(program: &mut Program) -> Result<(), SemanticError> {
    resolve_program(program)?;
    validate_program(program)
}
