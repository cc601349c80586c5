#![forbid(unsafe_code)]

//! Lowering of checked programs to Pyro Python modules.

mod emit;
mod names;
mod normalize;
mod usage;

pub use emit::{emit_program, emit_program_with, EmitOptions, GenError};
pub use names::NameGen;
pub use normalize::normalize;
