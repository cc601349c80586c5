#![forbid(unsafe_code)]
#![allow(unused_assignments)]

//! Compiler from the deepppl modeling language to Pyro.
//!
//! The pipeline is parse, assemble, resolve, validate and generate. Each stage stops at
//! its first error and [`CompileError`] forwards that error unchanged.

pub mod config;
pub mod report;

use std::fs;
use std::path::{Path, PathBuf};

use deepppl_ast::{Program, Span};
use deepppl_backend_pyro::{emit_program, EmitOptions, GenError};
use deepppl_core::{assemble, check_program, AssemblyError, SemanticError};
use deepppl_parse::{parse_source, SyntaxError};
use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, instrument};

pub use config::{load_config, Config, ConfigError};

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CompileError {
    #[error("cannot read {}", path.display())]
    #[diagnostic(code(deepppl::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Generation(#[from] GenError),
}

impl CompileError {
    /// Primary source location, when the error has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Io { .. } => None,
            CompileError::Syntax(e) => Some(e.span()),
            CompileError::Assembly(e) => Some(e.span),
            CompileError::Semantic(e) => Some(e.span()),
            CompileError::Generation(e) => Some(e.span),
        }
    }
}

/// Reads a model file and compiles it to a Python module.
#[instrument(skip(path, config), fields(path = %path.display()))]
pub fn compile(path: &Path, config: &Config) -> Result<String, CompileError> {
    let src = read_source(path)?;
    compile_source(&src, config)
}

pub fn compile_source(src: &str, config: &Config) -> Result<String, CompileError> {
    let program = check_source(src)?;
    let options = EmitOptions {
        verbose: config.verbose,
    };
    let python = emit_program(&program, &options)?;
    debug!(bytes = python.len(), verbose = config.verbose, "generated");
    Ok(python)
}

/// Every stage except generation. The returned program is resolved and validated.
pub fn check_source(src: &str) -> Result<Program, CompileError> {
    let blocks = parse_source(src)?;
    debug!(blocks = blocks.len(), "parsed");
    let mut program = assemble(blocks)?;
    check_program(&mut program)?;
    debug!(
        sampled = program.blocks().map(|b| b.sampled().len()).sum::<usize>(),
        "checked"
    );
    Ok(program)
}

pub fn read_source(path: &Path) -> Result<String, CompileError> {
    fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })
}
