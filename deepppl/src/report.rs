#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::Path;

use deepppl_ast::{Program, Span};
use miette::Diagnostic;
use serde::Serialize;

use crate::CompileError;

pub const SCHEMA: &str = "deepppl.check.v1";

#[derive(Debug, Clone, Serialize)]
pub struct SpanRange {
    pub offset: usize,
    pub len: usize,
}

impl From<Span> for SpanRange {
    fn from(s: Span) -> Self {
        Self {
            offset: s.offset(),
            len: s.len(),
        }
    }
}

/// Machine-readable outcome of `deepppl check`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub schema: &'static str,
    pub input: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    /// Blocks present, in canonical order.
    pub blocks: Vec<&'static str>,
    /// Variables sampled by each sampling block.
    pub sampled: BTreeMap<&'static str, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SpanRange>,
}

impl CheckReport {
    pub fn new(input: &Path, result: &Result<Program, CompileError>) -> Self {
        let mut report = Self {
            schema: SCHEMA,
            input: display_path(input),
            ok: result.is_ok(),
            error: None,
            blocks: Vec::new(),
            sampled: BTreeMap::new(),
        };
        match result {
            Ok(program) => {
                for block in program.blocks() {
                    report.blocks.push(block.kind.name());
                    if block.kind.is_sampling() {
                        let ids = block.sampled().iter().cloned().collect();
                        report.sampled.insert(block.kind.name(), ids);
                    }
                }
            }
            Err(err) => {
                report.error = Some(ErrorReport {
                    code: err.code().map(|c| c.to_string()),
                    message: err.to_string(),
                    span: err.span().map(SpanRange::from),
                });
            }
        }
        report
    }
}

/// Path relative to the working directory when possible, with `/` separators.
pub fn display_path(path: &Path) -> String {
    let p = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let s = p.to_string_lossy().replace('\\', "/");
    if let Ok(cwd) = std::env::current_dir() {
        let prefix = format!("{}/", cwd.to_string_lossy().replace('\\', "/"));
        if let Some(rest) = s.strip_prefix(&prefix) {
            return rest.to_string();
        }
    }
    s
}
