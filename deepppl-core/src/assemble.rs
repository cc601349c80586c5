#![forbid(unsafe_code)]

use deepppl_ast::{DeclRole, Program, ProgramBlock, StmtKind};
use tracing::trace;

use crate::error::AssemblyError;

/// Groups parsed blocks into a program. Source order does not matter; a kind seen twice
/// is an error. Top-level declarations take the role of their block.
pub fn assemble(blocks: Vec<ProgramBlock>) -> Result<Program, AssemblyError> {
    let mut program = Program::new();
    for mut block in blocks {
        if let Some(role) = DeclRole::for_block(block.kind) {
            for stmt in &mut block.body {
                if let StmtKind::Decl(decl) = &mut stmt.kind {
                    decl.set_role(role);
                }
            }
        }
        trace!(block = block.kind.name(), stmts = block.body.len(), "assemble block");
        if let Err(dup) = program.insert(block) {
            let first = program.block(dup.kind).map_or(dup.span, |b| b.span);
            return Err(AssemblyError {
                kind: dup.kind,
                span: dup.span,
                first,
            });
        }
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepppl_ast::{span, BlockKind};

    #[test]
    fn duplicate_block_reports_both_occurrences() {
        let blocks = vec![
            ProgramBlock::new(BlockKind::Data, span(0, 4), Vec::new()),
            ProgramBlock::new(BlockKind::Model, span(10, 4), Vec::new()),
            ProgramBlock::new(BlockKind::Data, span(20, 4), Vec::new()),
        ];
        let err = assemble(blocks).unwrap_err();
        assert_eq!(err.kind, BlockKind::Data);
        assert_eq!(err.first, span(0, 4));
        assert_eq!(err.span, span(20, 4));
    }
}
