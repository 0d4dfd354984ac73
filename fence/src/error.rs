use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use thiserror::Error;

/// A block whose body cannot be split into a language line and code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("block has no language line")]
    MissingLanguageLine {
        /// Byte span of the whole block in the source.
        span: Range<usize>,
    },
}

impl DecodeError {
    pub fn span(&self) -> Range<usize> {
        match self {
            DecodeError::MissingLanguageLine { span } => span.clone(),
        }
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        Diagnostic::error()
            .with_message(self.to_string())
            .with_labels(vec![
                Label::primary(file_id, self.span()).with_message("this block is skipped"),
            ])
            .with_notes(vec![
                "a block must start with a language tag followed by a line break".to_string(),
            ])
    }
}
