use std::fmt::Write;
use std::ops::Range;

use colored::*;
use thiserror::Error;

/// Failures reported by an [`Environment`](crate::env::Environment). These are
/// never turned into a no-value result, they reach whoever asked for the evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("memory at {address:#06x} is not available")]
    MemoryUnavailable { address: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken {
        offset: usize,
        len: usize,
        found: String,
    },

    #[error("invalid token '{text}' at offset {offset}")]
    InvalidToken { offset: usize, text: String },

    #[error("parenthesis opened at offset {opened_at} is never closed")]
    UnbalancedParen { opened_at: usize },

    #[error("expected a field name after '{accessor}' at offset {offset}")]
    MissingField { offset: usize, accessor: String },

    #[error("width suffix '{suffix}' at offset {offset} must directly follow a constant")]
    DetachedSuffix { offset: usize, suffix: String },

    #[error("expression nests too deeply at offset {offset}")]
    NestingTooDeep { offset: usize },

    #[error("unexpected trailing {found} at offset {offset}")]
    TrailingInput {
        offset: usize,
        len: usize,
        found: String,
    },
}

impl ParseError {
    /// The part of the source text the error points at.
    pub fn span(&self) -> Range<usize> {
        match self {
            ParseError::UnexpectedToken { offset, len, .. }
            | ParseError::TrailingInput { offset, len, .. } => *offset..(*offset + (*len).max(1)),
            ParseError::InvalidToken { offset, text } => *offset..(*offset + text.len().max(1)),
            ParseError::UnbalancedParen { opened_at } => *opened_at..(*opened_at + 1),
            ParseError::NestingTooDeep { offset } => *offset..(*offset + 1),
            ParseError::DetachedSuffix { offset, suffix } => *offset..(*offset + suffix.len()),
            ParseError::MissingField { offset, accessor } => {
                *offset..(*offset + accessor.len().max(1))
            }
        }
    }
}

pub struct ErrorPrinter {}

impl ErrorPrinter {
    /// Lay out `error` underneath the expression it came from, carets under the
    /// offending span.
    pub fn contextualize(&self, source: &str, error: &ParseError) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{}: {}",
            "error".bold().bright_red(),
            error.to_string().bold().bright_yellow()
        );

        let span = error.span();
        let _ = writeln!(out, "  {} {}", "|".blue().bold(), source.bold());

        let mut marks = String::new();
        for i in 0..source.len().max(span.end) {
            if span.contains(&i) {
                marks.push('^');
            } else {
                marks.push(' ');
            }
        }
        let _ = write!(out, "  {} {}", "|".blue().bold(), marks.trim_end().bright_red());

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_cover_the_offender() {
        let e = ParseError::TrailingInput {
            offset: 4,
            len: 2,
            found: "'>>'".into(),
        };
        assert_eq!(e.span(), 4..6);

        let e = ParseError::UnbalancedParen { opened_at: 0 };
        assert_eq!(e.span(), 0..1);

        let e = ParseError::DetachedSuffix {
            offset: 2,
            suffix: "_u16".into(),
        };
        assert_eq!(e.span(), 2..6);
    }

    #[test]
    fn contextualize_marks_span() {
        colored::control::set_override(false);
        let e = ParseError::InvalidToken {
            offset: 2,
            text: "#".into(),
        };
        let printed = ErrorPrinter {}.contextualize("a #", &e);
        assert!(printed.ends_with("|   ^"), "{printed}");
    }
}
