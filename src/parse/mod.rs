mod parse_expr;
pub mod parse_tools;

pub use parse_expr::{infix_binding_power, prefix_binding_power, ExpressionParser, ExpressionResult};
pub use parse_tools::*;

use crate::ast::{ExpressionCache, TermRef};
use crate::errors::ParseError;
use crate::lex::Token;

/// Compiles watch expression text into interned terms.
///
/// Every node goes through the cache, so compiling the same text twice hands
/// back the very same tree.
pub struct Parser<'cache> {
    cache: &'cache ExpressionCache,
}

impl<'cache> Parser<'cache> {
    pub fn new(cache: &'cache ExpressionCache) -> Parser<'cache> {
        Parser { cache }
    }

    pub fn cache(&self) -> &'cache ExpressionCache {
        self.cache
    }

    pub fn try_compile(&self, source: &str) -> Result<TermRef, ParseError> {
        let mut parser = ExpressionParser::new(self.cache, source);
        let term = parser.parse_expr()?;

        let rest = parser.lex.la(0);
        match rest.token {
            Token::Eof => Ok(term),
            Token::Invalid(_) | Token::Identifier(_) => match parser.unexpected(rest.clone()) {
                ParseError::UnexpectedToken { .. } => Err(trailing(rest)),
                specific => Err(specific),
            },
            _ => Err(trailing(rest)),
        }
    }

    /// Like [`try_compile`](Parser::try_compile), but a failure is only logged.
    pub fn compile(&self, source: &str) -> Option<TermRef> {
        match self.try_compile(source) {
            Ok(term) => Some(term),
            Err(e) => {
                tracing::debug!("could not compile '{source}': {e}");
                None
            }
        }
    }
}

fn trailing(rest: TokenWrapper<'_>) -> ParseError {
    ParseError::TrailingInput {
        offset: rest.span.start,
        len: rest.span.len(),
        found: rest.token.describe(),
    }
}
