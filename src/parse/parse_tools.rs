use std::ops::Range;

use crate::lex::{Lexer, Punct, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenWrapper<'src> {
    pub token: Token<'src>,
    pub span: Range<usize>,
}

/// Every token of one expression, lexed up front, with a cursor that can move
/// back and forth freely. The last token is always `Eof`, and looking past the
/// end keeps returning it.
pub struct TokenBuffer<'src> {
    tokens: Vec<TokenWrapper<'src>>,
    index: usize,
}

impl<'src> TokenBuffer<'src> {
    pub fn new(source: &'src str) -> TokenBuffer<'src> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();

        loop {
            let token = lexer.next_token();
            tokens.push(TokenWrapper {
                token,
                span: lexer.span(),
            });

            if token == Token::Eof {
                break;
            }
        }

        TokenBuffer { tokens, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn seek_to(&mut self, index: usize) {
        self.index = index.min(self.tokens.len() - 1);
    }

    pub fn advance(&mut self) {
        self.seek_to(self.index + 1);
    }

    pub fn backtrack(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    /// Look ahead (or behind, for negative offsets) of the cursor.
    pub fn la(&self, offset: isize) -> TokenWrapper<'src> {
        let last = self.tokens.len() - 1;
        let index = (self.index as isize + offset).clamp(0, last as isize) as usize;
        self.tokens[index].clone()
    }

    /// Consume the next token if `f` accepts it.
    pub fn eat_if<F, R>(&mut self, f: F) -> Option<(R, TokenWrapper<'src>)>
    where
        F: FnOnce(&Token<'src>) -> Option<R>,
    {
        let tw = self.la(0);
        let r = f(&tw.token)?;
        self.advance();
        Some((r, tw))
    }

    pub fn eat_match(&mut self, p: Punct) -> Option<TokenWrapper<'src>> {
        self.eat_if(|t| (*t == Token::Punct(p)).then_some(()))
            .map(|(_, tw)| tw)
    }

    pub fn at_eof(&self) -> bool {
        self.la(0).token == Token::Eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookahead_and_backtrack() {
        let mut b = TokenBuffer::new("a + b");
        assert_eq!(b.la(0).token, Token::Identifier("a"));
        assert_eq!(b.la(2).token, Token::Identifier("b"));
        assert_eq!(b.la(9).token, Token::Eof);

        b.advance();
        assert!(b.eat_match(Punct::Plus).is_some());
        assert!(b.eat_match(Punct::Plus).is_none());
        assert_eq!(b.la(-1).span, 2..3);

        b.backtrack();
        assert_eq!(b.la(0).token, Token::Punct(Punct::Plus));

        let mark = b.index();
        b.advance();
        b.advance();
        assert!(b.at_eof());
        b.advance();
        assert!(b.at_eof());
        b.seek_to(mark);
        assert_eq!(b.la(0).token, Token::Punct(Punct::Plus));
    }
}
