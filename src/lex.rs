use std::ops::Range;
use std::str::FromStr;

use logos::Logos;
use strum_macros::Display;

use crate::types::Primitive;

#[derive(Logos, Debug, PartialEq, Eq, Hash, Clone, Copy)]
enum RawToken {
    #[regex("_(i8|u8|i16|u16|i32|u32)", priority = 10)]
    Suffix,

    #[regex("0[xX][0-9a-fA-F]+")]
    Hex,

    #[regex("[0-9]+")]
    Decimal,

    #[token("==")]
    CmpEqual,

    #[token("<=")]
    CmpLessThanOrEqual,

    #[token(">=")]
    CmpGreaterThanOrEqual,

    #[token("!=")]
    CmpNotEqual,

    #[token("->")]
    ThinArrow,

    #[token("<<")]
    ShiftLeft,

    #[token(">>")]
    ShiftRight,

    #[token("=")]
    Equals,

    #[token("<")]
    CmpLessThan,

    #[token(">")]
    CmpGreaterThan,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("/")]
    FSlash,

    #[token("!")]
    Bang,

    #[token("~")]
    Tilde,

    #[token("%")]
    Modulo,

    #[token("^")]
    Caret,

    #[token("&")]
    Ampersand,

    #[token("*")]
    Asterisk,

    #[token("-")]
    Dash,

    #[token("+")]
    Plus,

    #[token(".")]
    Dot,

    #[token("|")]
    Pipe,

    #[regex(r"\$[a-zA-Z0-9_]+")]
    DebugIdentifier,

    #[regex("[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier,

    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[error]
    Error,
}

/// Punctuation the expression language knows about. `Display` gives the source text.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Display)]
pub enum Punct {
    #[strum(serialize = "==")]
    CmpEqual,
    #[strum(serialize = "<=")]
    CmpLessThanOrEqual,
    #[strum(serialize = ">=")]
    CmpGreaterThanOrEqual,
    #[strum(serialize = "!=")]
    CmpNotEqual,
    #[strum(serialize = "->")]
    ThinArrow,
    #[strum(serialize = "<<")]
    ShiftLeft,
    #[strum(serialize = ">>")]
    ShiftRight,
    #[strum(serialize = "=")]
    Equals,
    #[strum(serialize = "<")]
    CmpLessThan,
    #[strum(serialize = ">")]
    CmpGreaterThan,
    #[strum(serialize = "(")]
    LParen,
    #[strum(serialize = ")")]
    RParen,
    #[strum(serialize = "/")]
    FSlash,
    #[strum(serialize = "!")]
    Bang,
    #[strum(serialize = "~")]
    Tilde,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "^")]
    Caret,
    #[strum(serialize = "&")]
    Ampersand,
    #[strum(serialize = "*")]
    Asterisk,
    #[strum(serialize = "-")]
    Dash,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = "|")]
    Pipe,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum ConstantFormat {
    Dec,
    Hex,
}

/// An integer literal before any suffix has been applied. `value` holds the two's
/// complement bits of the literal, so `-4` is `u64::MAX - 3`.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Literal {
    pub value: u64,
    pub format: ConstantFormat,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Token<'src> {
    Invalid(&'src str),
    Eof,
    Constant(Literal),
    TypeSuffix(Primitive),
    TypeCast(Primitive),
    Punct(Punct),
    /// Name without the leading `$`.
    DebugIdentifier(&'src str),
    Identifier(&'src str),
}

impl<'src> Token<'src> {
    /// Whether an operand can end with this token. A sign right after one of
    /// these is a binary operator, not part of a number.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Constant(_)
                | Token::TypeSuffix(_)
                | Token::DebugIdentifier(_)
                | Token::Identifier(_)
                | Token::Punct(Punct::RParen)
        )
    }

    /// Short human description, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Invalid(s) => format!("invalid input '{s}'"),
            Token::Eof => "end of input".to_owned(),
            Token::Constant(Literal {
                value,
                format: ConstantFormat::Hex,
            }) => format!("constant 0x{value:x}"),
            Token::Constant(Literal { value, .. }) => format!("constant {}", *value as i64),
            Token::TypeSuffix(p) => format!("suffix '_{p}'"),
            Token::TypeCast(p) => format!("cast '({p})'"),
            Token::Punct(p) => format!("'{p}'"),
            Token::DebugIdentifier(s) => format!("debugger variable '${s}'"),
            Token::Identifier(s) => format!("identifier '{s}'"),
        }
    }
}

/// The width named by a suffix such as `_u8`.
pub fn suffix_width(slice: &str) -> Option<Primitive> {
    Primitive::from_str(slice.strip_prefix('_')?).ok()
}

fn punct_for(raw: RawToken) -> Option<Punct> {
    use RawToken as R;
    Some(match raw {
        R::CmpEqual => Punct::CmpEqual,
        R::CmpLessThanOrEqual => Punct::CmpLessThanOrEqual,
        R::CmpGreaterThanOrEqual => Punct::CmpGreaterThanOrEqual,
        R::CmpNotEqual => Punct::CmpNotEqual,
        R::ThinArrow => Punct::ThinArrow,
        R::ShiftLeft => Punct::ShiftLeft,
        R::ShiftRight => Punct::ShiftRight,
        R::Equals => Punct::Equals,
        R::CmpLessThan => Punct::CmpLessThan,
        R::CmpGreaterThan => Punct::CmpGreaterThan,
        R::LParen => Punct::LParen,
        R::RParen => Punct::RParen,
        R::FSlash => Punct::FSlash,
        R::Bang => Punct::Bang,
        R::Tilde => Punct::Tilde,
        R::Modulo => Punct::Modulo,
        R::Caret => Punct::Caret,
        R::Ampersand => Punct::Ampersand,
        R::Asterisk => Punct::Asterisk,
        R::Dash => Punct::Dash,
        R::Plus => Punct::Plus,
        R::Dot => Punct::Dot,
        R::Pipe => Punct::Pipe,
        _ => return None,
    })
}

/// Scans one expression, a token per call.
///
/// On top of the raw scanner this tracks the bits of context the grammar needs:
/// a width suffix only counts when it is glued to the constant just produced, and
/// a `+`/`-` glued to a following number is part of that number only where an
/// operand could start. Once input runs out every call returns `Token::Eof`.
pub struct Lexer<'src> {
    source: &'src str,
    raw: logos::Lexer<'src, RawToken>,

    allows_suffix: bool,
    operand_ended: bool,
    last_end: usize,
    span: Range<usize>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Lexer<'src> {
        Lexer {
            source,
            raw: RawToken::lexer(source),
            allows_suffix: false,
            operand_ended: false,
            last_end: 0,
            span: 0..0,
        }
    }

    /// Byte range of the token returned by the last `next_token` call.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    pub fn next_token(&mut self) -> Token<'src> {
        let suffix_allowed = std::mem::replace(&mut self.allows_suffix, false);

        let raw = match self.raw.next() {
            Some(raw) => raw,
            None => {
                self.span = self.source.len()..self.source.len();
                self.operand_ended = false;
                return Token::Eof;
            }
        };

        let mut span = self.raw.span();
        let slice = self.raw.slice();

        let token = match raw {
            RawToken::Suffix if suffix_allowed && span.start == self.last_end => {
                match suffix_width(slice) {
                    Some(p) => Token::TypeSuffix(p),
                    None => Token::Invalid(slice),
                }
            }
            // a suffix that isn't glued to a constant is just a name
            RawToken::Suffix | RawToken::Identifier => Token::Identifier(slice),
            RawToken::Hex => match u64::from_str_radix(&slice[2..], 16) {
                Ok(value) => Token::Constant(Literal {
                    value,
                    format: ConstantFormat::Hex,
                }),
                Err(_) => Token::Invalid(slice),
            },
            RawToken::Decimal => decimal(slice, false),
            RawToken::LParen => match self.cast_ahead(&span) {
                Some((p, ahead)) => {
                    span = span.start..ahead.span().end;
                    self.raw = ahead;
                    Token::TypeCast(p)
                }
                None => Token::Punct(Punct::LParen),
            },
            RawToken::DebugIdentifier => Token::DebugIdentifier(&slice[1..]),
            RawToken::Plus | RawToken::Dash if !self.operand_ended => {
                let negative = raw == RawToken::Dash;
                let mut ahead = self.raw.clone();
                match ahead.next() {
                    Some(RawToken::Decimal) if ahead.span().start == span.end => {
                        let digits = ahead.slice();
                        span = span.start..ahead.span().end;
                        self.raw = ahead;
                        decimal(digits, negative)
                    }
                    _ => Token::Punct(if negative { Punct::Dash } else { Punct::Plus }),
                }
            }
            RawToken::Whitespace | RawToken::Error => Token::Invalid(slice),
            other => match punct_for(other) {
                Some(p) => Token::Punct(p),
                None => Token::Invalid(slice),
            },
        };

        if let Token::Constant(_) = token {
            self.allows_suffix = true;
        }
        self.operand_ended = token.ends_operand();
        self.last_end = span.end;
        self.span = span;

        token
    }

    /// Whether the `(` at `open` starts a cast like `(u8)` or `( i32 )`. Only
    /// spaces may separate the width name from the parentheses; anything else
    /// leaves the `(` as plain punctuation.
    fn cast_ahead(&self, open: &Range<usize>) -> Option<(Primitive, logos::Lexer<'src, RawToken>)> {
        let mut ahead = self.raw.clone();

        if ahead.next() != Some(RawToken::Identifier) {
            return None;
        }
        let ty = Primitive::from_str(ahead.slice()).ok()?;
        let name = ahead.span();

        if ahead.next() != Some(RawToken::RParen) {
            return None;
        }
        let close = ahead.span();

        let spaces_only = |gap: &str| gap.bytes().all(|b| b == b' ');
        if spaces_only(&self.source[open.end..name.start])
            && spaces_only(&self.source[name.end..close.start])
        {
            Some((ty, ahead))
        } else {
            None
        }
    }
}

fn decimal(digits: &str, negative: bool) -> Token<'_> {
    match digits.parse::<u64>() {
        Ok(value) => Token::Constant(Literal {
            value: if negative { value.wrapping_neg() } else { value },
            format: ConstantFormat::Dec,
        }),
        Err(_) => Token::Invalid(digits),
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = (Token<'src>, Range<usize>);

    /// Like `next_token`, but stops at the end of input.
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Token::Eof => None,
            t => Some((t, self.span())),
        }
    }
}
