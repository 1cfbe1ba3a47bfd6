use super::parse_tools::{TokenBuffer, TokenWrapper};
use crate::ast::{BinaryOp, ExpressionCache, MemberOp, TermRef, UnaryOp};
use crate::errors::ParseError;
use crate::lex::{suffix_width, Literal, Punct, Token};
use crate::types::{DirectHandle, Primitive};
use crate::value::VPrimitive;

pub type ExpressionResult = Result<TermRef, ParseError>;

/// Deeper than this and the input is rejected instead of risking the stack.
const MAX_NESTING: usize = 256;

pub struct ExpressionParser<'cache, 'src> {
    pub(super) cache: &'cache ExpressionCache,
    pub(super) lex: TokenBuffer<'src>,
}

impl<'cache, 'src> ExpressionParser<'cache, 'src> {
    pub fn new(cache: &'cache ExpressionCache, source: &'src str) -> Self {
        ExpressionParser {
            cache,
            lex: TokenBuffer::new(source),
        }
    }

    pub(super) fn unexpected(&self, tw: TokenWrapper<'src>) -> ParseError {
        match tw.token {
            Token::Invalid(text) => ParseError::InvalidToken {
                offset: tw.span.start,
                text: text.to_owned(),
            },
            // a suffix only reads as one when glued to its constant
            Token::Identifier(name) if suffix_width(name).is_some() => ParseError::DetachedSuffix {
                offset: tw.span.start,
                suffix: name.to_owned(),
            },
            other => ParseError::UnexpectedToken {
                offset: tw.span.start,
                len: tw.span.len(),
                found: other.describe(),
            },
        }
    }

    fn check_depth(&self, level: usize) -> Result<(), ParseError> {
        if level > MAX_NESTING {
            Err(ParseError::NestingTooDeep {
                offset: self.lex.la(0).span.start,
            })
        } else {
            Ok(())
        }
    }

    pub fn parse_expr(&mut self) -> ExpressionResult {
        self.parse_expr_inner(0, 0)
    }

    /// Binary operators, folded left to right by binding power.
    pub fn parse_expr_inner(&mut self, min_bp: u32, level: usize) -> ExpressionResult {
        self.check_depth(level)?;

        let mut lhs = self.parse_unary(level + 1)?;

        while let Some(((l_bp, r_bp), tw)) = self.lex.eat_if(|t| match t {
            Token::Punct(p) => infix_binding_power(*p),
            _ => None,
        }) {
            if l_bp < min_bp {
                self.lex.backtrack();
                break;
            }

            let rhs = self.parse_expr_inner(r_bp, level + 1)?;
            lhs = self.build_binary(&tw.token, lhs, rhs);
        }

        Ok(lhs)
    }

    fn build_binary(&self, t: &Token<'src>, lhs: TermRef, rhs: TermRef) -> TermRef {
        let op = match t {
            Token::Punct(p) => binary_op_for(*p),
            _ => None,
        };

        match op {
            Some(op) => self.cache.binary(op, lhs, rhs),
            None => panic!("Programming error: no way to build binary expression from {t:?}"),
        }
    }

    /// Prefix operators and casts, then a postfix expression.
    fn parse_unary(&mut self, level: usize) -> ExpressionResult {
        self.check_depth(level)?;

        let t1 = self.lex.la(0);
        match t1.token {
            Token::Punct(p) if prefix_binding_power(p).is_some() => {
                self.lex.advance();
                let arg = self.parse_unary(level + 1)?;

                Ok(match p {
                    Punct::Asterisk => self.cache.memory_read(arg),
                    Punct::Plus => self.cache.unary(UnaryOp::Plus, arg),
                    Punct::Dash => self.cache.unary(UnaryOp::Minus, arg),
                    Punct::Ampersand => self.cache.unary(UnaryOp::AddressOf, arg),
                    Punct::Bang => self.cache.unary(UnaryOp::Not, arg),
                    Punct::Tilde => self.cache.unary(UnaryOp::Negate, arg),
                    _ => panic!("Programming error: no way to build unary expression from {p:?}"),
                })
            }
            Token::TypeCast(p) => {
                self.lex.advance();
                let arg = self.parse_unary(level + 1)?;
                Ok(self
                    .cache
                    .direct_cast(DirectHandle::primitive(p), &p.to_string(), arg))
            }
            _ => self.parse_postfix(level + 1),
        }
    }

    /// A value followed by any number of `.field` / `->field` accesses.
    fn parse_postfix(&mut self, level: usize) -> ExpressionResult {
        let mut lhs = self.parse_value(level)?;

        loop {
            let op = if let Some(_dot) = self.lex.eat_match(Punct::Dot) {
                MemberOp::Dot
            } else if let Some(_arrow) = self.lex.eat_match(Punct::ThinArrow) {
                MemberOp::Arrow
            } else {
                break;
            };

            let tw = self.lex.la(0);
            match tw.token {
                Token::Identifier(field) => {
                    self.lex.advance();
                    lhs = self.cache.member(op, lhs, field);
                }
                _ => {
                    return Err(ParseError::MissingField {
                        offset: self.lex.la(-1).span.start,
                        accessor: op.to_string(),
                    })
                }
            }
        }

        Ok(lhs)
    }

    fn parse_value(&mut self, level: usize) -> ExpressionResult {
        self.check_depth(level)?;

        let t1 = self.lex.la(0);
        match t1.token {
            Token::Constant(literal) => {
                self.lex.advance();
                let suffix = self.lex.eat_if(|t| match t {
                    Token::TypeSuffix(p) => Some(*p),
                    _ => None,
                });
                let ty = suffix.map(|(p, _)| p).unwrap_or(Primitive::I16);
                Ok(self.build_constant(literal, ty))
            }
            Token::Identifier(name) => {
                self.lex.advance();
                Ok(self.cache.variable(name))
            }
            Token::DebugIdentifier(name) => {
                self.lex.advance();
                Ok(self.cache.debugger_variable(name))
            }
            Token::Punct(Punct::LParen) => {
                self.lex.advance();
                let inner = self.parse_expr_inner(0, level + 1)?;

                if self.lex.eat_match(Punct::RParen).is_some() {
                    Ok(self.cache.parenthesized(inner))
                } else if self.lex.at_eof() {
                    Err(ParseError::UnbalancedParen {
                        opened_at: t1.span.start,
                    })
                } else {
                    Err(self.unexpected(self.lex.la(0)))
                }
            }
            _ => Err(self.unexpected(t1)),
        }
    }

    fn build_constant(&self, literal: Literal, ty: Primitive) -> TermRef {
        self.cache
            .constant(VPrimitive::from(ty, literal.value), literal.format)
    }
}

pub fn prefix_binding_power(p: Punct) -> Option<u32> {
    match p {
        Punct::Plus
        | Punct::Dash
        | Punct::Asterisk
        | Punct::Ampersand
        | Punct::Bang
        | Punct::Tilde => Some(100),
        _ => None,
    }
}

/// Every level is left associative, so the right power is one past the left.
pub fn infix_binding_power(p: Punct) -> Option<(u32, u32)> {
    match p {
        Punct::Ampersand | Punct::Pipe | Punct::Caret => Some((1, 2)),

        Punct::CmpEqual | Punct::CmpNotEqual => Some((3, 4)),

        Punct::CmpLessThan
        | Punct::CmpLessThanOrEqual
        | Punct::CmpGreaterThan
        | Punct::CmpGreaterThanOrEqual => Some((5, 6)),

        Punct::ShiftLeft | Punct::ShiftRight => Some((7, 8)),

        Punct::Plus | Punct::Dash => Some((9, 10)),

        Punct::Asterisk | Punct::FSlash | Punct::Modulo => Some((11, 12)),

        _ => None,
    }
}

fn binary_op_for(p: Punct) -> Option<BinaryOp> {
    Some(match p {
        Punct::Asterisk => BinaryOp::Multiply,
        Punct::FSlash => BinaryOp::Divide,
        Punct::Modulo => BinaryOp::Modulo,
        Punct::Plus => BinaryOp::Add,
        Punct::Dash => BinaryOp::Subtract,
        Punct::ShiftLeft => BinaryOp::ShiftLeft,
        Punct::ShiftRight => BinaryOp::ShiftRight,
        Punct::CmpLessThan => BinaryOp::Less,
        Punct::CmpLessThanOrEqual => BinaryOp::LessOrEqual,
        Punct::CmpEqual => BinaryOp::Equal,
        Punct::CmpNotEqual => BinaryOp::NotEqual,
        Punct::CmpGreaterThan => BinaryOp::Greater,
        Punct::CmpGreaterThanOrEqual => BinaryOp::GreaterOrEqual,
        Punct::Ampersand => BinaryOp::BitAnd,
        Punct::Pipe => BinaryOp::BitOr,
        Punct::Caret => BinaryOp::BitXor,
        _ => return None,
    })
}
