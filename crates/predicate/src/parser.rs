// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive-descent parser for predicate scripts.
//!
//! ```text
//! expr     := or
//! or       := and ('||' and)*
//! and      := equality ('&&' equality)*
//! equality := unary (('==' | '!=') unary)?
//! unary    := '!' unary | postfix
//! postfix  := primary ('.' ident [ '(' args ')' ])*
//! primary  := literal | ident | '(' expr ')'
//! ```

use crate::ast::Expr;
use crate::error::PredicateError;
use crate::lexer::{tokenize, Token, TokenKind};
use serde_json::Value;

pub fn parse(script: &str) -> Result<Expr, PredicateError> {
    let tokens = tokenize(script)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if let Some(extra) = parser.peek() {
        return Err(PredicateError::UnexpectedToken {
            found: extra.kind.to_string(),
            expected: "end of script",
            at: extra.at,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<(), PredicateError> {
        match self.bump() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(PredicateError::UnexpectedToken {
                found: token.kind.to_string(),
                expected,
                at: token.at,
            }),
            None => Err(PredicateError::UnexpectedEnd { expected }),
        }
    }

    fn expr(&mut self) -> Result<Expr, PredicateError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.and()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.and()?;
            left = Expr::Or(left.boxed(), right.boxed());
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.equality()?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.equality()?;
            left = Expr::And(left.boxed(), right.boxed());
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, PredicateError> {
        let left = self.unary()?;
        if self.eat(&TokenKind::EqEq) {
            let right = self.unary()?;
            return Ok(Expr::Eq(left.boxed(), right.boxed()));
        }
        if self.eat(&TokenKind::BangEq) {
            let right = self.unary()?;
            return Ok(Expr::Ne(left.boxed(), right.boxed()));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, PredicateError> {
        if self.eat(&TokenKind::Bang) {
            let inner = self.unary()?;
            return Ok(Expr::Not(inner.boxed()));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, PredicateError> {
        let mut expr = self.primary()?;
        while self.eat(&TokenKind::Dot) {
            let name = match self.bump() {
                Some(Token { kind: TokenKind::Ident(name), .. }) => name,
                Some(token) => {
                    return Err(PredicateError::UnexpectedToken {
                        found: token.kind.to_string(),
                        expected: "field or method name",
                        at: token.at,
                    })
                }
                None => return Err(PredicateError::UnexpectedEnd { expected: "field or method name" }),
            };

            if self.eat(&TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.eat(&TokenKind::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&TokenKind::Comma) {
                            continue;
                        }
                        self.expect(TokenKind::RParen, "')'")?;
                        break;
                    }
                }
                expr = Expr::Call { target: expr.boxed(), method: name, args };
            } else {
                // Extend a path where possible, otherwise field access
                // becomes a zero-arg accessor on a computed value.
                expr = match expr {
                    Expr::Path { root, mut segments } => {
                        segments.push(name);
                        Expr::Path { root, segments }
                    }
                    other => Expr::Call { target: other.boxed(), method: name, args: Vec::new() },
                };
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, PredicateError> {
        match self.bump() {
            Some(Token { kind: TokenKind::Str(s), .. }) => Ok(Expr::Literal(Value::String(s))),
            Some(Token { kind: TokenKind::Num(n), at }) => {
                let num = serde_json::Number::from_f64(n).ok_or(PredicateError::BadNumber {
                    literal: n.to_string(),
                    at,
                })?;
                Ok(Expr::Literal(Value::Number(num)))
            }
            Some(Token { kind: TokenKind::True, .. }) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token { kind: TokenKind::False, .. }) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token { kind: TokenKind::Null, .. }) => Ok(Expr::Literal(Value::Null)),
            Some(Token { kind: TokenKind::Ident(name), .. }) => {
                Ok(Expr::Path { root: name, segments: Vec::new() })
            }
            Some(Token { kind: TokenKind::LParen, .. }) => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            Some(token) => Err(PredicateError::UnexpectedToken {
                found: token.kind.to_string(),
                expected: "expression",
                at: token.at,
            }),
            None => Err(PredicateError::UnexpectedEnd { expected: "expression" }),
        }
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
