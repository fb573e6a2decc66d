//! Type annotation grammar.
//!
//! Produces the `TypeExpr` tree the checker consumes. Union types, arrays,
//! tuples, function types, object types, qualified names with type
//! arguments, and literal types (which the checker widens).

use tsb_common::Diagnostic;
use tsb_scanner::{Literal as TokenLiteral, TokenKind};

use super::Parser;
use crate::ast::*;

impl Parser {
    pub(crate) fn parse_type(&mut self) -> Result<TypeExpr, Diagnostic> {
        let mut parts = vec![self.parse_postfix_type()?];
        while self.matches(TokenKind::Pipe) {
            parts.push(self.parse_postfix_type()?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().expect("one element"))
        } else {
            Ok(TypeExpr::Union(parts))
        }
    }

    /// A non-union type followed by any number of `[]` suffixes.
    fn parse_postfix_type(&mut self) -> Result<TypeExpr, Diagnostic> {
        let mut ty = self.parse_primary_type()?;
        while self.check(TokenKind::LeftBracket)
            && self.peek_at(1).kind == TokenKind::RightBracket
        {
            self.advance();
            self.advance();
            ty = TypeExpr::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn parse_primary_type(&mut self) -> Result<TypeExpr, Diagnostic> {
        let start = self.peek().span;
        match self.peek_kind() {
            // `(params) => ret` or parenthesized type
            TokenKind::LeftParen => {
                if self.type_paren_is_function() {
                    self.advance();
                    let params = self.parse_type_function_params()?;
                    self.consume(TokenKind::Arrow, "expected '=>' in function type")?;
                    let ret = self.parse_type()?;
                    Ok(TypeExpr::Function {
                        params,
                        ret: Box::new(ret),
                    })
                } else {
                    self.advance();
                    let inner = self.parse_type()?;
                    self.consume(TokenKind::RightParen, "expected ')' in type")?;
                    Ok(inner)
                }
            }
            // Tuple type `[A, B, ...C[]]`
            TokenKind::LeftBracket => {
                self.advance();
                let mut elems = Vec::new();
                let mut rest = None;
                while !self.check(TokenKind::RightBracket) {
                    if self.matches(TokenKind::DotDotDot) {
                        rest = Some(Box::new(self.parse_type()?));
                        break;
                    }
                    elems.push(self.parse_type()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RightBracket, "expected ']' in tuple type")?;
                Ok(TypeExpr::Tuple { elems, rest })
            }
            // Object type `{a: T; b?: U}`
            TokenKind::LeftBrace => {
                self.advance();
                let mut members = Vec::new();
                while !self.check(TokenKind::RightBrace) {
                    let readonly = self.check_word("readonly")
                        && self.peek_at(1).kind == TokenKind::Identifier
                        && self.match_word("readonly");
                    let name = self.consume_name("expected member name in object type")?;
                    let optional = self.matches(TokenKind::Question);
                    self.consume(TokenKind::Colon, "expected ':' in object type")?;
                    let ty = self.parse_type()?;
                    members.push(TypeObjectMember {
                        name,
                        ty,
                        optional,
                        readonly,
                    });
                    if !self.matches(TokenKind::Semicolon) && !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RightBrace, "expected '}' in object type")?;
                Ok(TypeExpr::Object(members))
            }
            // Literal types
            TokenKind::String => {
                let v = self.advance().string_value().to_string();
                Ok(TypeExpr::Literal(Lit::Str(v), start))
            }
            TokenKind::Number => {
                let v = self.advance().number();
                Ok(TypeExpr::Literal(Lit::Number(v), start))
            }
            TokenKind::True => {
                self.advance();
                Ok(TypeExpr::Literal(Lit::Bool(true), start))
            }
            TokenKind::False => {
                self.advance();
                Ok(TypeExpr::Literal(Lit::Bool(false), start))
            }
            TokenKind::Null => {
                self.advance();
                Ok(TypeExpr::Named {
                    path: vec!["null".to_string()],
                    args: Vec::new(),
                    span: start,
                })
            }
            TokenKind::Undefined => {
                self.advance();
                Ok(TypeExpr::Named {
                    path: vec!["undefined".to_string()],
                    args: Vec::new(),
                    span: start,
                })
            }
            TokenKind::Void => {
                self.advance();
                Ok(TypeExpr::Named {
                    path: vec!["void".to_string()],
                    args: Vec::new(),
                    span: start,
                })
            }
            TokenKind::Typeof => Err(self.error_here("'typeof' types are not supported")),
            _ => {
                let mut path = vec![self.consume_name("expected type name")?];
                while self.matches(TokenKind::Dot) {
                    path.push(self.consume_name("expected name after '.' in type")?);
                }
                let args = if self.check(TokenKind::Less) {
                    self.parse_type_arguments()?
                } else {
                    Vec::new()
                };
                Ok(TypeExpr::Named {
                    path,
                    args,
                    span: self.span_from(start),
                })
            }
        }
    }

    /// `<T, U>` — cursor on `<`.
    pub(crate) fn parse_type_arguments(&mut self) -> Result<Vec<TypeExpr>, Diagnostic> {
        self.consume(TokenKind::Less, "expected '<'")?;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::Greater, "expected '>' after type arguments")?;
        Ok(args)
    }

    /// Parameters of a function type, after the consumed `(`.
    pub(crate) fn parse_type_function_params(
        &mut self,
    ) -> Result<Vec<TypeFunctionParam>, Diagnostic> {
        let mut params = Vec::new();
        while !self.check(TokenKind::RightParen) {
            let is_rest = self.matches(TokenKind::DotDotDot);
            let name = self.consume_name("expected parameter name in function type")?;
            let optional = self.matches(TokenKind::Question);
            let ty = if self.matches(TokenKind::Colon) {
                self.parse_type()?
            } else {
                TypeExpr::Named {
                    path: vec!["any".to_string()],
                    args: Vec::new(),
                    span: self.previous().span,
                }
            };
            params.push(TypeFunctionParam {
                name,
                ty,
                optional,
                is_rest,
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' in function type")?;
        Ok(params)
    }

    /// Distinguish `(a: T) => U` from a parenthesized type at `(`.
    fn type_paren_is_function(&self) -> bool {
        match self.peek_at(1).kind {
            TokenKind::RightParen => true, // `() => T`
            TokenKind::DotDotDot => true,
            TokenKind::Identifier => matches!(
                self.peek_at(2).kind,
                TokenKind::Colon | TokenKind::Question | TokenKind::Comma | TokenKind::RightParen
            ),
            _ => false,
        }
    }
}
