//! Expression grammar: Pratt precedence climbing over the binary operators,
//! a postfix chain for calls/members/indexing/optional chaining/tagged
//! templates, and the primary forms.

use tsb_common::{Diagnostic, Span};
use tsb_scanner::{Literal as TokenLiteral, TokenKind};

use super::Parser;
use crate::ast::*;

impl Parser {
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_assignment()
    }

    pub(crate) fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        if self.check(TokenKind::Yield) {
            return self.parse_yield();
        }
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let start = self.peek().span;
        let lhs = self.parse_conditional()?;

        let op_kind = self.peek_kind();
        let assignment = matches!(
            op_kind,
            TokenKind::Equal
                | TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::StarStarEqual
                | TokenKind::SlashEqual
                | TokenKind::PercentEqual
                | TokenKind::AmpEqual
                | TokenKind::PipeEqual
                | TokenKind::CaretEqual
                | TokenKind::LessLessEqual
                | TokenKind::GreaterGreaterEqual
                | TokenKind::GreaterGreaterGreaterEqual
                | TokenKind::AmpAmpEqual
                | TokenKind::PipePipeEqual
                | TokenKind::QuestionQuestionEqual
        );
        if !assignment {
            return Ok(lhs);
        }
        self.advance();
        let value = Box::new(self.parse_assignment()?);
        let span = self.span_from(start);

        if op_kind == TokenKind::Equal {
            return match lhs.kind {
                ExprKind::Variable { name } => {
                    Ok(self.make_expr(ExprKind::Assign { name, value }, span))
                }
                ExprKind::Get {
                    object,
                    name,
                    optional: false,
                } => Ok(self.make_expr(ExprKind::Set { object, name, value }, span)),
                ExprKind::GetIndex {
                    object,
                    index,
                    optional: false,
                } => Ok(self.make_expr(ExprKind::SetIndex { object, index, value }, span)),
                ExprKind::GetPrivate { object, name } => {
                    Ok(self.make_expr(ExprKind::SetPrivate { object, name, value }, span))
                }
                _ => Err(Diagnostic::parse("invalid assignment target", lhs.span)),
            };
        }

        if let Some(op) = logical_assign_op(op_kind) {
            return match lhs.kind {
                ExprKind::Variable { name } => {
                    Ok(self.make_expr(ExprKind::LogicalAssign { name, op, value }, span))
                }
                ExprKind::Get {
                    object,
                    name,
                    optional: false,
                } => Ok(self.make_expr(
                    ExprKind::LogicalSet {
                        object,
                        name,
                        op,
                        value,
                    },
                    span,
                )),
                ExprKind::GetIndex {
                    object,
                    index,
                    optional: false,
                } => Ok(self.make_expr(
                    ExprKind::LogicalSetIndex {
                        object,
                        index,
                        op,
                        value,
                    },
                    span,
                )),
                _ => Err(Diagnostic::parse("invalid assignment target", lhs.span)),
            };
        }

        let op = compound_assign_op(op_kind)
            .expect("assignment token must map to a compound operator");
        match lhs.kind {
            ExprKind::Variable { name } => {
                Ok(self.make_expr(ExprKind::CompoundAssign { name, op, value }, span))
            }
            ExprKind::Get {
                object,
                name,
                optional: false,
            } => Ok(self.make_expr(
                ExprKind::CompoundSet {
                    object,
                    name,
                    op,
                    value,
                },
                span,
            )),
            ExprKind::GetIndex {
                object,
                index,
                optional: false,
            } => Ok(self.make_expr(
                ExprKind::CompoundSetIndex {
                    object,
                    index,
                    op,
                    value,
                },
                span,
            )),
            _ => Err(Diagnostic::parse("invalid assignment target", lhs.span)),
        }
    }

    fn parse_yield(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().span;
        if self.matches(TokenKind::Star) {
            let expr = Box::new(self.parse_assignment()?);
            let span = self.span_from(start);
            return Ok(self.make_expr(ExprKind::YieldStar { expr }, span));
        }
        let has_operand = self.same_line()
            && !matches!(
                self.peek_kind(),
                TokenKind::Semicolon
                    | TokenKind::RightParen
                    | TokenKind::RightBracket
                    | TokenKind::RightBrace
                    | TokenKind::Comma
                    | TokenKind::Colon
                    | TokenKind::Eof
            );
        let expr = if has_operand {
            Some(Box::new(self.parse_assignment()?))
        } else {
            None
        };
        let span = self.span_from(start);
        Ok(self.make_expr(ExprKind::Yield { expr }, span))
    }

    // ---- arrow functions ----

    /// Detect and parse an arrow function at the current position, without
    /// committing when the tokens turn out to be something else.
    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, Diagnostic> {
        let start = self.peek().span;

        // `x => …`
        if self.check(TokenKind::Identifier)
            && !self.check_word("async")
            && self.peek_at(1).kind == TokenKind::Arrow
        {
            let name = self.advance().lexeme.clone();
            return Ok(Some(self.finish_arrow_single(name, false, start)?));
        }
        // `async x => …`
        if self.check_word("async")
            && self.peek_at(1).kind == TokenKind::Identifier
            && self.peek_at(2).kind == TokenKind::Arrow
        {
            self.advance();
            let name = self.advance().lexeme.clone();
            return Ok(Some(self.finish_arrow_single(name, true, start)?));
        }
        // `(params) => …` / `async (params) => …`
        let (paren_offset, is_async) = if self.check(TokenKind::LeftParen) {
            (0, false)
        } else if self.check_word("async") && self.peek_at(1).kind == TokenKind::LeftParen {
            (1, true)
        } else {
            return Ok(None);
        };
        let Some(after) = self.offset_after_matching_paren(paren_offset) else {
            return Ok(None);
        };
        let next = self.peek_at(after).kind;
        if next != TokenKind::Arrow && next != TokenKind::Colon {
            return Ok(None);
        }
        // Speculative: a `:` after `)` may be a return type or a ternary arm.
        let save = self.pos;
        let result = self.parse_arrow_parenthesized(is_async, start);
        match result {
            Ok(expr) => Ok(Some(expr)),
            Err(_) if next == TokenKind::Colon => {
                self.pos = save;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn parse_arrow_parenthesized(
        &mut self,
        is_async: bool,
        start: Span,
    ) -> Result<Expr, Diagnostic> {
        if is_async {
            self.advance(); // `async`
        }
        self.consume(TokenKind::LeftParen, "expected '('")?;
        let params = self.parse_parameters()?;
        let return_type = if self.matches(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.consume(TokenKind::Arrow, "expected '=>'")?;
        let func = self.parse_arrow_body(params, return_type, is_async, start)?;
        let span = func.span;
        Ok(self.make_expr(
            ExprKind::ArrowFunction {
                func: Box::new(func),
            },
            span,
        ))
    }

    fn finish_arrow_single(
        &mut self,
        name: String,
        is_async: bool,
        start: Span,
    ) -> Result<Expr, Diagnostic> {
        let param = Parameter {
            pattern: Pattern::Identifier {
                name,
                span: self.previous().span,
            },
            type_ann: None,
            default: None,
            is_rest: false,
            optional: false,
        };
        self.consume(TokenKind::Arrow, "expected '=>'")?;
        let func = self.parse_arrow_body(vec![param], None, is_async, start)?;
        let span = func.span;
        Ok(self.make_expr(
            ExprKind::ArrowFunction {
                func: Box::new(func),
            },
            span,
        ))
    }

    fn parse_arrow_body(
        &mut self,
        params: Vec<Parameter>,
        return_type: Option<TypeExpr>,
        is_async: bool,
        start: Span,
    ) -> Result<FunctionLit, Diagnostic> {
        let body = if self.check(TokenKind::LeftBrace) {
            self.parse_block()?
        } else {
            let expr = self.parse_assignment()?;
            vec![Stmt {
                span: expr.span,
                kind: StmtKind::Return(Some(expr)),
            }]
        };
        let mut flags = FnFlags::ARROW;
        if is_async {
            flags |= FnFlags::ASYNC;
        }
        Ok(FunctionLit {
            name: None,
            type_params: Vec::new(),
            params,
            return_type,
            body,
            flags,
            span: self.span_from(start),
            machine: None,
        })
    }

    /// Token offset just past the `)` matching the `(` at `self.pos + open_offset`.
    fn offset_after_matching_paren(&self, open_offset: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = open_offset;
        loop {
            let kind = self.peek_at(i).kind;
            match kind {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
            i += 1;
        }
    }

    // ---- binary operators ----

    fn parse_conditional(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        let cond = self.parse_binary(0)?;
        if !self.matches(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_assignment()?;
        self.consume(TokenKind::Colon, "expected ':' in conditional expression")?;
        let otherwise = self.parse_assignment()?;
        let span = self.span_from(start);
        Ok(self.make_expr(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span,
        ))
    }

    /// Precedence-climbing over binary and logical operators.
    fn parse_binary(&mut self, min_level: u8) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        let mut lhs = self.parse_unary()?;
        loop {
            let Some((level, right_assoc)) = binary_level(self.peek_kind()) else {
                break;
            };
            if level < min_level {
                break;
            }
            let op_kind = self.advance().kind;
            let next_min = if right_assoc { level } else { level + 1 };
            let rhs = self.parse_binary(next_min)?;
            let span = self.span_from(start);
            lhs = if let Some(op) = logical_op(op_kind) {
                self.make_expr(
                    ExprKind::Logical {
                        op,
                        left: Box::new(lhs),
                        right: Box::new(rhs),
                    },
                    span,
                )
            } else {
                let op = binary_op(op_kind).expect("operator token");
                self.make_expr(
                    ExprKind::Binary {
                        op,
                        left: Box::new(lhs),
                        right: Box::new(rhs),
                    },
                    span,
                )
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        let op = match self.peek_kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = Box::new(self.parse_unary()?);
            let span = self.span_from(start);
            return Ok(self.make_expr(ExprKind::Unary { op, operand }, span));
        }
        if self.check(TokenKind::Await) {
            self.advance();
            let expr = Box::new(self.parse_unary()?);
            let span = self.span_from(start);
            return Ok(self.make_expr(ExprKind::Await { expr }, span));
        }
        if self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus) {
            let negative = self.advance().kind == TokenKind::MinusMinus;
            let target = self.parse_unary()?;
            check_increment_target(&target)?;
            let span = self.span_from(start);
            return Ok(self.make_expr(
                ExprKind::PrefixIncrement {
                    target: Box::new(target),
                    negative,
                },
                span,
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        let mut expr = self.parse_postfix_chain()?;
        if (self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus)) && self.same_line()
        {
            let negative = self.advance().kind == TokenKind::MinusMinus;
            check_increment_target(&expr)?;
            let span = self.span_from(start);
            expr = self.make_expr(
                ExprKind::PostfixIncrement {
                    target: Box::new(expr),
                    negative,
                },
                span,
            );
        }
        Ok(expr)
    }

    /// Primary expression followed by calls, member accesses, index
    /// accesses, optional chains, non-null assertions, `as` casts, and
    /// tagged templates.
    pub(crate) fn parse_postfix_chain(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LeftParen => {
                    self.advance();
                    let args = self.parse_arguments()?;
                    let span = self.span_from(start);
                    expr = self.finish_call(expr, args, false, span);
                }
                TokenKind::Dot => {
                    self.advance();
                    if self.check(TokenKind::PrivateIdentifier) {
                        let name = self.advance().lexeme.trim_start_matches('#').to_string();
                        let span = self.span_from(start);
                        expr = self.make_expr(
                            ExprKind::GetPrivate {
                                object: Box::new(expr),
                                name,
                            },
                            span,
                        );
                    } else {
                        let name = self.consume_name("expected property name after '.'")?;
                        let span = self.span_from(start);
                        expr = self.make_expr(
                            ExprKind::Get {
                                object: Box::new(expr),
                                name,
                                optional: false,
                            },
                            span,
                        );
                    }
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    match self.peek_kind() {
                        TokenKind::LeftParen => {
                            self.advance();
                            let args = self.parse_arguments()?;
                            let span = self.span_from(start);
                            expr = self.finish_call(expr, args, true, span);
                        }
                        TokenKind::LeftBracket => {
                            self.advance();
                            let index = self.parse_expression()?;
                            self.consume(TokenKind::RightBracket, "expected ']'")?;
                            let span = self.span_from(start);
                            expr = self.make_expr(
                                ExprKind::GetIndex {
                                    object: Box::new(expr),
                                    index: Box::new(index),
                                    optional: true,
                                },
                                span,
                            );
                        }
                        _ => {
                            let name = self.consume_name("expected property name after '?.'")?;
                            let span = self.span_from(start);
                            expr = self.make_expr(
                                ExprKind::Get {
                                    object: Box::new(expr),
                                    name,
                                    optional: true,
                                },
                                span,
                            );
                        }
                    }
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.consume(TokenKind::RightBracket, "expected ']'")?;
                    let span = self.span_from(start);
                    expr = self.make_expr(
                        ExprKind::GetIndex {
                            object: Box::new(expr),
                            index: Box::new(index),
                            optional: false,
                        },
                        span,
                    );
                }
                TokenKind::TemplateFull | TokenKind::TemplateHead => {
                    let (quasis, exprs) = self.parse_template_pieces()?;
                    let span = self.span_from(start);
                    expr = self.make_expr(
                        ExprKind::TaggedTemplate {
                            tag: Box::new(expr),
                            quasis,
                            exprs,
                        },
                        span,
                    );
                }
                TokenKind::Bang if self.same_line() => {
                    // TS non-null assertion: no runtime effect.
                    self.advance();
                }
                TokenKind::Identifier if self.check_word("as") => {
                    self.advance();
                    let _ = self.parse_type()?; // cast, checked not kept
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr, args: Vec<Expr>, optional: bool, span: Span) -> Expr {
        if let ExprKind::GetPrivate { object, name } = callee.kind {
            return self.make_expr(ExprKind::CallPrivate { object, name, args }, span);
        }
        self.make_expr(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
                optional,
            },
            span,
        )
    }

    /// Arguments after a consumed `(`.
    pub(crate) fn parse_arguments(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut args = Vec::new();
        while !self.check(TokenKind::RightParen) {
            if self.matches(TokenKind::DotDotDot) {
                let start = self.previous().span;
                let inner = self.parse_assignment()?;
                let span = self.span_from(start);
                args.push(self.make_expr(
                    ExprKind::Spread {
                        expr: Box::new(inner),
                    },
                    span,
                ));
            } else {
                args.push(self.parse_assignment()?);
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after arguments")?;
        Ok(args)
    }

    // ---- primaries ----

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        match self.peek_kind() {
            TokenKind::Number => {
                let n = self.advance().number();
                Ok(self.make_expr(ExprKind::Literal(Lit::Number(n)), start))
            }
            TokenKind::BigInt => {
                let v = match &self.advance().literal {
                    Some(TokenLiteral::BigInt(v)) => *v,
                    _ => 0,
                };
                Ok(self.make_expr(ExprKind::Literal(Lit::BigInt(v)), start))
            }
            TokenKind::String => {
                let s = self.advance().string_value().to_string();
                Ok(self.make_expr(ExprKind::Literal(Lit::Str(s)), start))
            }
            TokenKind::Regex => {
                let (pattern, flags) = match &self.advance().literal {
                    Some(TokenLiteral::Regex { pattern, flags }) => {
                        (pattern.clone(), flags.clone())
                    }
                    _ => (String::new(), String::new()),
                };
                Ok(self.make_expr(ExprKind::Literal(Lit::Regex { pattern, flags }), start))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.make_expr(ExprKind::Literal(Lit::Bool(true)), start))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.make_expr(ExprKind::Literal(Lit::Bool(false)), start))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.make_expr(ExprKind::Literal(Lit::Null), start))
            }
            TokenKind::Undefined => {
                self.advance();
                Ok(self.make_expr(ExprKind::Literal(Lit::Undefined), start))
            }
            TokenKind::This => {
                self.advance();
                Ok(self.make_expr(ExprKind::This, start))
            }
            TokenKind::Super => {
                self.advance();
                Ok(self.make_expr(ExprKind::Super, start))
            }
            TokenKind::TemplateFull | TokenKind::TemplateHead => {
                let (quasis, exprs) = self.parse_template_pieces()?;
                let span = self.span_from(start);
                Ok(self.make_expr(ExprKind::TemplateLiteral { quasis, exprs }, span))
            }
            TokenKind::Identifier => {
                if self.check_word("async") && self.peek_at(1).kind == TokenKind::Function {
                    self.advance();
                    return self.parse_function_expr(true);
                }
                let name = self.advance().lexeme.clone();
                Ok(self.make_expr(ExprKind::Variable { name }, start))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(TokenKind::RightParen, "expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => self.parse_array_literal(),
            TokenKind::LeftBrace => self.parse_object_literal(),
            TokenKind::Function => self.parse_function_expr(false),
            TokenKind::Class => {
                let decl = self.parse_class_body(Vec::new())?;
                let span = decl.span;
                Ok(self.make_expr(
                    ExprKind::ClassExpr {
                        decl: Box::new(decl),
                    },
                    span,
                ))
            }
            TokenKind::New => self.parse_new(),
            TokenKind::Import => {
                self.advance();
                if self.matches(TokenKind::Dot) {
                    let word = self.consume_identifier("expected 'meta' after 'import.'")?;
                    if word != "meta" {
                        return Err(Diagnostic::parse(
                            "only 'import.meta' is supported",
                            self.previous().span,
                        ));
                    }
                    let span = self.span_from(start);
                    return Ok(self.make_expr(ExprKind::ImportMeta, span));
                }
                self.consume(TokenKind::LeftParen, "expected '(' after 'import'")?;
                let arg = self.parse_assignment()?;
                self.consume(TokenKind::RightParen, "expected ')'")?;
                let span = self.span_from(start);
                Ok(self.make_expr(
                    ExprKind::DynamicImport {
                        arg: Box::new(arg),
                    },
                    span,
                ))
            }
            _ => Err(self.error_here("expected expression")),
        }
    }

    fn parse_function_expr(&mut self, is_async: bool) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        self.consume(TokenKind::Function, "expected 'function'")?;
        let is_generator = self.matches(TokenKind::Star);
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance().lexeme.clone())
        } else {
            None
        };
        let func = self.parse_function_rest(name, is_async, is_generator, false)?;
        let span = self.span_from(start);
        Ok(self.make_expr(
            ExprKind::FunctionExpr {
                func: Box::new(func),
            },
            span,
        ))
    }

    fn parse_array_literal(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        self.consume(TokenKind::LeftBracket, "expected '['")?;
        let mut elements = Vec::new();
        while !self.check(TokenKind::RightBracket) {
            if self.check(TokenKind::Comma) {
                // Elision hole reads back as undefined.
                let span = self.peek().span;
                elements.push(self.make_expr(ExprKind::Literal(Lit::Undefined), span));
                self.advance();
                continue;
            }
            if self.matches(TokenKind::DotDotDot) {
                let s = self.previous().span;
                let inner = self.parse_assignment()?;
                let span = s.merge(inner.span);
                elements.push(self.make_expr(
                    ExprKind::Spread {
                        expr: Box::new(inner),
                    },
                    span,
                ));
            } else {
                elements.push(self.parse_assignment()?);
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightBracket, "expected ']' after array literal")?;
        let span = self.span_from(start);
        Ok(self.make_expr(ExprKind::ArrayLiteral { elements }, span))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        self.consume(TokenKind::LeftBrace, "expected '{'")?;
        let mut props = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            if self.matches(TokenKind::DotDotDot) {
                let inner = self.parse_assignment()?;
                props.push(ObjectProperty::Spread(inner));
            } else {
                let is_async_method = self.check_word("async")
                    && !matches!(
                        self.peek_at(1).kind,
                        TokenKind::Colon
                            | TokenKind::Comma
                            | TokenKind::RightBrace
                            | TokenKind::LeftParen
                    );
                if is_async_method {
                    self.advance();
                }
                let is_generator = self.matches(TokenKind::Star);
                let (key, is_private) = self.parse_property_key()?;
                if is_private {
                    return Err(Diagnostic::parse(
                        "private names are not allowed in object literals",
                        self.previous().span,
                    ));
                }
                if self.check(TokenKind::LeftParen) || self.check(TokenKind::Less) {
                    // Method shorthand
                    let name = key.static_name();
                    let func =
                        self.parse_function_rest(name, is_async_method, is_generator, false)?;
                    let span = func.span;
                    let value = self.make_expr(
                        ExprKind::FunctionExpr {
                            func: Box::new(func),
                        },
                        span,
                    );
                    props.push(ObjectProperty::KeyValue { key, value });
                } else if self.matches(TokenKind::Colon) {
                    let value = self.parse_assignment()?;
                    props.push(ObjectProperty::KeyValue { key, value });
                } else {
                    // Shorthand `{name}`
                    let name = match &key {
                        PropertyKey::Identifier(n) => n.clone(),
                        _ => {
                            return Err(self.error_here("expected ':' after property key"));
                        }
                    };
                    let span = self.previous().span;
                    let value = self.make_expr(ExprKind::Variable { name }, span);
                    props.push(ObjectProperty::KeyValue { key, value });
                }
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "expected '}' after object literal")?;
        let span = self.span_from(start);
        Ok(self.make_expr(ExprKind::ObjectLiteral { props }, span))
    }

    fn parse_new(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().span; // `new`
        if self.matches(TokenKind::Dot) {
            let word = self.consume_identifier("expected 'target' after 'new.'")?;
            if word != "target" {
                return Err(Diagnostic::parse(
                    "only 'new.target' is supported",
                    self.previous().span,
                ));
            }
            let span = self.span_from(start);
            return Ok(self.make_expr(ExprKind::NewTarget, span));
        }

        // Member chain without calls: `new a.b.C(...)`
        let mut callee = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::Dot) {
                let name = self.consume_name("expected property name after '.'")?;
                let span = self.span_from(start);
                callee = self.make_expr(
                    ExprKind::Get {
                        object: Box::new(callee),
                        name,
                        optional: false,
                    },
                    span,
                );
            } else if self.check(TokenKind::LeftBracket) {
                self.advance();
                let index = self.parse_expression()?;
                self.consume(TokenKind::RightBracket, "expected ']'")?;
                let span = self.span_from(start);
                callee = self.make_expr(
                    ExprKind::GetIndex {
                        object: Box::new(callee),
                        index: Box::new(index),
                        optional: false,
                    },
                    span,
                );
            } else {
                break;
            }
        }

        // Speculative generic instantiation: `new Box<number>(…)`
        let mut type_args = Vec::new();
        if self.check(TokenKind::Less) {
            let save = self.pos;
            match self.parse_type_arguments() {
                Ok(args) if self.check(TokenKind::LeftParen) => type_args = args,
                _ => self.pos = save,
            }
        }

        let args = if self.matches(TokenKind::LeftParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        let span = self.span_from(start);
        Ok(self.make_expr(
            ExprKind::New {
                callee: Box::new(callee),
                type_args,
                args,
            },
            span,
        ))
    }

    /// Template literal pieces; the scanner interleaves hole expressions
    /// between head/middle/tail tokens.
    fn parse_template_pieces(
        &mut self,
    ) -> Result<(Vec<TemplatePiece>, Vec<Expr>), Diagnostic> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let first = self.advance();
        let first_kind = first.kind;
        quasis.push(template_piece(first));
        if first_kind == TokenKind::TemplateFull {
            return Ok((quasis, exprs));
        }
        loop {
            exprs.push(self.parse_expression()?);
            match self.peek_kind() {
                TokenKind::TemplateMiddle => {
                    quasis.push(template_piece(self.advance()));
                }
                TokenKind::TemplateTail => {
                    quasis.push(template_piece(self.advance()));
                    return Ok((quasis, exprs));
                }
                _ => return Err(self.error_here("expected '}' to continue template literal")),
            }
        }
    }
}

fn template_piece(token: &tsb_scanner::Token) -> TemplatePiece {
    match &token.literal {
        Some(TokenLiteral::Template { cooked, raw }) => TemplatePiece {
            cooked: cooked.clone(),
            raw: raw.clone(),
        },
        _ => TemplatePiece {
            cooked: String::new(),
            raw: String::new(),
        },
    }
}

fn check_increment_target(expr: &Expr) -> Result<(), Diagnostic> {
    match &expr.kind {
        ExprKind::Variable { .. }
        | ExprKind::Get { optional: false, .. }
        | ExprKind::GetIndex { optional: false, .. }
        | ExprKind::GetPrivate { .. } => Ok(()),
        _ => Err(Diagnostic::parse(
            "invalid increment/decrement target",
            expr.span,
        )),
    }
}

/// Precedence level and associativity per binary operator token.
fn binary_level(kind: TokenKind) -> Option<(u8, bool)> {
    Some(match kind {
        TokenKind::QuestionQuestion => (1, false),
        TokenKind::PipePipe => (2, false),
        TokenKind::AmpAmp => (3, false),
        TokenKind::Pipe => (4, false),
        TokenKind::Caret => (5, false),
        TokenKind::Amp => (6, false),
        TokenKind::EqualEqual
        | TokenKind::NotEqual
        | TokenKind::EqualEqualEqual
        | TokenKind::NotEqualEqual => (7, false),
        TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::In
        | TokenKind::Instanceof => (8, false),
        TokenKind::LessLess | TokenKind::GreaterGreater | TokenKind::GreaterGreaterGreater => {
            (9, false)
        }
        TokenKind::Plus | TokenKind::Minus => (10, false),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (11, false),
        TokenKind::StarStar => (12, true),
        _ => return None,
    })
}

fn logical_op(kind: TokenKind) -> Option<LogicalOp> {
    Some(match kind {
        TokenKind::AmpAmp => LogicalOp::And,
        TokenKind::PipePipe => LogicalOp::Or,
        TokenKind::QuestionQuestion => LogicalOp::Nullish,
        _ => return None,
    })
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::StarStar => BinaryOp::Pow,
        TokenKind::Amp => BinaryOp::BitAnd,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::LessLess => BinaryOp::Shl,
        TokenKind::GreaterGreater => BinaryOp::Shr,
        TokenKind::GreaterGreaterGreater => BinaryOp::UShr,
        TokenKind::EqualEqual => BinaryOp::EqEq,
        TokenKind::NotEqual => BinaryOp::NotEq,
        TokenKind::EqualEqualEqual => BinaryOp::StrictEq,
        TokenKind::NotEqualEqual => BinaryOp::StrictNotEq,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::LessEqual => BinaryOp::LessEq,
        TokenKind::Greater => BinaryOp::Greater,
        TokenKind::GreaterEqual => BinaryOp::GreaterEq,
        TokenKind::In => BinaryOp::In,
        TokenKind::Instanceof => BinaryOp::Instanceof,
        _ => return None,
    })
}

fn compound_assign_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::PlusEqual => BinaryOp::Add,
        TokenKind::MinusEqual => BinaryOp::Sub,
        TokenKind::StarEqual => BinaryOp::Mul,
        TokenKind::StarStarEqual => BinaryOp::Pow,
        TokenKind::SlashEqual => BinaryOp::Div,
        TokenKind::PercentEqual => BinaryOp::Mod,
        TokenKind::AmpEqual => BinaryOp::BitAnd,
        TokenKind::PipeEqual => BinaryOp::BitOr,
        TokenKind::CaretEqual => BinaryOp::BitXor,
        TokenKind::LessLessEqual => BinaryOp::Shl,
        TokenKind::GreaterGreaterEqual => BinaryOp::Shr,
        TokenKind::GreaterGreaterGreaterEqual => BinaryOp::UShr,
        _ => return None,
    })
}

fn logical_assign_op(kind: TokenKind) -> Option<LogicalOp> {
    Some(match kind {
        TokenKind::AmpAmpEqual => LogicalOp::And,
        TokenKind::PipePipeEqual => LogicalOp::Or,
        TokenKind::QuestionQuestionEqual => LogicalOp::Nullish,
        _ => return None,
    })
}
