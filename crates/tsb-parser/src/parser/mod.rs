//! Recursive-descent parser.
//!
//! `mod.rs` holds the token cursor, shared helpers, and statement parsing;
//! `decl.rs` the declaration grammar (classes, enums, interfaces, modules);
//! `expr.rs` the Pratt expression grammar; `types.rs` type annotations.

mod decl;
mod expr;
mod types;

use tsb_common::{Diagnostic, Span};
use tsb_scanner::{Token, TokenKind};

use crate::ast::*;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: NodeId,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_first_id(tokens, 0)
    }

    pub fn with_first_id(tokens: Vec<Token>, first_id: NodeId) -> Self {
        Parser {
            tokens,
            pos: 0,
            next_id: first_id,
        }
    }

    /// The next unassigned node id (for multi-module compilations).
    pub fn next_id(&self) -> NodeId {
        self.next_id
    }

    /// Parse a whole module to EOF.
    pub fn parse_module(mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.parse_module_body()
    }

    pub fn parse_module_body(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut stmts = Vec::new();
        while !self.at_end() {
            stmts.push(self.parse_declaration()?);
        }
        Ok(stmts)
    }

    // ---- cursor helpers ----

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    pub(crate) fn at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// Is the current token the contextual keyword `word`?
    pub(crate) fn check_word(&self, word: &str) -> bool {
        self.peek_kind() == TokenKind::Identifier && self.peek().lexeme == word
    }

    pub(crate) fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn match_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, msg: &str) -> Result<&Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(msg))
        }
    }

    /// An identifier-like token usable as a name: identifiers, contextual
    /// keywords, and (after a dot or as a member name) reserved words.
    pub(crate) fn consume_name(&mut self, msg: &str) -> Result<String, Diagnostic> {
        let tok = self.peek();
        let ok = tok.kind == TokenKind::Identifier
            || TokenKind::keyword(&tok.lexeme).is_some() && tok.lexeme.chars().all(|c| c.is_ascii_alphabetic());
        if ok {
            let name = tok.lexeme.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_here(msg))
        }
    }

    pub(crate) fn consume_identifier(&mut self, msg: &str) -> Result<String, Diagnostic> {
        let tok = self.consume(TokenKind::Identifier, msg)?;
        Ok(tok.lexeme.clone())
    }

    pub(crate) fn error_here(&self, msg: &str) -> Diagnostic {
        let tok = self.peek();
        let found = if tok.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", tok.lexeme)
        };
        Diagnostic::parse(format!("{msg}, found {found}"), tok.span)
    }

    pub(crate) fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous().span)
    }

    pub(crate) fn make_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        let id = self.next_id;
        self.next_id += 1;
        Expr { id, span, kind }
    }

    /// Automatic semicolon insertion, restricted: an explicit `;`, a `}` or
    /// EOF ahead, or a line break before the next token all terminate a
    /// statement.
    pub(crate) fn consume_semicolon(&mut self) -> Result<(), Diagnostic> {
        if self.matches(TokenKind::Semicolon) {
            return Ok(());
        }
        if self.check(TokenKind::RightBrace) || self.at_end() {
            return Ok(());
        }
        if self.peek().line > self.previous().line {
            return Ok(());
        }
        Err(self.error_here("expected ';'"))
    }

    /// True when the next token is on the same line as the previous one.
    pub(crate) fn same_line(&self) -> bool {
        self.peek().line == self.previous().line
    }

    // ---- statements ----

    pub(crate) fn parse_declaration(&mut self) -> Result<Stmt, Diagnostic> {
        match self.peek_kind() {
            TokenKind::Import => {
                // `import(` and `import.meta` are expressions.
                match self.peek_at(1).kind {
                    TokenKind::LeftParen | TokenKind::Dot => self.parse_expression_statement(),
                    _ => self.parse_import(),
                }
            }
            TokenKind::Export => self.parse_export(),
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                if self.peek_kind() == TokenKind::Const && self.peek_at(1).kind == TokenKind::Enum {
                    self.advance();
                    return self.parse_enum();
                }
                self.parse_var_statement()
            }
            TokenKind::Function => self.parse_function_declaration(false),
            TokenKind::Class => self.parse_class_declaration(Vec::new()),
            TokenKind::At => {
                let decorators = self.parse_decorators()?;
                if self.check(TokenKind::Class) {
                    self.parse_class_declaration(decorators)
                } else {
                    Err(self.error_here("decorators are only supported on classes"))
                }
            }
            TokenKind::Enum => self.parse_enum(),
            TokenKind::Interface => self.parse_interface(),
            TokenKind::Identifier => {
                if self.check_word("async") && self.peek_at(1).kind == TokenKind::Function {
                    self.advance();
                    return self.parse_function_declaration(true);
                }
                if self.check_word("type")
                    && self.peek_at(1).kind == TokenKind::Identifier
                    && matches!(self.peek_at(2).kind, TokenKind::Equal | TokenKind::Less)
                {
                    return self.parse_type_alias();
                }
                if (self.check_word("namespace") || self.check_word("module"))
                    && self.peek_at(1).kind == TokenKind::Identifier
                {
                    return self.parse_namespace();
                }
                if self.check_word("using") && self.peek_at(1).kind == TokenKind::Identifier {
                    return self.parse_using(false);
                }
                self.parse_statement()
            }
            TokenKind::Await => {
                if self.peek_at(1).kind == TokenKind::Identifier
                    && self.peek_at(1).lexeme == "using"
                    && self.peek_at(2).kind == TokenKind::Identifier
                {
                    self.advance();
                    return self.parse_using(true);
                }
                self.parse_statement()
            }
            _ => self.parse_statement(),
        }
    }

    pub(crate) fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        match self.peek_kind() {
            TokenKind::LeftBrace => {
                let start = self.peek().span;
                let body = self.parse_block()?;
                Ok(Stmt {
                    span: self.span_from(start),
                    kind: StmtKind::Block(body),
                })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Throw => self.parse_throw(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                let span = self.advance().span;
                self.consume_semicolon()?;
                Ok(Stmt {
                    span,
                    kind: StmtKind::Break,
                })
            }
            TokenKind::Continue => {
                let span = self.advance().span;
                self.consume_semicolon()?;
                Ok(Stmt {
                    span,
                    kind: StmtKind::Continue,
                })
            }
            TokenKind::Semicolon => {
                let span = self.advance().span;
                Ok(Stmt {
                    span,
                    kind: StmtKind::Block(Vec::new()),
                })
            }
            TokenKind::Identifier if self.check_word("switch") => {
                Err(self.error_here("'switch' is not part of the accepted subset; use if/else"))
            }
            _ => self.parse_expression_statement(),
        }
    }

    pub(crate) fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.consume(TokenKind::LeftBrace, "expected '{'")?;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.at_end() {
            stmts.push(self.parse_declaration()?);
        }
        self.consume(TokenKind::RightBrace, "expected '}'")?;
        Ok(stmts)
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression()?;
        let span = expr.span;
        self.consume_semicolon()?;
        Ok(Stmt {
            span,
            kind: StmtKind::Expression(expr),
        })
    }

    fn parse_var_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        let kind = match self.advance().kind {
            TokenKind::Var => VarKind::Var,
            TokenKind::Let => VarKind::Let,
            TokenKind::Const => VarKind::Const,
            _ => unreachable!("caller checked"),
        };
        let decls = self.parse_var_declarators(kind)?;
        self.consume_semicolon()?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Var { kind, decls },
        })
    }

    fn parse_using(&mut self, is_await: bool) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        self.advance(); // `using`
        let kind = if is_await {
            VarKind::AwaitUsing
        } else {
            VarKind::Using
        };
        let decls = self.parse_var_declarators(kind)?;
        self.consume_semicolon()?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Var { kind, decls },
        })
    }

    pub(crate) fn parse_var_declarators(
        &mut self,
        kind: VarKind,
    ) -> Result<Vec<VarDecl>, Diagnostic> {
        let mut decls = Vec::new();
        loop {
            let start = self.peek().span;
            let pattern = self.parse_binding_pattern()?;
            let type_ann = if self.matches(TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let init = if self.matches(TokenKind::Equal) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            if init.is_none() {
                if matches!(kind, VarKind::Const | VarKind::Using | VarKind::AwaitUsing) {
                    return Err(Diagnostic::parse(
                        "missing initializer in const declaration",
                        self.span_from(start),
                    ));
                }
                if !matches!(pattern, Pattern::Identifier { .. }) {
                    return Err(Diagnostic::parse(
                        "destructuring declaration requires an initializer",
                        self.span_from(start),
                    ));
                }
            }
            decls.push(VarDecl {
                pattern,
                type_ann,
                init,
                span: self.span_from(start),
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(decls)
    }

    /// A binding pattern: identifier, array pattern, or object pattern.
    pub(crate) fn parse_binding_pattern(&mut self) -> Result<Pattern, Diagnostic> {
        let start = self.peek().span;
        match self.peek_kind() {
            TokenKind::Identifier => {
                let name = self.advance().lexeme.clone();
                Ok(Pattern::Identifier { name, span: start })
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                let mut rest = None;
                while !self.check(TokenKind::RightBracket) {
                    if self.matches(TokenKind::Comma) {
                        elements.push(None); // hole
                        continue;
                    }
                    if self.matches(TokenKind::DotDotDot) {
                        rest = Some(Box::new(self.parse_binding_pattern()?));
                        break;
                    }
                    let mut pat = self.parse_binding_pattern()?;
                    if self.matches(TokenKind::Equal) {
                        let default = self.parse_assignment()?;
                        let span = pat.span().merge(default.span);
                        pat = Pattern::Default {
                            inner: Box::new(pat),
                            default: Box::new(default),
                            span,
                        };
                    }
                    elements.push(Some(pat));
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RightBracket, "expected ']' in array pattern")?;
                Ok(Pattern::Array {
                    elements,
                    rest,
                    span: self.span_from(start),
                })
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut props = Vec::new();
                let mut rest = None;
                while !self.check(TokenKind::RightBrace) {
                    if self.matches(TokenKind::DotDotDot) {
                        rest = Some(self.consume_identifier("expected rest binding name")?);
                        break;
                    }
                    let key = self.consume_name("expected property name in object pattern")?;
                    let mut value = if self.matches(TokenKind::Colon) {
                        self.parse_binding_pattern()?
                    } else {
                        Pattern::Identifier {
                            name: key.clone(),
                            span: self.previous().span,
                        }
                    };
                    if self.matches(TokenKind::Equal) {
                        let default = self.parse_assignment()?;
                        let span = value.span().merge(default.span);
                        value = Pattern::Default {
                            inner: Box::new(value),
                            default: Box::new(default),
                            span,
                        };
                    }
                    props.push(ObjectPatternProp { key, value });
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RightBrace, "expected '}' in object pattern")?;
                Ok(Pattern::Object {
                    props,
                    rest,
                    span: self.span_from(start),
                })
            }
            _ => Err(self.error_here("expected binding name or pattern")),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        self.consume(TokenKind::LeftParen, "expected '(' after 'if'")?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after condition")?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.matches(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::If {
                cond,
                then,
                otherwise,
            },
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        self.consume(TokenKind::LeftParen, "expected '(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after condition")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::While { cond, body },
        })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let body = Box::new(self.parse_statement()?);
        self.consume(TokenKind::While, "expected 'while' after do body")?;
        self.consume(TokenKind::LeftParen, "expected '(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after condition")?;
        self.consume_semicolon()?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::DoWhile { body, cond },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let is_await = self.matches(TokenKind::Await);
        self.consume(TokenKind::LeftParen, "expected '(' after 'for'")?;

        // for-of / for-in with a declaration keyword
        let decl_kind = match self.peek_kind() {
            TokenKind::Var => Some(VarKind::Var),
            TokenKind::Let => Some(VarKind::Let),
            TokenKind::Const => Some(VarKind::Const),
            _ => None,
        };

        if let Some(kind) = decl_kind {
            // Look past the pattern for `of` / `in`.
            let save = self.pos;
            self.advance();
            let pattern = self.parse_binding_pattern()?;
            if self.match_word("of") {
                let iterable = self.parse_assignment()?;
                self.consume(TokenKind::RightParen, "expected ')'")?;
                let body = Box::new(self.parse_statement()?);
                return Ok(Stmt {
                    span: self.span_from(start),
                    kind: StmtKind::ForOf {
                        kind,
                        pattern,
                        iterable,
                        body,
                        is_await,
                    },
                });
            }
            if self.matches(TokenKind::In) {
                let object = self.parse_expression()?;
                self.consume(TokenKind::RightParen, "expected ')'")?;
                let body = Box::new(self.parse_statement()?);
                return Ok(Stmt {
                    span: self.span_from(start),
                    kind: StmtKind::ForIn {
                        kind,
                        pattern,
                        object,
                        body,
                    },
                });
            }
            // Classic for loop with declaration init; rewind and reparse.
            self.pos = save;
        }
        if is_await {
            return Err(self.error_here("'for await' requires an 'of' loop"));
        }

        let init = if self.matches(TokenKind::Semicolon) {
            None
        } else if decl_kind.is_some() {
            Some(Box::new(self.parse_var_statement()?))
        } else {
            let expr = self.parse_expression()?;
            self.consume(TokenKind::Semicolon, "expected ';' after for initializer")?;
            Some(Box::new(Stmt {
                span: expr.span,
                kind: StmtKind::Expression(expr),
            }))
        };
        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "expected ';' after for condition")?;
        let update = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RightParen, "expected ')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::For {
                init,
                cond,
                update,
                body,
            },
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let try_block = self.parse_block()?;
        let catch = if self.matches(TokenKind::Catch) {
            let param = if self.matches(TokenKind::LeftParen) {
                let pat = self.parse_binding_pattern()?;
                if self.matches(TokenKind::Colon) {
                    let _ = self.parse_type()?; // annotation is checked, not kept
                }
                self.consume(TokenKind::RightParen, "expected ')' after catch binding")?;
                Some(pat)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finally = if self.matches(TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.error_here("expected 'catch' or 'finally' after try block"));
        }
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::TryCatch {
                try_block,
                catch,
                finally,
            },
        })
    }

    fn parse_throw(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        if !self.same_line() {
            return Err(self.error_here("line break not allowed after 'throw'"));
        }
        let expr = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Throw(expr),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let value = if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RightBrace)
            || self.at_end()
            || !self.same_line()
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon()?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Return(value),
        })
    }

    fn parse_function_declaration(&mut self, is_async: bool) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        self.consume(TokenKind::Function, "expected 'function'")?;
        let is_generator = self.matches(TokenKind::Star);
        let name = self.consume_identifier("expected function name")?;
        let func = self.parse_function_rest(Some(name.clone()), is_async, is_generator, false)?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Function {
                name,
                func: Box::new(func),
            },
        })
    }

    /// Parse `<T, U>`-style type parameter list if present.
    pub(crate) fn parse_type_params(&mut self) -> Result<Vec<String>, Diagnostic> {
        let mut params = Vec::new();
        if self.matches(TokenKind::Less) {
            loop {
                params.push(self.consume_identifier("expected type parameter name")?);
                // `extends`-constraints are parsed and discarded.
                if self.matches(TokenKind::Extends) {
                    let _ = self.parse_type()?;
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::Greater, "expected '>' after type parameters")?;
        }
        Ok(params)
    }

    /// Parse params + optional return type + body. The caller has consumed
    /// everything up to (but not including) the parameter list.
    pub(crate) fn parse_function_rest(
        &mut self,
        name: Option<String>,
        is_async: bool,
        is_generator: bool,
        is_arrow: bool,
    ) -> Result<FunctionLit, Diagnostic> {
        let start = self.peek().span;
        let type_params = self.parse_type_params()?;
        self.consume(TokenKind::LeftParen, "expected '(' before parameters")?;
        let params = self.parse_parameters()?;
        let return_type = if self.matches(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        let mut flags = FnFlags::empty();
        if is_async {
            flags |= FnFlags::ASYNC;
        }
        if is_generator {
            flags |= FnFlags::GENERATOR;
        }
        if is_arrow {
            flags |= FnFlags::ARROW;
        }
        Ok(FunctionLit {
            name,
            type_params,
            params,
            return_type,
            body,
            flags,
            span: self.span_from(start),
            machine: None,
        })
    }

    pub(crate) fn parse_parameters(&mut self) -> Result<Vec<Parameter>, Diagnostic> {
        let mut params = Vec::new();
        while !self.check(TokenKind::RightParen) {
            let is_rest = self.matches(TokenKind::DotDotDot);
            let pattern = self.parse_binding_pattern()?;
            let optional = self.matches(TokenKind::Question);
            let type_ann = if self.matches(TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.matches(TokenKind::Equal) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Parameter {
                pattern,
                type_ann,
                default,
                is_rest,
                optional,
            });
            if is_rest {
                break;
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after parameters")?;
        Ok(params)
    }
}
