//! Declaration grammar: classes, enums, interfaces, type aliases,
//! namespaces, imports, and exports.

use tsb_common::Diagnostic;
use tsb_scanner::TokenKind;

use super::Parser;
use crate::ast::*;

impl Parser {
    pub(crate) fn parse_decorators(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut decorators = Vec::new();
        while self.matches(TokenKind::At) {
            // A decorator is a (possibly parameterized) member chain.
            let expr = self.parse_postfix_chain()?;
            decorators.push(expr);
        }
        Ok(decorators)
    }

    pub(crate) fn parse_class_declaration(
        &mut self,
        decorators: Vec<Expr>,
    ) -> Result<Stmt, Diagnostic> {
        let decl = self.parse_class_body(decorators)?;
        Ok(Stmt {
            span: decl.span,
            kind: StmtKind::Class(Box::new(decl)),
        })
    }

    /// Parse `class Name<T> extends Base<U> implements I { … }`, cursor on
    /// the `class` keyword. For class expressions the name is optional.
    pub(crate) fn parse_class_body(
        &mut self,
        decorators: Vec<Expr>,
    ) -> Result<ClassDecl, Diagnostic> {
        let start = self.peek().span;
        self.consume(TokenKind::Class, "expected 'class'")?;
        let name = if self.check(TokenKind::Identifier) {
            self.advance().lexeme.clone()
        } else {
            String::new()
        };
        let type_params = self.parse_type_params()?;

        let mut superclass = None;
        let mut super_type_args = Vec::new();
        if self.matches(TokenKind::Extends) {
            let expr = self.parse_qualified_name_expr()?;
            superclass = Some(expr);
            if self.check(TokenKind::Less) {
                super_type_args = self.parse_type_arguments()?;
            }
        }
        let mut implements = Vec::new();
        if self.match_word("implements") {
            loop {
                implements.push(self.parse_type()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::LeftBrace, "expected '{' before class body")?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.at_end() {
            if self.matches(TokenKind::Semicolon) {
                continue;
            }
            members.push(self.parse_class_member()?);
        }
        self.consume(TokenKind::RightBrace, "expected '}' after class body")?;
        Ok(ClassDecl {
            name,
            type_params,
            superclass,
            super_type_args,
            implements,
            members,
            decorators,
            span: self.span_from(start),
        })
    }

    /// `Name` or `ns.Name` as an expression (superclass references).
    fn parse_qualified_name_expr(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.peek().span;
        let name = self.consume_identifier("expected class name after 'extends'")?;
        let mut expr = self.make_expr(ExprKind::Variable { name }, start);
        while self.matches(TokenKind::Dot) {
            let member = self.consume_name("expected name after '.'")?;
            let span = self.span_from(start);
            expr = self.make_expr(
                ExprKind::Get {
                    object: Box::new(expr),
                    name: member,
                    optional: false,
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_class_member(&mut self) -> Result<ClassMember, Diagnostic> {
        let start = self.peek().span;
        let decorators = self.parse_decorators()?;

        let mut access = Access::Public;
        let mut is_static = false;
        let mut readonly = false;
        let mut is_async = false;
        let mut is_generator = false;
        let mut accessor: Option<MethodKind> = None;

        // Modifier words are contextual: each is only a modifier when it is
        // not immediately followed by `(` / `=` / `:` (then it is a name).
        loop {
            let next = self.peek_at(1).kind;
            let is_name_position = matches!(
                next,
                TokenKind::LeftParen
                    | TokenKind::Equal
                    | TokenKind::Colon
                    | TokenKind::Semicolon
                    | TokenKind::Question
                    | TokenKind::Less
            );
            if self.check_word("public") && !is_name_position {
                self.advance();
                access = Access::Public;
            } else if self.check_word("private") && !is_name_position {
                self.advance();
                access = Access::Private;
            } else if self.check_word("protected") && !is_name_position {
                self.advance();
                access = Access::Protected;
            } else if self.check_word("static") && !is_name_position {
                self.advance();
                is_static = true;
            } else if self.check_word("readonly") && !is_name_position {
                self.advance();
                readonly = true;
            } else if self.check_word("async") && !is_name_position {
                self.advance();
                is_async = true;
            } else if self.check(TokenKind::Star) {
                self.advance();
                is_generator = true;
            } else if self.check_word("get") && !is_name_position {
                self.advance();
                accessor = Some(MethodKind::Getter);
                break;
            } else if self.check_word("set") && !is_name_position {
                self.advance();
                accessor = Some(MethodKind::Setter);
                break;
            } else {
                break;
            }
        }

        let (key, is_private_name) = self.parse_property_key()?;

        // Method / accessor / constructor
        if self.check(TokenKind::LeftParen) || self.check(TokenKind::Less) {
            let kind = accessor.unwrap_or({
                if !is_static && matches!(&key, PropertyKey::Identifier(n) if n == "constructor") {
                    MethodKind::Constructor
                } else {
                    MethodKind::Method
                }
            });
            let name = key.static_name();
            let func = self.parse_function_rest(name, is_async, is_generator, false)?;
            return Ok(ClassMember::Method(MethodDef {
                key,
                kind,
                is_static,
                access,
                is_private_name,
                func,
                decorators,
                span: self.span_from(start),
            }));
        }

        if accessor.is_some() || is_async || is_generator {
            return Err(self.error_here("expected '(' after accessor or method name"));
        }

        // Field
        let _optional = self.matches(TokenKind::Question);
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
        self.consume_semicolon()?;
        Ok(ClassMember::Field(ClassField {
            key,
            is_static,
            access,
            readonly,
            is_private_name,
            type_ann,
            init,
            decorators,
            span: self.span_from(start),
        }))
    }

    /// Property keys in classes and object literals.
    pub(crate) fn parse_property_key(&mut self) -> Result<(PropertyKey, bool), Diagnostic> {
        match self.peek_kind() {
            TokenKind::PrivateIdentifier => {
                let name = self.advance().lexeme.trim_start_matches('#').to_string();
                Ok((PropertyKey::Identifier(name), true))
            }
            TokenKind::String => {
                let value = self.advance().string_value().to_string();
                Ok((PropertyKey::Literal(Lit::Str(value)), false))
            }
            TokenKind::Number => {
                let value = self.advance().number();
                Ok((PropertyKey::Literal(Lit::Number(value)), false))
            }
            TokenKind::LeftBracket => {
                self.advance();
                let expr = self.parse_assignment()?;
                self.consume(TokenKind::RightBracket, "expected ']' after computed key")?;
                Ok((PropertyKey::Computed(Box::new(expr)), false))
            }
            _ => {
                let name = self.consume_name("expected property name")?;
                Ok((PropertyKey::Identifier(name), false))
            }
        }
    }

    pub(crate) fn parse_enum(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        self.consume(TokenKind::Enum, "expected 'enum'")?;
        let name = self.consume_identifier("expected enum name")?;
        self.consume(TokenKind::LeftBrace, "expected '{' before enum body")?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.at_end() {
            let m_start = self.peek().span;
            let m_name = match self.peek_kind() {
                TokenKind::String => self.advance().string_value().to_string(),
                _ => self.consume_name("expected enum member name")?,
            };
            let init = if self.matches(TokenKind::Equal) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            members.push(EnumMember {
                name: m_name,
                init,
                span: self.span_from(m_start),
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "expected '}' after enum body")?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Enum(EnumDecl {
                name,
                members,
                span: self.span_from(start),
            }),
        })
    }

    pub(crate) fn parse_interface(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        self.consume(TokenKind::Interface, "expected 'interface'")?;
        let name = self.consume_identifier("expected interface name")?;
        let type_params = self.parse_type_params()?;
        let mut extends = Vec::new();
        if self.matches(TokenKind::Extends) {
            loop {
                extends.push(self.parse_type()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::LeftBrace, "expected '{' before interface body")?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.at_end() {
            let m_start = self.peek().span;
            let readonly = self.check_word("readonly")
                && self.peek_at(1).kind == TokenKind::Identifier
                && self.match_word("readonly");
            let m_name = self.consume_name("expected interface member name")?;
            let optional = self.matches(TokenKind::Question);
            // Method signature sugar: `name(params): ret`
            let ty = if self.check(TokenKind::LeftParen) || self.check(TokenKind::Less) {
                let _ = self.parse_type_params()?;
                self.consume(TokenKind::LeftParen, "expected '('")?;
                let params = self.parse_type_function_params()?;
                let ret = if self.matches(TokenKind::Colon) {
                    self.parse_type()?
                } else {
                    TypeExpr::Named {
                        path: vec!["void".to_string()],
                        args: Vec::new(),
                        span: self.previous().span,
                    }
                };
                TypeExpr::Function {
                    params,
                    ret: Box::new(ret),
                }
            } else {
                self.consume(TokenKind::Colon, "expected ':' after member name")?;
                self.parse_type()?
            };
            if self.matches(TokenKind::Semicolon) || self.matches(TokenKind::Comma) {
                // explicit separator
            }
            members.push(InterfaceMember {
                name: m_name,
                ty,
                optional,
                readonly,
                span: self.span_from(m_start),
            });
        }
        self.consume(TokenKind::RightBrace, "expected '}' after interface body")?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Interface(InterfaceDecl {
                name,
                type_params,
                extends,
                members,
                span: self.span_from(start),
            }),
        })
    }

    pub(crate) fn parse_type_alias(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        self.advance(); // `type`
        let name = self.consume_identifier("expected type alias name")?;
        let type_params = self.parse_type_params()?;
        self.consume(TokenKind::Equal, "expected '=' in type alias")?;
        let ty = self.parse_type()?;
        self.consume_semicolon()?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::TypeAlias(TypeAliasDecl {
                name,
                type_params,
                ty,
                span: self.span_from(start),
            }),
        })
    }

    pub(crate) fn parse_namespace(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        self.advance(); // `namespace` / `module`
        let name = self.consume_identifier("expected namespace name")?;
        let body = self.parse_block()?;
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Namespace(NamespaceDecl {
                name,
                body,
                span: self.span_from(start),
            }),
        })
    }

    pub(crate) fn parse_import(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        self.consume(TokenKind::Import, "expected 'import'")?;

        // `import "./mod"` — side-effect only
        if self.check(TokenKind::String) {
            let specifier = self.advance().string_value().to_string();
            self.consume_semicolon()?;
            return Ok(Stmt {
                span: self.span_from(start),
                kind: StmtKind::Import(ImportSpec {
                    specifier,
                    span: self.span_from(start),
                    ..Default::default()
                }),
            });
        }

        // `import name = require("./mod")`
        if self.check(TokenKind::Identifier)
            && self.peek_at(1).kind == TokenKind::Equal
            && self.peek_at(2).lexeme == "require"
        {
            let name = self.advance().lexeme.clone();
            self.advance(); // `=`
            self.advance(); // `require`
            self.consume(TokenKind::LeftParen, "expected '(' after 'require'")?;
            let spec_tok = self.consume(TokenKind::String, "expected module specifier string")?;
            let specifier = spec_tok.string_value().to_string();
            self.consume(TokenKind::RightParen, "expected ')'")?;
            self.consume_semicolon()?;
            return Ok(Stmt {
                span: self.span_from(start),
                kind: StmtKind::ImportRequire { name, specifier },
            });
        }

        let mut spec = ImportSpec::default();

        // Optional `type` marker on type-only imports is accepted and ignored.
        if self.check_word("type") && self.peek_at(1).kind != TokenKind::Comma {
            let after = self.peek_at(1).kind;
            if matches!(after, TokenKind::Identifier | TokenKind::LeftBrace | TokenKind::Star) {
                self.advance();
            }
        }

        if self.check(TokenKind::Identifier) {
            spec.default = Some(self.advance().lexeme.clone());
            if self.matches(TokenKind::Comma) {
                self.parse_import_clause_rest(&mut spec)?;
            }
        } else {
            self.parse_import_clause_rest(&mut spec)?;
        }

        if !self.match_word("from") {
            return Err(self.error_here("expected 'from' in import declaration"));
        }
        let spec_tok = self.consume(TokenKind::String, "expected module specifier string")?;
        spec.specifier = spec_tok.string_value().to_string();
        self.consume_semicolon()?;
        spec.span = self.span_from(start);
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Import(spec),
        })
    }

    fn parse_import_clause_rest(&mut self, spec: &mut ImportSpec) -> Result<(), Diagnostic> {
        if self.matches(TokenKind::Star) {
            if !self.match_word("as") {
                return Err(self.error_here("expected 'as' after '*'"));
            }
            spec.namespace = Some(self.consume_identifier("expected namespace alias")?);
            return Ok(());
        }
        self.consume(TokenKind::LeftBrace, "expected '{' in import clause")?;
        while !self.check(TokenKind::RightBrace) {
            // Per-specifier `type` marker accepted and ignored.
            if self.check_word("type") && self.peek_at(1).kind == TokenKind::Identifier {
                self.advance();
            }
            let name = self.consume_name("expected imported name")?;
            let alias = if self.match_word("as") {
                Some(self.consume_identifier("expected import alias")?)
            } else {
                None
            };
            spec.named.push((name, alias));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "expected '}' in import clause")?;
        Ok(())
    }

    pub(crate) fn parse_export(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span;
        self.consume(TokenKind::Export, "expected 'export'")?;

        if self.matches(TokenKind::Default) {
            let expr = self.parse_assignment()?;
            self.consume_semicolon()?;
            return Ok(Stmt {
                span: self.span_from(start),
                kind: StmtKind::ExportDefault(expr),
            });
        }

        // `export {a, b as c}` optionally with `from "./m"` (re-export)
        if self.check(TokenKind::LeftBrace) {
            self.advance();
            let mut names = Vec::new();
            while !self.check(TokenKind::RightBrace) {
                let name = self.consume_name("expected exported name")?;
                let alias = if self.match_word("as") {
                    Some(self.consume_name("expected export alias")?)
                } else {
                    None
                };
                names.push((name, alias));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::RightBrace, "expected '}' in export clause")?;
            let from = if self.match_word("from") {
                let tok = self.consume(TokenKind::String, "expected module specifier string")?;
                Some(tok.string_value().to_string())
            } else {
                None
            };
            self.consume_semicolon()?;
            return Ok(Stmt {
                span: self.span_from(start),
                kind: StmtKind::ExportNamed { names, from },
            });
        }

        // `export <declaration>`
        let decl = self.parse_declaration()?;
        match &decl.kind {
            StmtKind::Var { .. }
            | StmtKind::Function { .. }
            | StmtKind::Class(_)
            | StmtKind::Enum(_)
            | StmtKind::Interface(_)
            | StmtKind::TypeAlias(_)
            | StmtKind::Namespace(_) => {}
            _ => {
                return Err(Diagnostic::parse(
                    "only declarations can follow 'export'",
                    decl.span,
                ));
            }
        }
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::Export(Box::new(decl)),
        })
    }
}
