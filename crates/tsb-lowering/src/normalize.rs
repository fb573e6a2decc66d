//! Suspension normalization.
//!
//! Works on owned AST nodes. Inside a suspendable function every statement
//! whose expression tree contains a suspension point is decomposed: operands
//! are evaluated into function-level temporaries in source order, and each
//! `await`/`yield` ends up as the sole right-hand side of a temp assignment
//! (or a bare expression statement). Short-circuit operators and
//! conditionals with suspending arms become explicit branches so their
//! evaluation stays lazy.

use tracing::trace;
use tsb_common::Span;
use tsb_parser::ast::*;

use crate::captures::compute_captures;
use crate::helpers;

/// Lower one module body. `next_id` continues the parser's node id counter
/// so generated expressions stay unique program-wide.
pub fn lower_module(ast: Vec<Stmt>, next_id: &mut NodeId) -> Vec<Stmt> {
    let mut lw = Lowerer {
        next_id,
        temps: Vec::new(),
        temp_counter: 0,
        suspendable: false,
    };
    lw.lower_block(ast)
}

struct Lowerer<'a> {
    next_id: &'a mut NodeId,
    /// Temps of the function currently being lowered.
    temps: Vec<String>,
    temp_counter: u32,
    suspendable: bool,
}

impl<'a> Lowerer<'a> {
    fn mk(&mut self, kind: ExprKind, span: Span) -> Expr {
        let id = *self.next_id;
        *self.next_id += 1;
        Expr { id, span, kind }
    }

    fn fresh(&mut self) -> String {
        let name = format!("@t{}", self.temp_counter);
        self.temp_counter += 1;
        self.temps.push(name.clone());
        name
    }

    fn var(&mut self, name: &str, span: Span) -> Expr {
        self.mk(
            ExprKind::Variable {
                name: name.to_string(),
            },
            span,
        )
    }

    /// `name = value;` as a statement.
    fn assign_stmt(&mut self, name: &str, value: Expr) -> Stmt {
        let span = value.span;
        let assign = self.mk(
            ExprKind::Assign {
                name: name.to_string(),
                value: Box::new(value),
            },
            span,
        );
        Stmt {
            span,
            kind: StmtKind::Expression(assign),
        }
    }

    /// Evaluate into a fresh temp, returning the temp reference.
    fn hoist(&mut self, value: Expr, out: &mut Vec<Stmt>) -> Expr {
        let span = value.span;
        let t = self.fresh();
        let stmt = self.assign_stmt(&t, value);
        out.push(stmt);
        self.var(&t, span)
    }

    /// Hoist unless trivially re-evaluable.
    fn sequence_operand(&mut self, value: Expr, later_suspends: bool, out: &mut Vec<Stmt>) -> Expr {
        let value = self.lower_value(value, out);
        if later_suspends && !matches!(value.kind, ExprKind::Literal(_) | ExprKind::This) {
            self.hoist(value, out)
        } else {
            value
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn lower_function(&mut self, func: &mut FunctionLit) {
        let enclosing_suspendable = self.suspendable;
        let saved_temps = std::mem::take(&mut self.temps);
        let saved_susp = self.suspendable;
        self.suspendable = func.is_suspendable();

        for p in &mut func.params {
            if let Some(d) = p.default.take() {
                let mut d = d;
                self.visit_expr_functions(&mut d);
                p.default = Some(d);
            }
        }
        let body = std::mem::take(&mut func.body);
        let mut lowered = self.lower_block(body);
        if !self.temps.is_empty() {
            let decls = self
                .temps
                .iter()
                .map(|name| VarDecl {
                    pattern: Pattern::Identifier {
                        name: name.clone(),
                        span: Span::dummy(),
                    },
                    type_ann: None,
                    init: None,
                    span: Span::dummy(),
                })
                .collect();
            lowered.insert(
                0,
                Stmt {
                    span: Span::dummy(),
                    kind: StmtKind::Var {
                        kind: VarKind::Let,
                        decls,
                    },
                },
            );
        }
        func.body = lowered;

        if func.is_suspendable() {
            let caps = compute_captures(func);
            let states = count_suspensions(&func.body);
            trace!(
                name = func.name.as_deref().unwrap_or("<anonymous>"),
                states,
                captures = caps.names.len(),
                "lowered suspendable function"
            );
            func.machine = Some(Box::new(StateMachine {
                states,
                captures: caps.names,
                captures_this: caps.captures_this,
                temps: self.temps.clone(),
                nested_in_suspendable: enclosing_suspendable && func.is_arrow(),
            }));
        }

        self.temps = saved_temps;
        self.suspendable = saved_susp;
    }

    fn lower_class(&mut self, decl: &mut ClassDecl) {
        for d in &mut decl.decorators {
            self.visit_expr_functions(d);
        }
        if let Some(s) = &mut decl.superclass {
            self.visit_expr_functions(s);
        }
        for member in &mut decl.members {
            match member {
                ClassMember::Field(field) => {
                    if let Some(init) = &mut field.init {
                        self.visit_expr_functions(init);
                    }
                }
                ClassMember::Method(method) => {
                    let saved = self.suspendable;
                    self.suspendable = false;
                    self.lower_function(&mut method.func);
                    self.suspendable = saved;
                }
            }
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn lower_block(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(stmts.len());
        let mut iter = stmts.into_iter();
        while let Some(stmt) = iter.next() {
            // `using x = …` wraps the rest of the block in try/finally.
            if let StmtKind::Var { kind, decls } = &stmt.kind {
                if matches!(kind, VarKind::Using | VarKind::AwaitUsing) {
                    let is_await = matches!(kind, VarKind::AwaitUsing);
                    let decls = decls.clone();
                    let span = stmt.span;
                    let mut names = Vec::new();
                    for d in &decls {
                        d.pattern.bound_names(&mut names);
                    }
                    out.push(self.lower_stmt(Stmt {
                        span,
                        kind: StmtKind::Var {
                            kind: VarKind::Const,
                            decls,
                        },
                    }));
                    let rest: Vec<Stmt> = iter.collect();
                    let try_block = self.lower_block(rest);
                    let mut finally = Vec::new();
                    for name in names {
                        let target = self.var(&name, span);
                        let callee = self.var(helpers::DISPOSE, span);
                        let mut call = self.mk(
                            ExprKind::Call {
                                callee: Box::new(callee),
                                args: vec![target],
                                optional: false,
                            },
                            span,
                        );
                        if is_await && self.suspendable {
                            call = self.mk(
                                ExprKind::Await {
                                    expr: Box::new(call),
                                },
                                span,
                            );
                        }
                        finally.push(Stmt {
                            span,
                            kind: StmtKind::Expression(call),
                        });
                    }
                    out.push(Stmt {
                        span,
                        kind: StmtKind::TryCatch {
                            try_block,
                            catch: None,
                            finally: Some(finally),
                        },
                    });
                    return out;
                }
            }
            out.push(self.lower_stmt(stmt));
        }
        out
    }

    fn lower_stmt(&mut self, stmt: Stmt) -> Stmt {
        let span = stmt.span;
        let kind = match stmt.kind {
            StmtKind::Block(body) => StmtKind::Block(self.lower_block(body)),
            StmtKind::Sequence(body) => StmtKind::Sequence(self.lower_block(body)),
            StmtKind::Var { kind, decls } => {
                let mut prelude = Vec::new();
                let mut lowered = Vec::new();
                for mut decl in decls {
                    if let Some(init) = decl.init.take() {
                        let init = if self.suspends(&init) {
                            // Earlier declarators keep their order: flush
                            // them before this declarator's prelude.
                            if !lowered.is_empty() {
                                prelude.push(Stmt {
                                    span,
                                    kind: StmtKind::Var {
                                        kind,
                                        decls: std::mem::take(&mut lowered),
                                    },
                                });
                            }
                            self.lower_value_into(init, &mut prelude)
                        } else {
                            let mut init = init;
                            self.visit_expr_functions(&mut init);
                            init
                        };
                        decl.init = Some(init);
                    }
                    if prelude.is_empty() {
                        lowered.push(decl);
                    } else {
                        prelude.push(Stmt {
                            span: decl.span,
                            kind: StmtKind::Var {
                                kind,
                                decls: vec![decl],
                            },
                        });
                    }
                }
                if prelude.is_empty() {
                    StmtKind::Var {
                        kind,
                        decls: lowered,
                    }
                } else {
                    if !lowered.is_empty() {
                        prelude.push(Stmt {
                            span,
                            kind: StmtKind::Var {
                                kind,
                                decls: lowered,
                            },
                        });
                    }
                    StmtKind::Sequence(prelude)
                }
            }
            StmtKind::Function { name, mut func } => {
                self.lower_function(&mut func);
                StmtKind::Function { name, func }
            }
            StmtKind::Class(mut decl) => {
                self.lower_class(&mut decl);
                StmtKind::Class(decl)
            }
            StmtKind::Enum(mut decl) => {
                for m in &mut decl.members {
                    if let Some(init) = &mut m.init {
                        self.visit_expr_functions(init);
                    }
                }
                StmtKind::Enum(decl)
            }
            StmtKind::Interface(d) => StmtKind::Interface(d),
            StmtKind::TypeAlias(d) => StmtKind::TypeAlias(d),
            StmtKind::Namespace(mut decl) => {
                decl.body = self.lower_block(std::mem::take(&mut decl.body));
                StmtKind::Namespace(decl)
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let mut prelude = Vec::new();
                let cond = if self.suspends(&cond) {
                    self.lower_value_into(cond, &mut prelude)
                } else {
                    let mut cond = cond;
                    self.visit_expr_functions(&mut cond);
                    cond
                };
                let then = Box::new(self.lower_stmt(*then));
                let otherwise = otherwise.map(|e| Box::new(self.lower_stmt(*e)));
                let if_stmt = StmtKind::If {
                    cond,
                    then,
                    otherwise,
                };
                if prelude.is_empty() {
                    if_stmt
                } else {
                    prelude.push(Stmt {
                        span,
                        kind: if_stmt,
                    });
                    StmtKind::Sequence(prelude)
                }
            }
            StmtKind::While { cond, body } => {
                let body = Box::new(self.lower_stmt(*body));
                if self.suspends(&cond) {
                    // while (await c) { … } → while (true) { t = await c;
                    // if (!t) break; … }
                    let mut inner = Vec::new();
                    let cond = self.lower_value_into(cond, &mut inner);
                    let cond_span = cond.span;
                    let not = self.mk(
                        ExprKind::Unary {
                            op: UnaryOp::Not,
                            operand: Box::new(cond),
                        },
                        cond_span,
                    );
                    inner.push(Stmt {
                        span: cond_span,
                        kind: StmtKind::If {
                            cond: not,
                            then: Box::new(Stmt {
                                span: cond_span,
                                kind: StmtKind::Break,
                            }),
                            otherwise: None,
                        },
                    });
                    inner.push(*body);
                    let t = self.mk(ExprKind::Literal(Lit::Bool(true)), span);
                    StmtKind::While {
                        cond: t,
                        body: Box::new(Stmt {
                            span,
                            kind: StmtKind::Block(inner),
                        }),
                    }
                } else {
                    let mut cond = cond;
                    self.visit_expr_functions(&mut cond);
                    StmtKind::While { cond, body }
                }
            }
            StmtKind::DoWhile { body, cond } => {
                let body = Box::new(self.lower_stmt(*body));
                if self.suspends(&cond) {
                    let mut inner = vec![*body];
                    let cond = self.lower_value_into(cond, &mut inner);
                    let cond_span = cond.span;
                    let not = self.mk(
                        ExprKind::Unary {
                            op: UnaryOp::Not,
                            operand: Box::new(cond),
                        },
                        cond_span,
                    );
                    inner.push(Stmt {
                        span: cond_span,
                        kind: StmtKind::If {
                            cond: not,
                            then: Box::new(Stmt {
                                span: cond_span,
                                kind: StmtKind::Break,
                            }),
                            otherwise: None,
                        },
                    });
                    let t = self.mk(ExprKind::Literal(Lit::Bool(true)), span);
                    StmtKind::While {
                        cond: t,
                        body: Box::new(Stmt {
                            span,
                            kind: StmtKind::Block(inner),
                        }),
                    }
                } else {
                    let mut cond = cond;
                    self.visit_expr_functions(&mut cond);
                    StmtKind::DoWhile { body, cond }
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let init = init.map(|s| Box::new(self.lower_stmt(*s)));
                let body = Box::new(self.lower_stmt(*body));
                let cond_suspends = cond.as_ref().is_some_and(|c| self.suspends(c));
                let update_suspends = update.as_ref().is_some_and(|u| self.suspends(u));
                if cond_suspends || update_suspends {
                    // Rebuild as a while(true) loop with explicit test and
                    // update statements.
                    let mut inner = Vec::new();
                    if let Some(cond) = cond {
                        let cond = self.lower_value_into(cond, &mut inner);
                        let cond_span = cond.span;
                        let not = self.mk(
                            ExprKind::Unary {
                                op: UnaryOp::Not,
                                operand: Box::new(cond),
                            },
                            cond_span,
                        );
                        inner.push(Stmt {
                            span: cond_span,
                            kind: StmtKind::If {
                                cond: not,
                                then: Box::new(Stmt {
                                    span: cond_span,
                                    kind: StmtKind::Break,
                                }),
                                otherwise: None,
                            },
                        });
                    }
                    inner.push(*body);
                    if let Some(update) = update {
                        let update = self.lower_value_into(update, &mut inner);
                        inner.push(Stmt {
                            span: update.span,
                            kind: StmtKind::Expression(update),
                        });
                    }
                    let t = self.mk(ExprKind::Literal(Lit::Bool(true)), span);
                    let while_stmt = Stmt {
                        span,
                        kind: StmtKind::While {
                            cond: t,
                            body: Box::new(Stmt {
                                span,
                                kind: StmtKind::Block(inner),
                            }),
                        },
                    };
                    let mut block = Vec::new();
                    if let Some(init) = init {
                        block.push(*init);
                    }
                    block.push(while_stmt);
                    StmtKind::Block(block)
                } else {
                    let cond = cond.map(|mut c| {
                        self.visit_expr_functions(&mut c);
                        c
                    });
                    let update = update.map(|mut u| {
                        self.visit_expr_functions(&mut u);
                        u
                    });
                    StmtKind::For {
                        init,
                        cond,
                        update,
                        body,
                    }
                }
            }
            StmtKind::ForOf {
                kind,
                pattern,
                iterable,
                body,
                is_await,
            } => {
                if is_await {
                    return self.lower_for_await(kind, pattern, iterable, *body, span);
                }
                let mut prelude = Vec::new();
                let iterable = if self.suspends(&iterable) {
                    self.lower_value_into(iterable, &mut prelude)
                } else {
                    let mut it = iterable;
                    self.visit_expr_functions(&mut it);
                    it
                };
                let body = Box::new(self.lower_stmt(*body));
                let for_of = StmtKind::ForOf {
                    kind,
                    pattern,
                    iterable,
                    body,
                    is_await: false,
                };
                if prelude.is_empty() {
                    for_of
                } else {
                    prelude.push(Stmt { span, kind: for_of });
                    StmtKind::Sequence(prelude)
                }
            }
            StmtKind::ForIn {
                kind,
                pattern,
                object,
                body,
            } => {
                let mut prelude = Vec::new();
                let object = if self.suspends(&object) {
                    self.lower_value_into(object, &mut prelude)
                } else {
                    let mut o = object;
                    self.visit_expr_functions(&mut o);
                    o
                };
                let body = Box::new(self.lower_stmt(*body));
                let for_in = StmtKind::ForIn {
                    kind,
                    pattern,
                    object,
                    body,
                };
                if prelude.is_empty() {
                    for_in
                } else {
                    prelude.push(Stmt { span, kind: for_in });
                    StmtKind::Sequence(prelude)
                }
            }
            StmtKind::TryCatch {
                try_block,
                catch,
                finally,
            } => StmtKind::TryCatch {
                try_block: self.lower_block(try_block),
                catch: catch.map(|c| CatchClause {
                    param: c.param,
                    body: self.lower_block(c.body),
                }),
                finally: finally.map(|f| self.lower_block(f)),
            },
            StmtKind::Throw(expr) => {
                return self.lower_value_stmt(expr, span, StmtKind::Throw);
            }
            StmtKind::Return(Some(expr)) => {
                return self.lower_value_stmt(expr, span, |e| StmtKind::Return(Some(e)));
            }
            StmtKind::Return(None) => StmtKind::Return(None),
            StmtKind::Break => StmtKind::Break,
            StmtKind::Continue => StmtKind::Continue,
            StmtKind::Import(s) => StmtKind::Import(s),
            StmtKind::ImportRequire { name, specifier } => {
                StmtKind::ImportRequire { name, specifier }
            }
            StmtKind::Export(inner) => StmtKind::Export(Box::new(self.lower_stmt(*inner))),
            StmtKind::ExportNamed { names, from } => StmtKind::ExportNamed { names, from },
            StmtKind::ExportDefault(expr) => {
                return self.lower_value_stmt(expr, span, StmtKind::ExportDefault);
            }
            StmtKind::Expression(expr) => {
                return self.lower_value_stmt(expr, span, StmtKind::Expression);
            }
        };
        Stmt { span, kind }
    }

    /// Lower a statement that wraps a single expression.
    fn lower_value_stmt(
        &mut self,
        expr: Expr,
        span: Span,
        wrap: impl FnOnce(Expr) -> StmtKind,
    ) -> Stmt {
        if !self.suspends(&expr) {
            let mut expr = expr;
            self.visit_expr_functions(&mut expr);
            return Stmt {
                span,
                kind: wrap(expr),
            };
        }
        let mut prelude = Vec::new();
        let value = self.lower_value_into(expr, &mut prelude);
        prelude.push(Stmt {
            span,
            kind: wrap(value),
        });
        Stmt {
            span,
            kind: StmtKind::Sequence(prelude),
        }
    }

    /// `for await (const x of e) body` → explicit async iterator loop.
    fn lower_for_await(
        &mut self,
        kind: VarKind,
        pattern: Pattern,
        iterable: Expr,
        body: Stmt,
        span: Span,
    ) -> Stmt {
        let mut out = Vec::new();
        let iterable = self.lower_value(iterable, &mut out);

        let it = self.fresh();
        let res = self.fresh();

        let get_iter = self.var(helpers::GET_ASYNC_ITERATOR, span);
        let call = self.mk(
            ExprKind::Call {
                callee: Box::new(get_iter),
                args: vec![iterable],
                optional: false,
            },
            span,
        );
        let stmt = self.assign_stmt(&it, call);
        out.push(stmt);

        // res = await it.next(); if (res.done) break; <pattern> = res.value; body
        let mut loop_body = Vec::new();
        let it_ref = self.var(&it, span);
        let next = self.mk(
            ExprKind::Get {
                object: Box::new(it_ref),
                name: "next".to_string(),
                optional: false,
            },
            span,
        );
        let next_call = self.mk(
            ExprKind::Call {
                callee: Box::new(next),
                args: Vec::new(),
                optional: false,
            },
            span,
        );
        let awaited = self.mk(
            ExprKind::Await {
                expr: Box::new(next_call),
            },
            span,
        );
        let stmt = self.assign_stmt(&res, awaited);
        loop_body.push(stmt);

        let res_ref = self.var(&res, span);
        let done = self.mk(
            ExprKind::Get {
                object: Box::new(res_ref),
                name: "done".to_string(),
                optional: false,
            },
            span,
        );
        loop_body.push(Stmt {
            span,
            kind: StmtKind::If {
                cond: done,
                then: Box::new(Stmt {
                    span,
                    kind: StmtKind::Break,
                }),
                otherwise: None,
            },
        });

        let res_ref = self.var(&res, span);
        let value = self.mk(
            ExprKind::Get {
                object: Box::new(res_ref),
                name: "value".to_string(),
                optional: false,
            },
            span,
        );
        loop_body.push(Stmt {
            span,
            kind: StmtKind::Var {
                kind: if kind.is_mutable() {
                    VarKind::Let
                } else {
                    VarKind::Const
                },
                decls: vec![VarDecl {
                    pattern,
                    type_ann: None,
                    init: Some(value),
                    span,
                }],
            },
        });
        loop_body.push(self.lower_stmt(body));

        let t = self.mk(ExprKind::Literal(Lit::Bool(true)), span);
        out.push(Stmt {
            span,
            kind: StmtKind::While {
                cond: t,
                body: Box::new(Stmt {
                    span,
                    kind: StmtKind::Block(loop_body),
                }),
            },
        });
        Stmt {
            span,
            kind: StmtKind::Sequence(out),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn suspends(&self, expr: &Expr) -> bool {
        self.suspendable && contains_suspension(expr)
    }

    /// Lower to a suspension-free expression, appending prelude statements.
    fn lower_value_into(&mut self, expr: Expr, out: &mut Vec<Stmt>) -> Expr {
        self.lower_value(expr, out)
    }

    fn lower_value(&mut self, expr: Expr, out: &mut Vec<Stmt>) -> Expr {
        if !self.suspends(&expr) {
            let mut expr = expr;
            self.visit_expr_functions(&mut expr);
            return expr;
        }
        let Expr { id, span, kind } = expr;
        let _ = id;
        match kind {
            ExprKind::Await { expr: inner } => {
                let inner = self.lower_value(*inner, out);
                let t = self.fresh();
                let awaited = self.mk(
                    ExprKind::Await {
                        expr: Box::new(inner),
                    },
                    span,
                );
                let stmt = self.assign_stmt(&t, awaited);
                out.push(stmt);
                self.var(&t, span)
            }
            ExprKind::Yield { expr: inner } => {
                let inner = inner.map(|e| Box::new(self.lower_value(*e, out)));
                let t = self.fresh();
                let yielded = self.mk(ExprKind::Yield { expr: inner }, span);
                let stmt = self.assign_stmt(&t, yielded);
                out.push(stmt);
                self.var(&t, span)
            }
            ExprKind::YieldStar { expr: inner } => {
                // Delegation: loop over the inner iterator, forwarding sent
                // values; result is the iterator's final value.
                let inner = self.lower_value(*inner, out);
                let it = self.fresh();
                let res = self.fresh();
                let sent = self.fresh();

                let get_iter = self.var(helpers::GET_ITERATOR, span);
                let call = self.mk(
                    ExprKind::Call {
                        callee: Box::new(get_iter),
                        args: vec![inner],
                        optional: false,
                    },
                    span,
                );
                let stmt = self.assign_stmt(&it, call);
                out.push(stmt);

                let first = self.iter_next_call(&it, None, span);
                let stmt = self.assign_stmt(&res, first);
                out.push(stmt);

                let mut loop_body = Vec::new();
                let res_value = self.member(&res, "value", span);
                let yielded = self.mk(
                    ExprKind::Yield {
                        expr: Some(Box::new(res_value)),
                    },
                    span,
                );
                let stmt = self.assign_stmt(&sent, yielded);
                loop_body.push(stmt);
                let next = self.iter_next_call(&it, Some(&sent), span);
                let stmt = self.assign_stmt(&res, next);
                loop_body.push(stmt);

                let done = self.member(&res, "done", span);
                let not_done = self.mk(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(done),
                    },
                    span,
                );
                out.push(Stmt {
                    span,
                    kind: StmtKind::While {
                        cond: not_done,
                        body: Box::new(Stmt {
                            span,
                            kind: StmtKind::Block(loop_body),
                        }),
                    },
                });
                self.member(&res, "value", span)
            }
            ExprKind::Logical { op, left, right } => {
                if !contains_suspension(&right) {
                    // Only the left side suspends.
                    let left = self.lower_value(*left, out);
                    let mut right = *right;
                    self.visit_expr_functions(&mut right);
                    return self.mk(
                        ExprKind::Logical {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        span,
                    );
                }
                let left = self.lower_value(*left, out);
                let t = self.fresh();
                let stmt = self.assign_stmt(&t, left);
                out.push(stmt);
                let mut branch = Vec::new();
                let right = self.lower_value(*right, &mut branch);
                let stmt = self.assign_stmt(&t, right);
                branch.push(stmt);
                let t_ref = self.var(&t, span);
                let cond = match op {
                    LogicalOp::And => t_ref,
                    LogicalOp::Or => self.mk(
                        ExprKind::Unary {
                            op: UnaryOp::Not,
                            operand: Box::new(t_ref),
                        },
                        span,
                    ),
                    LogicalOp::Nullish => {
                        let null = self.mk(ExprKind::Literal(Lit::Null), span);
                        self.mk(
                            ExprKind::Binary {
                                op: BinaryOp::EqEq,
                                left: Box::new(t_ref),
                                right: Box::new(null),
                            },
                            span,
                        )
                    }
                };
                out.push(Stmt {
                    span,
                    kind: StmtKind::If {
                        cond,
                        then: Box::new(Stmt {
                            span,
                            kind: StmtKind::Block(branch),
                        }),
                        otherwise: None,
                    },
                });
                self.var(&t, span)
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.lower_value(*cond, out);
                let t = self.fresh();
                let mut then_branch = Vec::new();
                let then_value = self.lower_value(*then, &mut then_branch);
                let stmt = self.assign_stmt(&t, then_value);
                then_branch.push(stmt);
                let mut else_branch = Vec::new();
                let else_value = self.lower_value(*otherwise, &mut else_branch);
                let stmt = self.assign_stmt(&t, else_value);
                else_branch.push(stmt);
                out.push(Stmt {
                    span,
                    kind: StmtKind::If {
                        cond,
                        then: Box::new(Stmt {
                            span,
                            kind: StmtKind::Block(then_branch),
                        }),
                        otherwise: Some(Box::new(Stmt {
                            span,
                            kind: StmtKind::Block(else_branch),
                        })),
                    },
                });
                self.var(&t, span)
            }
            ExprKind::Binary { op, left, right } => {
                let right_suspends = contains_suspension(&right);
                let left = self.sequence_operand(*left, right_suspends, out);
                let right = self.lower_value(*right, out);
                self.mk(
                    ExprKind::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                )
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.lower_value(*operand, out);
                self.mk(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                )
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                let args_suspend = args.iter().any(contains_suspension);
                let callee = match callee.kind {
                    // Keep method receivers as receivers so `this` survives.
                    ExprKind::Get {
                        object,
                        name,
                        optional: get_opt,
                    } => {
                        let object = self.sequence_operand(*object, args_suspend, out);
                        Box::new(self.mk(
                            ExprKind::Get {
                                object: Box::new(object),
                                name,
                                optional: get_opt,
                            },
                            span,
                        ))
                    }
                    ExprKind::GetIndex {
                        object,
                        index,
                        optional: get_opt,
                    } => {
                        let index_suspends = contains_suspension(&index);
                        let object =
                            self.sequence_operand(*object, args_suspend || index_suspends, out);
                        let index = self.sequence_operand(*index, args_suspend, out);
                        Box::new(self.mk(
                            ExprKind::GetIndex {
                                object: Box::new(object),
                                index: Box::new(index),
                                optional: get_opt,
                            },
                            span,
                        ))
                    }
                    ExprKind::Super => callee,
                    _ => {
                        let lowered = self.sequence_operand(*callee, args_suspend, out);
                        Box::new(lowered)
                    }
                };
                let args = self.lower_arguments(args, out);
                self.mk(
                    ExprKind::Call {
                        callee,
                        args,
                        optional,
                    },
                    span,
                )
            }
            ExprKind::CallPrivate { object, name, args } => {
                let args_suspend = args.iter().any(contains_suspension);
                let object = self.sequence_operand(*object, args_suspend, out);
                let args = self.lower_arguments(args, out);
                self.mk(
                    ExprKind::CallPrivate {
                        object: Box::new(object),
                        name,
                        args,
                    },
                    span,
                )
            }
            ExprKind::New {
                callee,
                type_args,
                args,
            } => {
                let args_suspend = args.iter().any(contains_suspension);
                let callee = self.sequence_operand(*callee, args_suspend, out);
                let args = self.lower_arguments(args, out);
                self.mk(
                    ExprKind::New {
                        callee: Box::new(callee),
                        type_args,
                        args,
                    },
                    span,
                )
            }
            ExprKind::Get {
                object,
                name,
                optional,
            } => {
                let object = self.lower_value(*object, out);
                self.mk(
                    ExprKind::Get {
                        object: Box::new(object),
                        name,
                        optional,
                    },
                    span,
                )
            }
            ExprKind::GetIndex {
                object,
                index,
                optional,
            } => {
                let index_suspends = contains_suspension(&index);
                let object = self.sequence_operand(*object, index_suspends, out);
                let index = self.lower_value(*index, out);
                self.mk(
                    ExprKind::GetIndex {
                        object: Box::new(object),
                        index: Box::new(index),
                        optional,
                    },
                    span,
                )
            }
            ExprKind::GetPrivate { object, name } => {
                let object = self.lower_value(*object, out);
                self.mk(
                    ExprKind::GetPrivate {
                        object: Box::new(object),
                        name,
                    },
                    span,
                )
            }
            ExprKind::Set {
                object,
                name,
                value,
            } => {
                let value_suspends = contains_suspension(&value);
                let object = self.sequence_operand(*object, value_suspends, out);
                let value = self.lower_value(*value, out);
                self.mk(
                    ExprKind::Set {
                        object: Box::new(object),
                        name,
                        value: Box::new(value),
                    },
                    span,
                )
            }
            ExprKind::SetIndex {
                object,
                index,
                value,
            } => {
                let later = contains_suspension(&index) || contains_suspension(&value);
                let object = self.sequence_operand(*object, later, out);
                let value_suspends = contains_suspension(&value);
                let index = self.sequence_operand(*index, value_suspends, out);
                let value = self.lower_value(*value, out);
                self.mk(
                    ExprKind::SetIndex {
                        object: Box::new(object),
                        index: Box::new(index),
                        value: Box::new(value),
                    },
                    span,
                )
            }
            ExprKind::SetPrivate {
                object,
                name,
                value,
            } => {
                let value_suspends = contains_suspension(&value);
                let object = self.sequence_operand(*object, value_suspends, out);
                let value = self.lower_value(*value, out);
                self.mk(
                    ExprKind::SetPrivate {
                        object: Box::new(object),
                        name,
                        value: Box::new(value),
                    },
                    span,
                )
            }
            ExprKind::Assign { name, value } => {
                let value = self.lower_value(*value, out);
                self.mk(
                    ExprKind::Assign {
                        name,
                        value: Box::new(value),
                    },
                    span,
                )
            }
            ExprKind::CompoundAssign { name, op, value } => {
                let value = self.lower_value(*value, out);
                self.mk(
                    ExprKind::CompoundAssign {
                        name,
                        op,
                        value: Box::new(value),
                    },
                    span,
                )
            }
            ExprKind::LogicalAssign { name, op, value } => {
                // `x ??= await e` must stay lazy: branch on x first.
                let t_ref = self.var(&name, span);
                let cond = match op {
                    LogicalOp::And => t_ref,
                    LogicalOp::Or => self.mk(
                        ExprKind::Unary {
                            op: UnaryOp::Not,
                            operand: Box::new(t_ref),
                        },
                        span,
                    ),
                    LogicalOp::Nullish => {
                        let null = self.mk(ExprKind::Literal(Lit::Null), span);
                        self.mk(
                            ExprKind::Binary {
                                op: BinaryOp::EqEq,
                                left: Box::new(t_ref),
                                right: Box::new(null),
                            },
                            span,
                        )
                    }
                };
                let mut branch = Vec::new();
                let value = self.lower_value(*value, &mut branch);
                let assign = self.mk(
                    ExprKind::Assign {
                        name: name.clone(),
                        value: Box::new(value),
                    },
                    span,
                );
                branch.push(Stmt {
                    span,
                    kind: StmtKind::Expression(assign),
                });
                out.push(Stmt {
                    span,
                    kind: StmtKind::If {
                        cond,
                        then: Box::new(Stmt {
                            span,
                            kind: StmtKind::Block(branch),
                        }),
                        otherwise: None,
                    },
                });
                self.var(&name, span)
            }
            ExprKind::CompoundSet {
                object,
                name,
                op,
                value,
            } => {
                let object = self.sequence_operand(*object, true, out);
                let value = self.lower_value(*value, out);
                self.mk(
                    ExprKind::CompoundSet {
                        object: Box::new(object),
                        name,
                        op,
                        value: Box::new(value),
                    },
                    span,
                )
            }
            ExprKind::CompoundSetIndex {
                object,
                index,
                op,
                value,
            } => {
                let object = self.sequence_operand(*object, true, out);
                let index = self.sequence_operand(*index, true, out);
                let value = self.lower_value(*value, out);
                self.mk(
                    ExprKind::CompoundSetIndex {
                        object: Box::new(object),
                        index: Box::new(index),
                        op,
                        value: Box::new(value),
                    },
                    span,
                )
            }
            ExprKind::ArrayLiteral { elements } => {
                let elements = self.lower_arguments(elements, out);
                self.mk(ExprKind::ArrayLiteral { elements }, span)
            }
            ExprKind::ObjectLiteral { props } => {
                let later_flags: Vec<bool> = (0..props.len())
                    .map(|i| {
                        props[i + 1..].iter().any(|p| match p {
                            ObjectProperty::KeyValue { value, .. } => contains_suspension(value),
                            ObjectProperty::Spread(e) => contains_suspension(e),
                        })
                    })
                    .collect();
                let mut lowered = Vec::new();
                for (p, later) in props.into_iter().zip(later_flags) {
                    match p {
                        ObjectProperty::KeyValue { key, value } => {
                            let value = self.sequence_operand(value, later, out);
                            lowered.push(ObjectProperty::KeyValue { key, value });
                        }
                        ObjectProperty::Spread(e) => {
                            let e = self.sequence_operand(e, later, out);
                            lowered.push(ObjectProperty::Spread(e));
                        }
                    }
                }
                self.mk(ExprKind::ObjectLiteral { props: lowered }, span)
            }
            ExprKind::TemplateLiteral { quasis, exprs } => {
                let exprs = self.lower_arguments(exprs, out);
                self.mk(ExprKind::TemplateLiteral { quasis, exprs }, span)
            }
            ExprKind::TaggedTemplate { tag, quasis, exprs } => {
                let exprs_suspend = exprs.iter().any(contains_suspension);
                let tag = self.sequence_operand(*tag, exprs_suspend, out);
                let exprs = self.lower_arguments(exprs, out);
                self.mk(
                    ExprKind::TaggedTemplate {
                        tag: Box::new(tag),
                        quasis,
                        exprs,
                    },
                    span,
                )
            }
            ExprKind::Spread { expr: inner } => {
                let inner = self.lower_value(*inner, out);
                self.mk(
                    ExprKind::Spread {
                        expr: Box::new(inner),
                    },
                    span,
                )
            }
            ExprKind::DynamicImport { arg } => {
                let arg = self.lower_value(*arg, out);
                self.mk(
                    ExprKind::DynamicImport {
                        arg: Box::new(arg),
                    },
                    span,
                )
            }
            // Remaining kinds cannot contain suspension points (checked by
            // `suspends` at entry), so this arm is effectively the
            // suspension-free fall-through for completeness.
            other => {
                let mut expr = Expr {
                    id: {
                        let id = *self.next_id;
                        *self.next_id += 1;
                        id
                    },
                    span,
                    kind: other,
                };
                self.visit_expr_functions(&mut expr);
                expr
            }
        }
    }

    /// Lower an argument list with in-order hoisting.
    fn lower_arguments(&mut self, args: Vec<Expr>, out: &mut Vec<Stmt>) -> Vec<Expr> {
        let later_flags: Vec<bool> = (0..args.len())
            .map(|i| args[i + 1..].iter().any(contains_suspension))
            .collect();
        args.into_iter()
            .zip(later_flags)
            .map(|(arg, later)| {
                if let ExprKind::Spread { expr: inner } = arg.kind {
                    let span = arg.span;
                    let inner = self.sequence_operand(*inner, later, out);
                    self.mk(
                        ExprKind::Spread {
                            expr: Box::new(inner),
                        },
                        span,
                    )
                } else {
                    self.sequence_operand(arg, later, out)
                }
            })
            .collect()
    }

    fn iter_next_call(&mut self, it: &str, sent: Option<&str>, span: Span) -> Expr {
        let it_ref = self.var(it, span);
        let next = self.mk(
            ExprKind::Get {
                object: Box::new(it_ref),
                name: "next".to_string(),
                optional: false,
            },
            span,
        );
        let args = match sent {
            Some(s) => vec![self.var(s, span)],
            None => vec![self.mk(ExprKind::Literal(Lit::Undefined), span)],
        };
        self.mk(
            ExprKind::Call {
                callee: Box::new(next),
                args,
                optional: false,
            },
            span,
        )
    }

    fn member(&mut self, name: &str, prop: &str, span: Span) -> Expr {
        let obj = self.var(name, span);
        self.mk(
            ExprKind::Get {
                object: Box::new(obj),
                name: prop.to_string(),
                optional: false,
            },
            span,
        )
    }

    /// Recursively lower function literals nested in an otherwise
    /// suspension-free expression.
    fn visit_expr_functions(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::ArrowFunction { func } | ExprKind::FunctionExpr { func } => {
                self.lower_function(func);
            }
            ExprKind::ClassExpr { decl } => self.lower_class(decl),
            ExprKind::Get { object, .. } | ExprKind::GetPrivate { object, .. } => {
                self.visit_expr_functions(object);
            }
            ExprKind::Set { object, value, .. } | ExprKind::SetPrivate { object, value, .. } => {
                self.visit_expr_functions(object);
                self.visit_expr_functions(value);
            }
            ExprKind::GetIndex { object, index, .. } => {
                self.visit_expr_functions(object);
                self.visit_expr_functions(index);
            }
            ExprKind::SetIndex {
                object,
                index,
                value,
            } => {
                self.visit_expr_functions(object);
                self.visit_expr_functions(index);
                self.visit_expr_functions(value);
            }
            ExprKind::CallPrivate { object, args, .. } => {
                self.visit_expr_functions(object);
                for a in args {
                    self.visit_expr_functions(a);
                }
            }
            ExprKind::Call { callee, args, .. } => {
                self.visit_expr_functions(callee);
                for a in args {
                    self.visit_expr_functions(a);
                }
            }
            ExprKind::New { callee, args, .. } => {
                self.visit_expr_functions(callee);
                for a in args {
                    self.visit_expr_functions(a);
                }
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.visit_expr_functions(left);
                self.visit_expr_functions(right);
            }
            ExprKind::Unary { operand, .. } => self.visit_expr_functions(operand),
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.visit_expr_functions(cond);
                self.visit_expr_functions(then);
                self.visit_expr_functions(otherwise);
            }
            ExprKind::Assign { value, .. }
            | ExprKind::CompoundAssign { value, .. }
            | ExprKind::LogicalAssign { value, .. } => self.visit_expr_functions(value),
            ExprKind::CompoundSet { object, value, .. }
            | ExprKind::LogicalSet { object, value, .. } => {
                self.visit_expr_functions(object);
                self.visit_expr_functions(value);
            }
            ExprKind::CompoundSetIndex {
                object,
                index,
                value,
                ..
            }
            | ExprKind::LogicalSetIndex {
                object,
                index,
                value,
                ..
            } => {
                self.visit_expr_functions(object);
                self.visit_expr_functions(index);
                self.visit_expr_functions(value);
            }
            ExprKind::PrefixIncrement { target, .. }
            | ExprKind::PostfixIncrement { target, .. } => self.visit_expr_functions(target),
            ExprKind::ArrayLiteral { elements } => {
                for e in elements {
                    self.visit_expr_functions(e);
                }
            }
            ExprKind::ObjectLiteral { props } => {
                for p in props {
                    match p {
                        ObjectProperty::KeyValue { key, value } => {
                            if let PropertyKey::Computed(k) = key {
                                self.visit_expr_functions(k);
                            }
                            self.visit_expr_functions(value);
                        }
                        ObjectProperty::Spread(e) => self.visit_expr_functions(e),
                    }
                }
            }
            ExprKind::Spread { expr: e } => self.visit_expr_functions(e),
            ExprKind::TemplateLiteral { exprs, .. } => {
                for e in exprs {
                    self.visit_expr_functions(e);
                }
            }
            ExprKind::TaggedTemplate { tag, exprs, .. } => {
                self.visit_expr_functions(tag);
                for e in exprs {
                    self.visit_expr_functions(e);
                }
            }
            ExprKind::DynamicImport { arg } => self.visit_expr_functions(arg),
            ExprKind::Await { expr: e } => self.visit_expr_functions(e),
            ExprKind::Yield { expr: e } => {
                if let Some(e) = e {
                    self.visit_expr_functions(e);
                }
            }
            ExprKind::YieldStar { expr: e } => self.visit_expr_functions(e),
            ExprKind::Literal(_)
            | ExprKind::Variable { .. }
            | ExprKind::This
            | ExprKind::Super
            | ExprKind::ImportMeta
            | ExprKind::NewTarget => {}
        }
    }
}

/// Does this expression contain a suspension point, not counting nested
/// function bodies?
pub fn contains_suspension(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Await { .. } | ExprKind::Yield { .. } | ExprKind::YieldStar { .. } => true,
        ExprKind::ArrowFunction { .. }
        | ExprKind::FunctionExpr { .. }
        | ExprKind::ClassExpr { .. }
        | ExprKind::Literal(_)
        | ExprKind::Variable { .. }
        | ExprKind::This
        | ExprKind::Super
        | ExprKind::ImportMeta
        | ExprKind::NewTarget => false,
        ExprKind::Get { object, .. } | ExprKind::GetPrivate { object, .. } => {
            contains_suspension(object)
        }
        ExprKind::Set { object, value, .. } | ExprKind::SetPrivate { object, value, .. } => {
            contains_suspension(object) || contains_suspension(value)
        }
        ExprKind::GetIndex { object, index, .. } => {
            contains_suspension(object) || contains_suspension(index)
        }
        ExprKind::SetIndex {
            object,
            index,
            value,
        } => {
            contains_suspension(object)
                || contains_suspension(index)
                || contains_suspension(value)
        }
        ExprKind::CallPrivate { object, args, .. } => {
            contains_suspension(object) || args.iter().any(contains_suspension)
        }
        ExprKind::Call { callee, args, .. } => {
            contains_suspension(callee) || args.iter().any(contains_suspension)
        }
        ExprKind::New { callee, args, .. } => {
            contains_suspension(callee) || args.iter().any(contains_suspension)
        }
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            contains_suspension(left) || contains_suspension(right)
        }
        ExprKind::Unary { operand, .. } => contains_suspension(operand),
        ExprKind::Conditional {
            cond,
            then,
            otherwise,
        } => {
            contains_suspension(cond)
                || contains_suspension(then)
                || contains_suspension(otherwise)
        }
        ExprKind::Assign { value, .. }
        | ExprKind::CompoundAssign { value, .. }
        | ExprKind::LogicalAssign { value, .. } => contains_suspension(value),
        ExprKind::CompoundSet { object, value, .. }
        | ExprKind::LogicalSet { object, value, .. } => {
            contains_suspension(object) || contains_suspension(value)
        }
        ExprKind::CompoundSetIndex {
            object,
            index,
            value,
            ..
        }
        | ExprKind::LogicalSetIndex {
            object,
            index,
            value,
            ..
        } => {
            contains_suspension(object)
                || contains_suspension(index)
                || contains_suspension(value)
        }
        ExprKind::PrefixIncrement { target, .. } | ExprKind::PostfixIncrement { target, .. } => {
            contains_suspension(target)
        }
        ExprKind::ArrayLiteral { elements } => elements.iter().any(contains_suspension),
        ExprKind::ObjectLiteral { props } => props.iter().any(|p| match p {
            ObjectProperty::KeyValue { key, value } => {
                let key_suspends = match key {
                    PropertyKey::Computed(k) => contains_suspension(k),
                    _ => false,
                };
                key_suspends || contains_suspension(value)
            }
            ObjectProperty::Spread(e) => contains_suspension(e),
        }),
        ExprKind::Spread { expr: e } => contains_suspension(e),
        ExprKind::TemplateLiteral { exprs, .. } => exprs.iter().any(contains_suspension),
        ExprKind::TaggedTemplate { tag, exprs, .. } => {
            contains_suspension(tag) || exprs.iter().any(contains_suspension)
        }
        ExprKind::DynamicImport { arg } => contains_suspension(arg),
    }
}

/// Count suspension points in a lowered body (nested functions excluded).
fn count_suspensions(stmts: &[Stmt]) -> u16 {
    fn expr_count(e: &Expr) -> u16 {
        match &e.kind {
            ExprKind::Await { expr } => 1 + expr_count(expr),
            ExprKind::Yield { expr } => {
                1 + expr.as_ref().map(|e| expr_count(e)).unwrap_or(0)
            }
            ExprKind::YieldStar { expr } => 1 + expr_count(expr),
            ExprKind::Assign { value, .. } => expr_count(value),
            ExprKind::Call { callee, args, .. } => {
                expr_count(callee) + args.iter().map(expr_count).sum::<u16>()
            }
            ExprKind::Get { object, .. } => expr_count(object),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                expr_count(left) + expr_count(right)
            }
            ExprKind::Unary { operand, .. } => expr_count(operand),
            _ => 0,
        }
    }
    fn stmt_count(s: &Stmt) -> u16 {
        match &s.kind {
            StmtKind::Block(b) | StmtKind::Sequence(b) => b.iter().map(stmt_count).sum(),
            StmtKind::Var { decls, .. } => decls
                .iter()
                .filter_map(|d| d.init.as_ref())
                .map(expr_count)
                .sum(),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                expr_count(cond)
                    + stmt_count(then)
                    + otherwise.as_ref().map(|e| stmt_count(e)).unwrap_or(0)
            }
            StmtKind::While { cond, body } => expr_count(cond) + stmt_count(body),
            StmtKind::DoWhile { body, cond } => stmt_count(body) + expr_count(cond),
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                init.as_ref().map(|s| stmt_count(s)).unwrap_or(0)
                    + cond.as_ref().map(expr_count).unwrap_or(0)
                    + update.as_ref().map(expr_count).unwrap_or(0)
                    + stmt_count(body)
            }
            StmtKind::ForOf {
                iterable, body, ..
            } => expr_count(iterable) + stmt_count(body),
            StmtKind::ForIn { object, body, .. } => expr_count(object) + stmt_count(body),
            StmtKind::TryCatch {
                try_block,
                catch,
                finally,
            } => {
                try_block.iter().map(stmt_count).sum::<u16>()
                    + catch
                        .as_ref()
                        .map(|c| c.body.iter().map(stmt_count).sum::<u16>())
                        .unwrap_or(0)
                    + finally
                        .as_ref()
                        .map(|f| f.iter().map(stmt_count).sum::<u16>())
                        .unwrap_or(0)
            }
            StmtKind::Throw(e) | StmtKind::ExportDefault(e) | StmtKind::Expression(e) => {
                expr_count(e)
            }
            StmtKind::Return(Some(e)) => expr_count(e),
            _ => 0,
        }
    }
    stmts.iter().map(stmt_count).sum()
}

#[cfg(test)]
#[path = "tests/lowering_tests.rs"]
mod tests;
