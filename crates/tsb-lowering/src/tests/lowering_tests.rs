use crate::normalize::{contains_suspension, lower_module};
use tsb_parser::ast::*;
use tsb_parser::parse_source;

fn lower(src: &str) -> Vec<Stmt> {
    let ast = parse_source(src).expect("parse failed");
    let mut next_id = 1_000_000;
    lower_module(ast, &mut next_id)
}

fn first_function(stmts: &[Stmt]) -> &FunctionLit {
    for s in stmts {
        if let StmtKind::Function { func, .. } = &s.kind {
            return func;
        }
    }
    panic!("no function declaration found");
}

/// After lowering, every suspension point must be the whole expression of a
/// statement or the sole RHS of an assignment — nothing may remain nested
/// inside a larger expression.
fn assert_normalized(stmts: &[Stmt]) {
    fn check_expr_no_nested(e: &Expr) {
        match &e.kind {
            ExprKind::Await { expr } | ExprKind::YieldStar { expr } => {
                assert!(
                    !contains_suspension(expr),
                    "suspension operand contains another suspension"
                );
            }
            ExprKind::Yield { expr } => {
                if let Some(expr) = expr {
                    assert!(!contains_suspension(expr));
                }
            }
            ExprKind::Assign { value, .. } => match &value.kind {
                ExprKind::Await { expr } => assert!(!contains_suspension(expr)),
                ExprKind::Yield { expr } => {
                    if let Some(e) = expr {
                        assert!(!contains_suspension(e));
                    }
                }
                other_value => assert_no_suspension_kind(other_value),
            },
            other => assert_no_suspension_kind(other),
        }
    }
    fn assert_no_suspension_kind(kind: &ExprKind) {
        let probe = Expr {
            id: 0,
            span: tsb_common::Span::dummy(),
            kind: kind.clone(),
        };
        assert!(
            !contains_suspension(&probe),
            "suspension survives inside a composite expression: {kind:?}"
        );
    }
    fn walk(s: &Stmt) {
        match &s.kind {
            StmtKind::Block(b) | StmtKind::Sequence(b) => b.iter().for_each(walk),
            StmtKind::Var { decls, .. } => {
                for d in decls {
                    if let Some(init) = &d.init {
                        check_expr_no_nested(init);
                    }
                }
            }
            StmtKind::Expression(e) | StmtKind::Throw(e) | StmtKind::ExportDefault(e) => {
                check_expr_no_nested(e)
            }
            StmtKind::Return(Some(e)) => check_expr_no_nested(e),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                check_expr_no_nested(cond);
                walk(then);
                if let Some(o) = otherwise {
                    walk(o);
                }
            }
            StmtKind::While { cond, body } => {
                check_expr_no_nested(cond);
                walk(body);
            }
            StmtKind::DoWhile { body, cond } => {
                walk(body);
                check_expr_no_nested(cond);
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(i) = init {
                    walk(i);
                }
                if let Some(c) = cond {
                    check_expr_no_nested(c);
                }
                if let Some(u) = update {
                    check_expr_no_nested(u);
                }
                walk(body);
            }
            StmtKind::ForOf {
                iterable, body, ..
            } => {
                check_expr_no_nested(iterable);
                walk(body);
            }
            StmtKind::ForIn { object, body, .. } => {
                check_expr_no_nested(object);
                walk(body);
            }
            StmtKind::TryCatch {
                try_block,
                catch,
                finally,
            } => {
                try_block.iter().for_each(walk);
                if let Some(c) = catch {
                    c.body.iter().for_each(walk);
                }
                if let Some(f) = finally {
                    f.iter().for_each(walk);
                }
            }
            StmtKind::Function { func, .. } => assert_normalized(&func.body),
            _ => {}
        }
    }
    stmts.iter().for_each(walk);
}

#[test]
fn await_in_call_argument_is_hoisted() {
    let stmts = lower("async function f() { g(1, await h(), 2); }");
    let func = first_function(&stmts);
    assert_normalized(&func.body);
    let machine = func.machine.as_ref().expect("machine record");
    assert_eq!(machine.states, 1);
    assert!(!machine.temps.is_empty());
}

#[test]
fn await_in_binary_preserves_left_operand_order() {
    let stmts = lower("async function f() { return a() + await b(); }");
    let func = first_function(&stmts);
    assert_normalized(&func.body);
    // The left call must be hoisted into a temp before the await prelude.
    let machine = func.machine.as_ref().unwrap();
    assert!(machine.temps.len() >= 2, "temps: {:?}", machine.temps);
}

#[test]
fn logical_with_suspending_right_becomes_a_branch() {
    let stmts = lower("async function f() { return ok() || (await fallback()); }");
    let func = first_function(&stmts);
    assert_normalized(&func.body);
}

#[test]
fn conditional_with_suspending_arms_becomes_if_else() {
    let stmts = lower("async function f(c: boolean) { return c ? await x() : y(); }");
    let func = first_function(&stmts);
    assert_normalized(&func.body);
}

#[test]
fn while_with_awaiting_condition_is_rewritten() {
    let stmts = lower("async function f() { while (await more()) { step(); } }");
    let func = first_function(&stmts);
    assert_normalized(&func.body);
}

#[test]
fn yield_star_expands_to_iterator_loop() {
    let stmts = lower("function* outer() { yield* inner(); }");
    let func = first_function(&stmts);
    assert_normalized(&func.body);
    // Expansion produces plain yields only.
    fn has_yield_star(stmts: &[Stmt]) -> bool {
        fn in_expr(e: &Expr) -> bool {
            matches!(e.kind, ExprKind::YieldStar { .. })
        }
        fn in_stmt(s: &Stmt) -> bool {
            match &s.kind {
                StmtKind::Block(b) | StmtKind::Sequence(b) => b.iter().any(in_stmt),
                StmtKind::While { cond, body } => in_expr(cond) || in_stmt(body),
                StmtKind::Expression(e) => in_expr(e),
                StmtKind::Var { decls, .. } => decls
                    .iter()
                    .any(|d| d.init.as_ref().map(in_expr).unwrap_or(false)),
                _ => false,
            }
        }
        stmts.iter().any(in_stmt)
    }
    assert!(!has_yield_star(&func.body));
    assert!(func.machine.as_ref().unwrap().states >= 1);
}

#[test]
fn for_await_of_becomes_async_iterator_loop() {
    let stmts = lower("async function f(chunks: any) { for await (const c of chunks) { use(c); } }");
    let func = first_function(&stmts);
    assert_normalized(&func.body);
    assert!(func.machine.as_ref().unwrap().states >= 1);
}

#[test]
fn captures_include_free_variables_and_this() {
    let stmts = lower(
        "class C { run(outer: number) { const f = async () => this.x + outer + global; return f; } }",
    );
    let StmtKind::Class(decl) = &stmts[0].kind else {
        panic!("expected class");
    };
    let ClassMember::Method(m) = &decl.members[0] else {
        panic!("expected method");
    };
    let StmtKind::Var { decls, .. } = &m.func.body[0].kind else {
        panic!("expected const f = …");
    };
    let ExprKind::ArrowFunction { func } = &decls[0].init.as_ref().unwrap().kind else {
        panic!("expected arrow");
    };
    let machine = func.machine.as_ref().expect("async arrow machine");
    assert!(machine.captures_this);
    assert!(machine.captures.contains(&"outer".to_string()));
    assert!(machine.captures.contains(&"global".to_string()));
    assert!(!machine.captures.iter().any(|c| c.starts_with('@')));
}

#[test]
fn async_arrow_nested_in_async_function_is_marked() {
    let stmts = lower("async function f() { const g = async () => await h(); await g(); }");
    let func = first_function(&stmts);
    fn find_arrow(stmts: &[Stmt]) -> Option<&FunctionLit> {
        for s in stmts {
            match &s.kind {
                StmtKind::Var { decls, .. } => {
                    for d in decls {
                        if let Some(Expr {
                            kind: ExprKind::ArrowFunction { func },
                            ..
                        }) = &d.init
                        {
                            return Some(func);
                        }
                    }
                }
                StmtKind::Sequence(b) | StmtKind::Block(b) => {
                    if let Some(f) = find_arrow(b) {
                        return Some(f);
                    }
                }
                _ => {}
            }
        }
        None
    }
    let arrow = find_arrow(&func.body).expect("nested arrow");
    assert!(arrow.machine.as_ref().unwrap().nested_in_suspendable);
}

#[test]
fn using_declaration_wraps_rest_in_try_finally() {
    let stmts = lower("function f() { using h = open(); work(h); }");
    let func = first_function(&stmts);
    let has_try = func
        .body
        .iter()
        .any(|s| matches!(s.kind, StmtKind::TryCatch { .. }));
    assert!(has_try, "expected try/finally from using declaration");
}

#[test]
fn non_suspendable_functions_pass_through_untouched() {
    let stmts = lower("function f(a: number, b: number) { return a + b; }");
    let func = first_function(&stmts);
    assert!(func.machine.is_none());
    assert_eq!(func.body.len(), 1);
}
