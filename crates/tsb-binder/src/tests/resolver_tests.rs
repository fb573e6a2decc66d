use crate::resolver::{ResolveMap, Resolver};
use tsb_parser::ast::{Expr, ExprKind, NodeId, Stmt, StmtKind};
use tsb_parser::parse_source;

fn resolve(src: &str) -> ResolveMap {
    let ast = parse_source(src).expect("parse failed");
    Resolver::new().resolve_module(&ast).expect("resolve failed")
}

fn resolve_err(src: &str) -> String {
    let ast = parse_source(src).expect("parse failed");
    Resolver::new()
        .resolve_module(&ast)
        .expect_err("expected resolution to fail")
        .message
}

/// Find the node id of the first `Variable` expression with the given name.
fn find_variable(stmts: &[Stmt], name: &str) -> Option<NodeId> {
    fn walk_expr(e: &Expr, name: &str) -> Option<NodeId> {
        match &e.kind {
            ExprKind::Variable { name: n } if n == name => Some(e.id),
            ExprKind::Binary { left, right, .. } => {
                walk_expr(left, name).or_else(|| walk_expr(right, name))
            }
            ExprKind::Call { callee, args, .. } => walk_expr(callee, name)
                .or_else(|| args.iter().find_map(|a| walk_expr(a, name))),
            ExprKind::Get { object, .. } => walk_expr(object, name),
            _ => None,
        }
    }
    fn walk(stmts: &[Stmt], name: &str) -> Option<NodeId> {
        for s in stmts {
            let found = match &s.kind {
                StmtKind::Expression(e) => walk_expr(e, name),
                StmtKind::Return(Some(e)) => walk_expr(e, name),
                StmtKind::Block(b) => walk(b, name),
                StmtKind::Function { func, .. } => walk(&func.body, name),
                StmtKind::Var { decls, .. } => {
                    decls.iter().find_map(|d| d.init.as_ref().and_then(|e| walk_expr(e, name)))
                }
                _ => None,
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }
    walk(stmts, name)
}

#[test]
fn local_read_has_distance_zero() {
    let src = "function f() { let x = 1; x; }";
    let ast = parse_source(src).unwrap();
    let map = Resolver::new().resolve_module(&ast).unwrap();
    let id = find_variable(&ast, "x").unwrap();
    assert_eq!(map.distance(id), Some(0));
}

#[test]
fn capture_across_one_scope_has_distance_one() {
    let src = "function f() { let x = 1; { x; } }";
    let ast = parse_source(src).unwrap();
    let map = Resolver::new().resolve_module(&ast).unwrap();
    let id = find_variable(&ast, "x").unwrap();
    assert_eq!(map.distance(id), Some(1));
}

#[test]
fn closure_capture_counts_function_scope() {
    let src = "function outer() { let x = 1; function inner() { return x; } }";
    let ast = parse_source(src).unwrap();
    let map = Resolver::new().resolve_module(&ast).unwrap();
    let id = find_variable(&ast, "x").unwrap();
    assert_eq!(map.distance(id), Some(1));
}

#[test]
fn module_globals_have_no_distance() {
    let src = "let g = 1; function f() { return g; }";
    let ast = parse_source(src).unwrap();
    let map = Resolver::new().resolve_module(&ast).unwrap();
    let id = find_variable(&ast, "g").unwrap();
    assert_eq!(map.distance(id), None);
}

#[test]
fn tdz_read_in_own_initializer_is_an_error() {
    let msg = resolve_err("function f() { let a = a; }");
    assert!(msg.contains("before it is initialized"), "{msg}");
}

#[test]
fn duplicate_declaration_is_an_error() {
    let msg = resolve_err("function f() { let a = 1; let a = 2; }");
    assert!(msg.contains("duplicate declaration"), "{msg}");
}

#[test]
fn const_assignment_is_an_error() {
    let msg = resolve_err("function f() { const c = 1; c = 2; }");
    assert!(msg.contains("constant"), "{msg}");
}

#[test]
fn return_outside_function_is_an_error() {
    let msg = resolve_err("return 1;");
    assert!(msg.contains("outside of a function"), "{msg}");
}

#[test]
fn break_outside_loop_is_an_error() {
    let msg = resolve_err("break;");
    assert!(msg.contains("outside of a loop"), "{msg}");
}

#[test]
fn await_outside_async_is_an_error() {
    let msg = resolve_err("function f() { await p; }");
    assert!(msg.contains("async"), "{msg}");
}

#[test]
fn yield_outside_generator_is_an_error() {
    let msg = resolve_err("function f() { yield 1; }");
    assert!(msg.contains("generator"), "{msg}");
}

#[test]
fn super_requires_subclass() {
    let msg = resolve_err("class A { m() { return super.m(); } }");
    assert!(msg.contains("superclass"), "{msg}");
}

#[test]
fn shadowing_resolves_to_nearest_scope() {
    let src = "function f() { let x = 1; { let x = 2; x; } }";
    let ast = parse_source(src).unwrap();
    let map = Resolver::new().resolve_module(&ast).unwrap();
    let id = find_variable(&ast, "x").unwrap();
    assert_eq!(map.distance(id), Some(0));
}

#[test]
fn loop_iterable_is_resolved_in_enclosing_scope() {
    // `xs` must not see the loop-body scope that declares `x`.
    resolve("function f() { const xs = [1]; for (const x of xs) { x; } }");
}

#[test]
fn forward_reference_to_later_binding_from_function_body() {
    // Function bodies in a block resolve after the whole block, so `later`
    // is in scope by then.
    resolve("function f() { function g() { return later; } const later = 1; return g(); }");
}
