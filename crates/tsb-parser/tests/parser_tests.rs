use tsb_parser::ast::*;
use tsb_parser::parse_source;

fn parse_ok(src: &str) -> Vec<Stmt> {
    match parse_source(src) {
        Ok(stmts) => stmts,
        Err(e) => panic!("parse failed for {src:?}: {e}"),
    }
}

fn first_expr(src: &str) -> Expr {
    let stmts = parse_ok(src);
    match stmts.into_iter().next().map(|s| s.kind) {
        Some(StmtKind::Expression(e)) => e,
        other => panic!("expected expression statement, got {other:?}"),
    }
}

#[test]
fn precedence_mul_binds_tighter_than_add() {
    let e = first_expr("1 + 2 * 3;");
    match e.kind {
        ExprKind::Binary { op: BinaryOp::Add, right, .. } => match right.kind {
            ExprKind::Binary { op: BinaryOp::Mul, .. } => {}
            other => panic!("expected Mul on the right, got {other:?}"),
        },
        other => panic!("expected Add at the root, got {other:?}"),
    }
}

#[test]
fn exponent_is_right_associative() {
    let e = first_expr("2 ** 3 ** 2;");
    match e.kind {
        ExprKind::Binary { op: BinaryOp::Pow, right, .. } => {
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Pow, .. }));
        }
        other => panic!("expected Pow at the root, got {other:?}"),
    }
}

#[test]
fn logical_and_nullish_are_logical_nodes() {
    assert!(matches!(
        first_expr("a && b;").kind,
        ExprKind::Logical { op: LogicalOp::And, .. }
    ));
    assert!(matches!(
        first_expr("a ?? b;").kind,
        ExprKind::Logical { op: LogicalOp::Nullish, .. }
    ));
}

#[test]
fn assignment_forms_map_to_distinct_variants() {
    assert!(matches!(first_expr("x = 1;").kind, ExprKind::Assign { .. }));
    assert!(matches!(
        first_expr("x += 1;").kind,
        ExprKind::CompoundAssign { op: BinaryOp::Add, .. }
    ));
    assert!(matches!(
        first_expr("x ??= 1;").kind,
        ExprKind::LogicalAssign { op: LogicalOp::Nullish, .. }
    ));
    assert!(matches!(first_expr("a.b = 1;").kind, ExprKind::Set { .. }));
    assert!(matches!(
        first_expr("a.b += 1;").kind,
        ExprKind::CompoundSet { .. }
    ));
    assert!(matches!(
        first_expr("a[0] ||= 1;").kind,
        ExprKind::LogicalSetIndex { op: LogicalOp::Or, .. }
    ));
}

#[test]
fn invalid_assignment_target_is_rejected() {
    assert!(parse_source("1 = 2;").is_err());
    assert!(parse_source("f() = 2;").is_err());
}

#[test]
fn optional_chaining_marks_nodes() {
    match first_expr("a?.b;").kind {
        ExprKind::Get { optional, .. } => assert!(optional),
        other => panic!("expected Get, got {other:?}"),
    }
    match first_expr("a?.[0];").kind {
        ExprKind::GetIndex { optional, .. } => assert!(optional),
        other => panic!("expected GetIndex, got {other:?}"),
    }
    match first_expr("f?.();").kind {
        ExprKind::Call { optional, .. } => assert!(optional),
        other => panic!("expected Call, got {other:?}"),
    }
}

#[test]
fn arrow_functions_single_and_parenthesized() {
    match first_expr("x => x + 1;").kind {
        ExprKind::ArrowFunction { func } => {
            assert_eq!(func.params.len(), 1);
            assert!(func.is_arrow());
            assert!(matches!(func.body[0].kind, StmtKind::Return(Some(_))));
        }
        other => panic!("expected arrow, got {other:?}"),
    }
    match first_expr("async (a, b) => a;").kind {
        ExprKind::ArrowFunction { func } => {
            assert!(func.is_async());
            assert_eq!(func.params.len(), 2);
        }
        other => panic!("expected async arrow, got {other:?}"),
    }
}

#[test]
fn paren_expr_is_not_mistaken_for_arrow() {
    assert!(matches!(
        first_expr("(a + b) * c;").kind,
        ExprKind::Binary { op: BinaryOp::Mul, .. }
    ));
}

#[test]
fn template_literals_collect_pieces_and_holes() {
    match first_expr("`a${x}b${y}c`;").kind {
        ExprKind::TemplateLiteral { quasis, exprs } => {
            assert_eq!(quasis.len(), 3);
            assert_eq!(exprs.len(), 2);
            assert_eq!(quasis[0].cooked, "a");
            assert_eq!(quasis[2].cooked, "c");
        }
        other => panic!("expected template, got {other:?}"),
    }
}

#[test]
fn tagged_template_keeps_raw() {
    match first_expr(r"tag`a\n${x}`;").kind {
        ExprKind::TaggedTemplate { quasis, exprs, .. } => {
            assert_eq!(quasis[0].raw, "a\\n");
            assert_eq!(quasis[0].cooked, "a\n");
            assert_eq!(exprs.len(), 1);
        }
        other => panic!("expected tagged template, got {other:?}"),
    }
}

#[test]
fn new_with_type_arguments() {
    match first_expr("new Box<number>(1);").kind {
        ExprKind::New { type_args, args, .. } => {
            assert_eq!(type_args.len(), 1);
            assert_eq!(args.len(), 1);
        }
        other => panic!("expected New, got {other:?}"),
    }
}

#[test]
fn new_target_and_import_meta() {
    parse_ok("function f() { return new.target; }");
    assert!(matches!(first_expr("import.meta;").kind, ExprKind::ImportMeta));
    assert!(matches!(
        first_expr("import('./m');").kind,
        ExprKind::DynamicImport { .. }
    ));
}

#[test]
fn class_with_members_and_modifiers() {
    let stmts = parse_ok(
        "class Point {\n  private x: number = 0;\n  readonly tag = \"p\";\n  #secret = 1;\n  static origin() { return new Point(); }\n  get len(): number { return this.x; }\n  set len(v: number) { this.x = v; }\n  constructor(x: number) { this.x = x; }\n}",
    );
    let StmtKind::Class(decl) = &stmts[0].kind else {
        panic!("expected class");
    };
    assert_eq!(decl.name, "Point");
    assert_eq!(decl.members.len(), 7);
    let mut kinds = Vec::new();
    for m in &decl.members {
        match m {
            ClassMember::Field(f) => kinds.push(format!(
                "field:{}{}",
                f.key.static_name().unwrap_or_default(),
                if f.is_private_name { "#" } else { "" }
            )),
            ClassMember::Method(m) => kinds.push(format!(
                "{:?}:{}",
                m.kind,
                m.key.static_name().unwrap_or_default()
            )),
        }
    }
    assert_eq!(
        kinds,
        vec![
            "field:x",
            "field:tag",
            "field:secret#",
            "Method:origin",
            "Getter:len",
            "Setter:len",
            "Constructor:constructor",
        ]
    );
}

#[test]
fn enum_members_with_and_without_initializers() {
    let stmts = parse_ok("enum Color { Red, Green = 5, Blue }");
    let StmtKind::Enum(decl) = &stmts[0].kind else {
        panic!("expected enum");
    };
    assert_eq!(decl.members.len(), 3);
    assert!(decl.members[0].init.is_none());
    assert!(decl.members[1].init.is_some());
}

#[test]
fn imports_and_exports() {
    let stmts = parse_ok(
        "import './side';\nimport def, {a, b as c} from './m';\nimport * as ns from './n';\nexport const x = 1;\nexport {x as y};\nexport default x;\n",
    );
    match &stmts[0].kind {
        StmtKind::Import(spec) => assert!(spec.is_side_effect_only()),
        other => panic!("expected import, got {other:?}"),
    }
    match &stmts[1].kind {
        StmtKind::Import(spec) => {
            assert_eq!(spec.default.as_deref(), Some("def"));
            assert_eq!(spec.named.len(), 2);
            assert_eq!(spec.named[1], ("b".to_string(), Some("c".to_string())));
        }
        other => panic!("expected import, got {other:?}"),
    }
    match &stmts[2].kind {
        StmtKind::Import(spec) => assert_eq!(spec.namespace.as_deref(), Some("ns")),
        other => panic!("expected import, got {other:?}"),
    }
    assert!(matches!(&stmts[3].kind, StmtKind::Export(_)));
    assert!(matches!(&stmts[4].kind, StmtKind::ExportNamed { .. }));
    assert!(matches!(&stmts[5].kind, StmtKind::ExportDefault(_)));
}

#[test]
fn destructuring_declarations() {
    let stmts = parse_ok("const {a, b: {c}, d = 1} = obj; let [x, , y, ...rest] = arr;");
    let StmtKind::Var { decls, .. } = &stmts[0].kind else {
        panic!("expected var");
    };
    let mut names = Vec::new();
    decls[0].pattern.bound_names(&mut names);
    assert_eq!(names, vec!["a", "c", "d"]);
    let StmtKind::Var { decls, .. } = &stmts[1].kind else {
        panic!("expected var");
    };
    let mut names = Vec::new();
    decls[0].pattern.bound_names(&mut names);
    assert_eq!(names, vec!["x", "y", "rest"]);
}

#[test]
fn for_of_and_for_await_of() {
    let stmts = parse_ok("for (const x of xs) {}\nfor await (const c of chunks) {}");
    assert!(matches!(
        &stmts[0].kind,
        StmtKind::ForOf { is_await: false, .. }
    ));
    assert!(matches!(
        &stmts[1].kind,
        StmtKind::ForOf { is_await: true, .. }
    ));
}

#[test]
fn generators_and_yield() {
    let stmts = parse_ok("function* gen() { yield 1; yield* inner(); const x = yield; }");
    let StmtKind::Function { func, .. } = &stmts[0].kind else {
        panic!("expected function");
    };
    assert!(func.is_generator());
    assert_eq!(func.body.len(), 3);
}

#[test]
fn switch_is_rejected_with_a_hint() {
    let err = parse_source("switch (x) {}").unwrap_err();
    assert!(err.message.contains("subset"), "{}", err.message);
}

#[test]
fn type_annotations_parse_into_type_exprs() {
    let stmts = parse_ok(
        "let a: number[] = [];\nlet b: string | null = null;\nlet c: Map<string, number[]> = new Map();\nlet f: (x: number, y?: string) => void = g;\nlet t: [number, string] = [1, \"a\"];\nlet o: {a: number; readonly b?: string} = {a: 1};",
    );
    let get_ty = |i: usize| -> &TypeExpr {
        match &stmts[i].kind {
            StmtKind::Var { decls, .. } => decls[0].type_ann.as_ref().unwrap(),
            _ => panic!("expected var"),
        }
    };
    assert!(matches!(get_ty(0), TypeExpr::Array(_)));
    assert!(matches!(get_ty(1), TypeExpr::Union(parts) if parts.len() == 2));
    match get_ty(2) {
        TypeExpr::Named { path, args, .. } => {
            assert_eq!(path, &vec!["Map".to_string()]);
            assert_eq!(args.len(), 2);
            assert!(matches!(&args[1], TypeExpr::Array(_)));
        }
        other => panic!("expected named type, got {other:?}"),
    }
    assert!(matches!(get_ty(3), TypeExpr::Function { .. }));
    assert!(matches!(get_ty(4), TypeExpr::Tuple { .. }));
    match get_ty(5) {
        TypeExpr::Object(members) => {
            assert_eq!(members.len(), 2);
            assert!(members[1].optional);
            assert!(members[1].readonly);
        }
        other => panic!("expected object type, got {other:?}"),
    }
}

#[test]
fn using_declarations() {
    let stmts = parse_ok("using handle = open(); await using conn = connect();");
    assert!(matches!(
        &stmts[0].kind,
        StmtKind::Var { kind: VarKind::Using, .. }
    ));
    assert!(matches!(
        &stmts[1].kind,
        StmtKind::Var { kind: VarKind::AwaitUsing, .. }
    ));
}

#[test]
fn namespaces_and_interfaces_and_aliases() {
    let stmts = parse_ok(
        "namespace Geo { export const pi = 3.14; }\ninterface Shape { area(): number; name: string; }\ntype Pair<T> = [T, T];",
    );
    assert!(matches!(&stmts[0].kind, StmtKind::Namespace(_)));
    match &stmts[1].kind {
        StmtKind::Interface(decl) => {
            assert_eq!(decl.members.len(), 2);
            assert!(matches!(decl.members[0].ty, TypeExpr::Function { .. }));
        }
        other => panic!("expected interface, got {other:?}"),
    }
    assert!(matches!(&stmts[2].kind, StmtKind::TypeAlias(_)));
}

#[test]
fn node_ids_are_unique() {
    let stmts = parse_ok("a + b * c - d;");
    let mut ids = Vec::new();
    fn walk(e: &Expr, ids: &mut Vec<NodeId>) {
        ids.push(e.id);
        if let ExprKind::Binary { left, right, .. } = &e.kind {
            walk(left, ids);
            walk(right, ids);
        }
    }
    if let StmtKind::Expression(e) = &stmts[0].kind {
        walk(e, &mut ids);
    }
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len());
}
