use rustc_hash::FxHashMap;
use tsb_parser::parse_source;

use crate::check::Checker;
use crate::context::CheckerContext;

fn check(src: &str) -> Result<CheckerContext, String> {
    let ast = parse_source(src).map_err(|e| e.to_string())?;
    let mut ctx = CheckerContext::new();
    Checker::check_module(&mut ctx, "main.ts", &ast, &FxHashMap::default())
        .map_err(|e| e.message)?;
    Ok(ctx)
}

fn check_err(src: &str) -> String {
    match check(src) {
        Ok(_) => panic!("expected a type error for {src:?}"),
        Err(msg) => msg,
    }
}

#[test]
fn annotated_binding_rejects_incompatible_initializer() {
    let msg = check_err("let x: number = \"hello\";");
    assert!(msg.contains("not assignable"), "{msg}");
}

#[test]
fn annotated_binding_accepts_compatible_initializer() {
    check("let x: number = 1; let s: string | null = null; let a: number[] = [1, 2];")
        .expect("should check");
}

#[test]
fn unknown_property_on_class_instance_is_an_error() {
    let msg = check_err("class P { x: number = 1; } const p = new P(); p.missing;");
    assert!(msg.contains("missing"), "{msg}");
    assert!(msg.contains("does not exist"), "{msg}");
}

#[test]
fn known_members_resolve_through_superclass_chain() {
    check(
        "class A { base(): number { return 1; } }\nclass B extends A { }\nconst b = new B(); b.base();",
    )
    .expect("should check");
}

#[test]
fn private_member_is_rejected_outside_class() {
    let msg = check_err(
        "class C { private secret: number = 1; }\nconst c = new C(); c.secret;",
    );
    assert!(msg.contains("private"), "{msg}");
}

#[test]
fn private_member_is_allowed_inside_class() {
    check("class C { private secret = 1; peek(): number { return this.secret; } }")
        .expect("should check");
}

#[test]
fn protected_member_is_allowed_in_subclass() {
    check(
        "class A { protected v = 1; }\nclass B extends A { read(): number { return this.v; } }",
    )
    .expect("should check");
    let msg = check_err("class A { protected v = 1; }\nconst a = new A(); a.v;");
    assert!(msg.contains("protected"), "{msg}");
}

#[test]
fn readonly_assignment_outside_constructor_is_an_error() {
    let msg = check_err(
        "class C { readonly id: number = 1; bump() { this.id = 2; } }",
    );
    assert!(msg.contains("readonly"), "{msg}");
}

#[test]
fn readonly_assignment_in_constructor_is_allowed() {
    check("class C { readonly id: number; constructor() { this.id = 1; } }")
        .expect("should check");
}

#[test]
fn getter_without_setter_reports_specific_error() {
    let msg = check_err(
        "class C { get size(): number { return 1; } }\nconst c = new C(); c.size = 2;",
    );
    assert!(msg.contains("getter"), "{msg}");
}

#[test]
fn generic_class_substitutes_members() {
    check(
        "class Box<T> { value: T; constructor(v: T) { this.value = v; } get(): T { return this.value; } }\nconst b = new Box<number>(1);\nlet n: number = b.get();",
    )
    .expect("should check");
    let msg = check_err(
        "class Box<T> { value: T; constructor(v: T) { this.value = v; } get(): T { return this.value; } }\nconst b = new Box<number>(1);\nlet s: string = b.get();",
    );
    assert!(msg.contains("not assignable"), "{msg}");
}

#[test]
fn enum_members_resolve_and_fold() {
    let ctx = check("enum Color { Red, Green = 5, Blue }\nconst c = Color.Blue;")
        .expect("should check");
    assert!(!ctx.enum_member_consts.is_empty());
}

#[test]
fn unknown_enum_member_is_an_error() {
    let msg = check_err("enum Color { Red }\nColor.Purple;");
    assert!(msg.contains("Purple"), "{msg}");
}

#[test]
fn interface_members_resolve() {
    check(
        "interface Shape { area(): number; }\nfunction total(s: Shape): number { return s.area(); }",
    )
    .expect("should check");
    let msg = check_err(
        "interface Shape { area(): number; }\nfunction f(s: Shape) { s.perimeter(); }",
    );
    assert!(msg.contains("perimeter"), "{msg}");
}

#[test]
fn call_arity_is_checked() {
    let msg = check_err("function two(a: number, b: number): number { return a; }\ntwo(1);");
    assert!(msg.contains("argument"), "{msg}");
}

#[test]
fn call_argument_types_are_checked() {
    let msg = check_err("function f(n: number) {}\nf(\"nope\");");
    assert!(msg.contains("not assignable"), "{msg}");
}

#[test]
fn numeric_add_is_proven_for_emitter() {
    let ctx = check("const a: number = 1; const b: number = 2; a + b;").expect("should check");
    assert_eq!(ctx.numeric_adds.len(), 1);
}

#[test]
fn string_concat_is_not_marked_numeric() {
    let ctx = check("const a = \"x\"; const b: number = 2; a + b;").expect("should check");
    assert!(ctx.numeric_adds.is_empty());
}

#[test]
fn class_must_be_newed() {
    let msg = check_err("class C {}\nC();");
    assert!(msg.contains("new"), "{msg}");
}

#[test]
fn namespace_members_resolve() {
    check("namespace Geo { export const pi = 3.14; }\nGeo.pi;").expect("should check");
    let msg = check_err("namespace Geo { export const pi = 3.14; }\nGeo.tau;");
    assert!(msg.contains("tau"), "{msg}");
}

#[test]
fn set_operations_are_typed() {
    check(
        "const a: Set<number> = new Set();\nconst b: Set<number> = new Set();\nconst u: Set<number> = a.union(b);\nlet yes: boolean = a.isSubsetOf(b);",
    )
    .expect("should check");
}

#[test]
fn await_unwraps_promise_types() {
    check(
        "async function f(): Promise<number> { return 1; }\nasync function g(): Promise<number> { const n: number = await f(); return n; }",
    )
    .expect("should check");
}

#[test]
fn type_alias_substitutes_parameters() {
    check("type Pair<T> = [T, T];\nlet p: Pair<number> = [1, 2];").expect("should check");
}
