//! The AST.
//!
//! Two sum types, `Stmt` and `Expr`, plus the auxiliary records the grammar
//! needs (`Parameter`, `ClassMember`, `PropertyKey`, `ObjectProperty`,
//! `ImportSpec`). Every node carries its source span; every expression also
//! carries a `NodeId` so later phases (resolver, checker, lowering, emitter)
//! can attach side tables without mutating the tree.

use bitflags::bitflags;
use tsb_common::Span;

/// Unique id of an expression node within one compilation.
pub type NodeId = u32;

// =============================================================================
// Expressions
// =============================================================================

#[derive(Clone, Debug)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Lit {
    Number(f64),
    BigInt(i64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Regex { pattern: String, flags: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    EqEq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    In,
    Instanceof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

/// A template literal piece; `raw` preserves escape sequences as written.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplatePiece {
    pub cooked: String,
    pub raw: String,
}

/// Property keys in object literals and class bodies.
#[derive(Clone, Debug)]
pub enum PropertyKey {
    Identifier(String),
    Literal(Lit),
    Computed(Box<Expr>),
}

impl PropertyKey {
    /// The statically-known name, if this key is not computed.
    pub fn static_name(&self) -> Option<String> {
        match self {
            PropertyKey::Identifier(name) => Some(name.clone()),
            PropertyKey::Literal(Lit::Str(s)) => Some(s.clone()),
            PropertyKey::Literal(Lit::Number(n)) => Some(crate::ast::number_key(*n)),
            _ => None,
        }
    }
}

/// Canonical property-key form of a numeric literal key.
pub fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// One property in an object literal.
#[derive(Clone, Debug)]
pub enum ObjectProperty {
    /// `key: value`, shorthand `key`, or method `key() {}`.
    KeyValue { key: PropertyKey, value: Expr },
    /// `...expr`
    Spread(Expr),
}

bitflags! {
    /// Modifiers of a function literal.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FnFlags: u8 {
        const ASYNC = 1 << 0;
        const GENERATOR = 1 << 1;
        const ARROW = 1 << 2;
    }
}

/// A function literal: declaration body, expression, method, or arrow.
#[derive(Clone, Debug)]
pub struct FunctionLit {
    pub name: Option<String>,
    pub type_params: Vec<String>,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub flags: FnFlags,
    pub span: Span,
    /// Filled by async/generator lowering for suspendable functions.
    pub machine: Option<Box<StateMachine>>,
}

/// The state-machine record lowering attaches to a suspendable function.
///
/// States number the suspension points 1..=states (state 0 is the start).
/// Captures are the free identifiers the machine reads through its
/// environment; `this` is captured when referenced. An async arrow nested in
/// another suspendable function reaches the enclosing machine's locals
/// through the environment back-pointer.
#[derive(Clone, Debug, Default)]
pub struct StateMachine {
    pub states: u16,
    pub captures: Vec<String>,
    pub captures_this: bool,
    /// Lowering-introduced temporaries, declared at function entry.
    pub temps: Vec<String>,
    /// True for an async arrow nested inside another suspendable function.
    pub nested_in_suspendable: bool,
}

impl FunctionLit {
    pub fn is_async(&self) -> bool {
        self.flags.contains(FnFlags::ASYNC)
    }

    pub fn is_generator(&self) -> bool {
        self.flags.contains(FnFlags::GENERATOR)
    }

    pub fn is_arrow(&self) -> bool {
        self.flags.contains(FnFlags::ARROW)
    }

    /// Whether this function suspends (async, generator, or both).
    pub fn is_suspendable(&self) -> bool {
        self.flags.intersects(FnFlags::ASYNC | FnFlags::GENERATOR)
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(Lit),
    Variable {
        name: String,
    },
    This,
    Super,
    /// `object.name` (or `object?.name` when `optional`).
    Get {
        object: Box<Expr>,
        name: String,
        optional: bool,
    },
    /// `object.name = value`
    Set {
        object: Box<Expr>,
        name: String,
        value: Box<Expr>,
    },
    /// `object[index]` (or `object?.[index]`).
    GetIndex {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    /// `object[index] = value`
    SetIndex {
        object: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    /// `object.#name`
    GetPrivate {
        object: Box<Expr>,
        name: String,
    },
    /// `object.#name = value`
    SetPrivate {
        object: Box<Expr>,
        name: String,
        value: Box<Expr>,
    },
    /// `object.#name(args)`
    CallPrivate {
        object: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `cond ? then : otherwise`
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `name = value`
    Assign {
        name: String,
        value: Box<Expr>,
    },
    /// `name op= value` for arithmetic/bitwise ops
    CompoundAssign {
        name: String,
        op: BinaryOp,
        value: Box<Expr>,
    },
    /// `name &&= value`, `name ||= value`, `name ??= value`
    LogicalAssign {
        name: String,
        op: LogicalOp,
        value: Box<Expr>,
    },
    /// `object.name op= value`
    CompoundSet {
        object: Box<Expr>,
        name: String,
        op: BinaryOp,
        value: Box<Expr>,
    },
    /// `object[index] op= value`
    CompoundSetIndex {
        object: Box<Expr>,
        index: Box<Expr>,
        op: BinaryOp,
        value: Box<Expr>,
    },
    /// `object.name &&= value` and friends
    LogicalSet {
        object: Box<Expr>,
        name: String,
        op: LogicalOp,
        value: Box<Expr>,
    },
    LogicalSetIndex {
        object: Box<Expr>,
        index: Box<Expr>,
        op: LogicalOp,
        value: Box<Expr>,
    },
    /// `++x` / `--x`; target is a variable, property, or index l-value.
    PrefixIncrement {
        target: Box<Expr>,
        negative: bool,
    },
    /// `x++` / `x--`
    PostfixIncrement {
        target: Box<Expr>,
        negative: bool,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
    },
    ObjectLiteral {
        props: Vec<ObjectProperty>,
    },
    /// `...expr` inside array literals and argument lists.
    Spread {
        expr: Box<Expr>,
    },
    ArrowFunction {
        func: Box<FunctionLit>,
    },
    FunctionExpr {
        func: Box<FunctionLit>,
    },
    ClassExpr {
        decl: Box<ClassDecl>,
    },
    TemplateLiteral {
        quasis: Vec<TemplatePiece>,
        exprs: Vec<Expr>,
    },
    TaggedTemplate {
        tag: Box<Expr>,
        quasis: Vec<TemplatePiece>,
        exprs: Vec<Expr>,
    },
    /// `import(expr)`
    DynamicImport {
        arg: Box<Expr>,
    },
    ImportMeta,
    NewTarget,
    Await {
        expr: Box<Expr>,
    },
    Yield {
        expr: Option<Box<Expr>>,
    },
    YieldStar {
        expr: Box<Expr>,
    },
}

// =============================================================================
// Patterns (destructuring)
// =============================================================================

#[derive(Clone, Debug)]
pub enum Pattern {
    Identifier {
        name: String,
        span: Span,
    },
    /// `[a, , b, ...rest]` — `None` elements are holes.
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    /// `{a, b: c, d = 1, ...rest}`
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<String>,
        span: Span,
    },
    /// `pattern = default`
    Default {
        inner: Box<Pattern>,
        default: Box<Expr>,
        span: Span,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Identifier { span, .. }
            | Pattern::Array { span, .. }
            | Pattern::Object { span, .. }
            | Pattern::Default { span, .. } => *span,
        }
    }

    /// Collect every name this pattern binds, in source order.
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            Pattern::Identifier { name, .. } => out.push(name.clone()),
            Pattern::Array { elements, rest, .. } => {
                for e in elements.iter().flatten() {
                    e.bound_names(out);
                }
                if let Some(r) = rest {
                    r.bound_names(out);
                }
            }
            Pattern::Object { props, rest, .. } => {
                for p in props {
                    p.value.bound_names(out);
                }
                if let Some(r) = rest {
                    out.push(r.clone());
                }
            }
            Pattern::Default { inner, .. } => inner.bound_names(out),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ObjectPatternProp {
    pub key: String,
    pub value: Pattern,
}

/// A function parameter.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub pattern: Pattern,
    pub type_ann: Option<TypeExpr>,
    pub default: Option<Expr>,
    pub is_rest: bool,
    pub optional: bool,
}

// =============================================================================
// Classes
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Public,
    Private,
    Protected,
}

#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub superclass: Option<Expr>,
    pub super_type_args: Vec<TypeExpr>,
    pub implements: Vec<TypeExpr>,
    pub members: Vec<ClassMember>,
    pub decorators: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Getter,
    Setter,
    Constructor,
}

#[derive(Clone, Debug)]
pub enum ClassMember {
    Field(ClassField),
    Method(MethodDef),
}

#[derive(Clone, Debug)]
pub struct ClassField {
    pub key: PropertyKey,
    pub is_static: bool,
    pub access: Access,
    pub readonly: bool,
    /// `#name` private field.
    pub is_private_name: bool,
    pub type_ann: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub decorators: Vec<Expr>,
    pub span: Span,
}

/// A method, getter, setter, or constructor definition.
#[derive(Clone, Debug)]
pub struct MethodDef {
    pub key: PropertyKey,
    pub kind: MethodKind,
    pub is_static: bool,
    pub access: Access,
    pub is_private_name: bool,
    pub func: FunctionLit,
    pub decorators: Vec<Expr>,
    pub span: Span,
}

// =============================================================================
// Declarations and statements
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
    /// `using x = …` — disposed at scope exit.
    Using,
    /// `await using x = …`
    AwaitUsing,
}

impl VarKind {
    pub fn is_mutable(self) -> bool {
        matches!(self, VarKind::Var | VarKind::Let)
    }
}

#[derive(Clone, Debug)]
pub struct VarDecl {
    pub pattern: Pattern,
    pub type_ann: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMember>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct EnumMember {
    pub name: String,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct InterfaceDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub extends: Vec<TypeExpr>,
    pub members: Vec<InterfaceMember>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct InterfaceMember {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
    pub readonly: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TypeAliasDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct NamespaceDecl {
    pub name: String,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// An `import` declaration.
#[derive(Clone, Debug, Default)]
pub struct ImportSpec {
    pub specifier: String,
    pub default: Option<String>,
    /// `import * as ns from …`
    pub namespace: Option<String>,
    /// `(exported name, local alias)`
    pub named: Vec<(String, Option<String>)>,
    pub span: Span,
}

impl ImportSpec {
    pub fn is_side_effect_only(&self) -> bool {
        self.default.is_none() && self.namespace.is_none() && self.named.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    /// `{ … }` — opens a scope.
    Block(Vec<Stmt>),
    /// Statements spliced in place without a scope. Produced by lowering.
    Sequence(Vec<Stmt>),
    Var {
        kind: VarKind,
        decls: Vec<VarDecl>,
    },
    Function {
        name: String,
        func: Box<FunctionLit>,
    },
    Class(Box<ClassDecl>),
    Enum(EnumDecl),
    Interface(InterfaceDecl),
    TypeAlias(TypeAliasDecl),
    Namespace(NamespaceDecl),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        kind: VarKind,
        pattern: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
        /// `for await … of`
        is_await: bool,
    },
    ForIn {
        kind: VarKind,
        pattern: Pattern,
        object: Expr,
        body: Box<Stmt>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    TryCatch {
        try_block: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Throw(Expr),
    Return(Option<Expr>),
    Break,
    Continue,
    Import(ImportSpec),
    /// `import name = require("…")`
    ImportRequire {
        name: String,
        specifier: String,
    },
    /// `export <decl>`
    Export(Box<Stmt>),
    /// `export {a, b as c}` / `export {a} from "./m"`
    ExportNamed {
        names: Vec<(String, Option<String>)>,
        from: Option<String>,
    },
    ExportDefault(Expr),
    Expression(Expr),
}

// =============================================================================
// Type annotations
// =============================================================================

/// The type-annotation tree, consumed only by the checker.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    /// `name` or `ns.name`, with optional type arguments.
    Named {
        path: Vec<String>,
        args: Vec<TypeExpr>,
        span: Span,
    },
    Union(Vec<TypeExpr>),
    Array(Box<TypeExpr>),
    Tuple {
        elems: Vec<TypeExpr>,
        rest: Option<Box<TypeExpr>>,
    },
    Function {
        params: Vec<TypeFunctionParam>,
        ret: Box<TypeExpr>,
    },
    Object(Vec<TypeObjectMember>),
    /// Literal types degrade to their base primitive in the checker.
    Literal(Lit, Span),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeFunctionParam {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
    pub is_rest: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeObjectMember {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
    pub readonly: bool,
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named { span, .. } | TypeExpr::Literal(_, span) => *span,
            TypeExpr::Union(parts) => parts
                .first()
                .map(|t| t.span())
                .unwrap_or_else(Span::dummy),
            TypeExpr::Array(inner) => inner.span(),
            TypeExpr::Tuple { elems, .. } => elems
                .first()
                .map(|t| t.span())
                .unwrap_or_else(Span::dummy),
            TypeExpr::Function { ret, .. } => ret.span(),
            TypeExpr::Object(_) => Span::dummy(),
        }
    }
}
