//! The stack IL.
//!
//! Operands are untyped references plus unboxed doubles, booleans, and
//! strings in the constant pool. Jumps are absolute instruction indexes
//! within one function. Runtime helpers are referenced by an index into the
//! program's helper symbol table; the artifact writer populates that table
//! from the internal helper ids the emitter records (the reference-rewrite
//! step).

use serde::{Deserialize, Serialize};

/// Constant pool entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Const {
    Number(f64),
    Str(String),
    BigInt(i64),
    Regex { pattern: String, flags: String },
}

/// Internal runtime-helper ids. The artifact writer rewrites these to
/// indexes into the public helper symbol table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RtHelper {
    Add,
    Equals,
    StrictEquals,
    IsTruthy,
    Stringify,
    TypeOf,
    InstanceOf,
    GetProperty,
    SetProperty,
    GetIndex,
    SetIndex,
    MergeIntoObject,
    ConcatArrays,
    CreateArray,
    CreateObject,
    InvokeValue,
    InvokeWithThis,
    ToIntegerOrInfinity,
    UnsignedShiftRight,
    JsonStringify,
    JsonParse,
    GetIterator,
    GetAsyncIterator,
    IteratorNext,
    Dispose,
    PromiseResolve,
    DynamicImport,
    ObjectKeys,
}

impl RtHelper {
    /// Every helper, indexable by `RtHelper as u32`.
    pub const ALL: &'static [RtHelper] = &[
        RtHelper::Add,
        RtHelper::Equals,
        RtHelper::StrictEquals,
        RtHelper::IsTruthy,
        RtHelper::Stringify,
        RtHelper::TypeOf,
        RtHelper::InstanceOf,
        RtHelper::GetProperty,
        RtHelper::SetProperty,
        RtHelper::GetIndex,
        RtHelper::SetIndex,
        RtHelper::MergeIntoObject,
        RtHelper::ConcatArrays,
        RtHelper::CreateArray,
        RtHelper::CreateObject,
        RtHelper::InvokeValue,
        RtHelper::InvokeWithThis,
        RtHelper::ToIntegerOrInfinity,
        RtHelper::UnsignedShiftRight,
        RtHelper::JsonStringify,
        RtHelper::JsonParse,
        RtHelper::GetIterator,
        RtHelper::GetAsyncIterator,
        RtHelper::IteratorNext,
        RtHelper::Dispose,
        RtHelper::PromiseResolve,
        RtHelper::DynamicImport,
        RtHelper::ObjectKeys,
    ];

    pub fn from_u32(v: u32) -> Option<RtHelper> {
        Self::ALL.get(v as usize).copied()
    }

    /// The public symbol this helper maps to in the runtime module.
    pub const fn public_name(self) -> &'static str {
        match self {
            RtHelper::Add => "rt.add",
            RtHelper::Equals => "rt.equals",
            RtHelper::StrictEquals => "rt.strict_equals",
            RtHelper::IsTruthy => "rt.is_truthy",
            RtHelper::Stringify => "rt.stringify",
            RtHelper::TypeOf => "rt.type_of",
            RtHelper::InstanceOf => "rt.instance_of",
            RtHelper::GetProperty => "rt.get_property",
            RtHelper::SetProperty => "rt.set_property",
            RtHelper::GetIndex => "rt.get_index",
            RtHelper::SetIndex => "rt.set_index",
            RtHelper::MergeIntoObject => "rt.merge_into_object",
            RtHelper::ConcatArrays => "rt.concat_arrays",
            RtHelper::CreateArray => "rt.create_array",
            RtHelper::CreateObject => "rt.create_object",
            RtHelper::InvokeValue => "rt.invoke_value",
            RtHelper::InvokeWithThis => "rt.invoke_with_this",
            RtHelper::ToIntegerOrInfinity => "rt.to_integer_or_infinity",
            RtHelper::UnsignedShiftRight => "rt.unsigned_shift_right",
            RtHelper::JsonStringify => "rt.json_stringify",
            RtHelper::JsonParse => "rt.json_parse",
            RtHelper::GetIterator => "rt.get_iterator",
            RtHelper::GetAsyncIterator => "rt.get_async_iterator",
            RtHelper::IteratorNext => "rt.iterator_next",
            RtHelper::Dispose => "rt.dispose",
            RtHelper::PromiseResolve => "rt.promise_resolve",
            RtHelper::DynamicImport => "rt.dynamic_import",
            RtHelper::ObjectKeys => "rt.object_keys",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // ---- data movement ----
    Const(u32),
    Undefined,
    Null,
    True,
    False,
    Dup,
    Pop,
    Swap,

    // ---- environments ----
    /// Open a block scope with the given slot count.
    PushScope(u16),
    PopScope,
    LoadVar { depth: u16, slot: u16 },
    /// Pops the value.
    StoreVar { depth: u16, slot: u16 },
    LoadGlobal(u32),
    /// Like `LoadGlobal` but pushes undefined instead of throwing
    /// (`typeof x` on unresolved names).
    LoadGlobalSoft(u32),
    StoreGlobal(u32),
    /// Pops the initial value; creates (or fills) the module-level cell.
    DefineGlobal { name: u32, mutable: bool },

    // ---- functions and calls ----
    MakeClosure { func: u32 },
    Call { argc: u8 },
    CallMethod { name: u32, argc: u8 },
    CallRuntime { helper: u32, argc: u8 },
    New { argc: u8 },
    Return,
    ReturnUndefined,

    // ---- control flow ----
    Jump(u32),
    /// Pops; jumps when falsy.
    JumpIfFalse(u32),
    /// Pops; jumps when truthy.
    JumpIfTrue(u32),
    /// Pops; jumps when null or undefined.
    JumpIfNullish(u32),
    /// Pops; jumps when neither null nor undefined.
    JumpIfNotNullish(u32),
    /// Pops an integer; jumps to `targets[i]` unless the entry is
    /// `u32::MAX` or out of range (then falls through). The state-machine
    /// resume dispatch.
    Switch(Vec<u32>),

    // ---- exceptions ----
    /// Open a protected region with a catch handler.
    EnterTryCatch { catch: u32 },
    /// Open a protected region with a finally handler.
    EnterTryFinally { finally: u32 },
    /// Close the innermost protected region (normal completion).
    PopTry,
    Throw,
    /// End of an exception-path finally block: rethrow the pending
    /// completion if one is carried.
    EndFinally,

    // ---- arithmetic / logic / comparison ----
    /// Inline numeric add, used when the checker proved both operands.
    NumAdd,
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
    Neg,
    ToNum,
    Not,
    BitNot,
    TypeofOp,
    StrictEq,
    StrictNeq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    InstanceofOp,
    /// The `in` operator.
    HasPropOp,

    // ---- objects, arrays, properties ----
    /// Pops n elements (topmost last) into a fresh array.
    MakeArray(u16),
    MakeObject,
    /// Pops value, peeks object: sets a named property, keeps the object.
    SetPropKeep(u32),
    /// Pops value and key, peeks object.
    SetIndexKeep,
    /// Pops element, peeks array, appends.
    ArrayPush,
    GetProp(u32),
    /// Direct dispatch when the checker proved the receiver's class.
    GetPropDirect(u32),
    /// Pops value and object, pushes the value back.
    SetProp(u32),
    SetPropDirect(u32),
    /// Pops index and object.
    GetIndexOp,
    /// Pops value, index, object; pushes the value back.
    SetIndexOp,
    GetPrivate(u32),
    SetPrivate(u32),
    DeleteProp(u32),
    DeleteIndex,
    Freeze,

    // ---- classes ----
    /// Pops the superclass value when the class definition has one.
    MakeClass(u32),
    /// Stack: this, superclass, args… — runs the superclass constructor
    /// against `this`.
    CallSuperCtor { argc: u8 },
    /// Stack: this, superclass, args… — invokes a superclass method.
    CallSuperMethod { name: u32, argc: u8 },
    /// Stack: this, superclass — reads a superclass member.
    GetSuperProp(u32),
    LoadNewTarget,

    // ---- suspension ----
    SetState(u16),
    /// Pops the awaited value, parks the machine on it.
    SuspendAwait,
    /// Pops the yielded value, parks the machine.
    SuspendYield,
    /// Resume stub: rethrows an injected error or pushes the sent value.
    ResumeValue,
    /// Pushes the machine's state field (for the dispatch switch).
    LoadState,

    // ---- iteration ----
    /// Pops an iterable, pushes its iterator.
    GetIter,
    /// Pops an iterator, pushes `value` then `done`.
    IterNext,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuncKind {
    Normal,
    Async,
    Generator,
    AsyncGenerator,
}

/// One compiled function.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FuncDef {
    pub name: String,
    pub n_params: u16,
    pub has_rest: bool,
    /// Slot count of the function scope (params + locals + temps).
    pub scope_slots: u16,
    /// Methods and constructors get a `this` environment at call time.
    pub binds_this: bool,
    pub kind: FuncKind,
    /// Index of the defining module (global lookups resolve there).
    pub module: u32,
    pub code: Vec<Op>,
}

/// One compiled class.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub has_super: bool,
    pub ctor: Option<u32>,
    /// Synthesized function running the instance field initializers.
    pub field_init: Option<u32>,
    /// Synthesized function running static field initializers with the
    /// class value as `this`.
    pub static_init: Option<u32>,
    pub methods: Vec<(String, u32)>,
    pub getters: Vec<(String, u32)>,
    pub setters: Vec<(String, u32)>,
    pub static_methods: Vec<(String, u32)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportImage {
    pub specifier: String,
    /// Canonical path of the dependency; empty for builtin modules.
    pub dep_path: String,
    pub default: Option<String>,
    pub namespace: Option<String>,
    pub named: Vec<(String, Option<String>)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleImage {
    pub path: String,
    /// Index of the module's top-level init function.
    pub init: u32,
    /// Export name → local binding name.
    pub exports: Vec<(String, String)>,
    /// Re-exports: export name → (dep path, source name).
    pub reexports: Vec<(String, String, String)>,
    pub imports: Vec<ImportImage>,
}

/// The whole compiled program, as serialized into the artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    pub constants: Vec<Const>,
    pub functions: Vec<FuncDef>,
    pub classes: Vec<ClassDef>,
    /// The runtime symbol table: `CallRuntime` indexes into this.
    pub helper_names: Vec<String>,
    /// Modules in evaluation order; the entry is last.
    pub modules: Vec<ModuleImage>,
    pub entry: u32,
}
