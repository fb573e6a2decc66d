//! The runtime value model.
//!
//! Reference types are `Rc`-shared with interior mutability. Closures can
//! reference themselves through their environments and promises can form
//! graphs; those cycles leak by design (the documented conservative
//! strategy — compiled programs are short-lived processes).

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

pub type Ref<T> = Rc<RefCell<T>>;

pub fn make_ref<T>(value: T) -> Ref<T> {
    Rc::new(RefCell::new(value))
}

/// A lexical environment: one scope's slots plus the enclosing chain.
///
/// This is the explicit capture record closures and state machines read
/// through: a variable resolved to distance `d`, slot `s` is
/// `env.ancestor(d).slots[s]`.
#[derive(Debug, Default)]
pub struct Env {
    pub slots: RefCell<Vec<Value>>,
    pub parent: Option<Rc<Env>>,
}

impl Env {
    pub fn new(slot_count: usize, parent: Option<Rc<Env>>) -> Rc<Env> {
        Rc::new(Env {
            slots: RefCell::new(vec![Value::Uninitialized; slot_count]),
            parent,
        })
    }

    pub fn ancestor(self: &Rc<Env>, distance: u16) -> Rc<Env> {
        let mut env = Rc::clone(self);
        for _ in 0..distance {
            let parent = env.parent.clone().expect("resolver distance stays in range");
            env = parent;
        }
        env
    }

    pub fn get(&self, slot: u16) -> Value {
        self.slots.borrow()[slot as usize].clone()
    }

    pub fn set(&self, slot: u16, value: Value) {
        let mut slots = self.slots.borrow_mut();
        let idx = slot as usize;
        if idx >= slots.len() {
            slots.resize(idx + 1, Value::Uninitialized);
        }
        slots[idx] = value;
    }
}

/// A compiled-function closure.
#[derive(Debug)]
pub struct Closure {
    /// Index into the program's function table.
    pub func: u32,
    pub env: Rc<Env>,
    /// Present for bound methods (`fn.bind`-style internal binding).
    pub bound_this: Option<Value>,
    pub name: String,
}

/// Kinds of suspendable machines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineKind {
    Generator,
    Async,
    AsyncGenerator,
}

/// A suspended (or running) state machine instance.
///
/// `state` encodes the resume point: 0 before the first step, `n` parked at
/// suspension point `n`, -1 while running, -2 when done.
#[derive(Debug)]
pub struct StateMachineObj {
    pub func: u32,
    pub env: Rc<Env>,
    pub kind: MachineKind,
    pub state: i32,
    pub done: bool,
    /// Value sent into the machine at resume (await result / next argument).
    pub sent: Value,
    /// Exception injected at resume (rejected await / generator throw).
    pub injected_error: Option<Value>,
    /// The value produced by the last `yield`.
    pub yielded: Value,
    /// The machine's own result promise (async machines).
    pub promise: Option<Ref<PromiseState>>,
    /// Promise for the in-flight `next()` of an async generator, settled
    /// when the machine reaches its next yield or finishes.
    pub pending_next: Option<Ref<PromiseState>>,
    /// Protected regions active at the suspension point, restored on
    /// resume so injected exceptions reach the enclosing handlers.
    pub saved_trys: Vec<SavedTry>,
    /// Final result value when done.
    pub result: Value,
}

/// One protected region saved across a suspension.
#[derive(Clone, Debug)]
pub struct SavedTry {
    pub catch_ip: Option<u32>,
    pub finally_ip: Option<u32>,
    pub env: Rc<Env>,
    pub stack_len: usize,
}

pub const MACHINE_START: i32 = 0;
pub const MACHINE_RUNNING: i32 = -1;
pub const MACHINE_DONE: i32 = -2;

/// A plain object or a class instance.
#[derive(Debug, Default)]
pub struct JsObject {
    pub props: IndexMap<String, Value>,
    pub class: Option<Rc<ClassValue>>,
    pub frozen: bool,
}

impl JsObject {
    pub fn plain() -> JsObject {
        JsObject::default()
    }

    pub fn instance_of(class: Rc<ClassValue>) -> JsObject {
        JsObject {
            props: IndexMap::new(),
            class: Some(class),
            frozen: false,
        }
    }
}

/// One method entry on a runtime class.
#[derive(Clone, Debug)]
pub struct MethodSlot {
    pub func: u32,
    pub is_static: bool,
}

/// A class value created by the `MakeClass` instruction.
#[derive(Debug)]
pub struct ClassValue {
    pub name: String,
    pub superclass: Option<Rc<ClassValue>>,
    /// Environment the class body closes over (methods' parent scope; for
    /// subclasses this chain includes the one-slot `super` scope).
    pub env: Rc<Env>,
    pub ctor: Option<u32>,
    /// Synthesized initializer running field initializers against `this`.
    pub field_init: Option<u32>,
    pub methods: FxHashMap<String, MethodSlot>,
    pub getters: FxHashMap<String, MethodSlot>,
    pub setters: FxHashMap<String, MethodSlot>,
    pub statics: RefCell<FxHashMap<String, Value>>,
}

impl ClassValue {
    pub fn find_method(&self, name: &str) -> Option<(MethodSlot, &ClassValue)> {
        if let Some(slot) = self.methods.get(name) {
            return Some((slot.clone(), self));
        }
        self.superclass
            .as_deref()
            .and_then(|s| s.find_method(name))
    }

    pub fn find_getter(&self, name: &str) -> Option<(MethodSlot, &ClassValue)> {
        if let Some(slot) = self.getters.get(name) {
            return Some((slot.clone(), self));
        }
        self.superclass
            .as_deref()
            .and_then(|s| s.find_getter(name))
    }

    pub fn find_setter(&self, name: &str) -> Option<(MethodSlot, &ClassValue)> {
        if let Some(slot) = self.setters.get(name) {
            return Some((slot.clone(), self));
        }
        self.superclass
            .as_deref()
            .and_then(|s| s.find_setter(name))
    }

    pub fn find_static(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.statics.borrow().get(name) {
            return Some(v.clone());
        }
        self.superclass.as_deref().and_then(|s| s.find_static(name))
    }
}

/// Insertion-ordered map with SameValueZero key semantics.
#[derive(Debug, Default)]
pub struct JsMap {
    pub entries: Vec<(Value, Value)>,
}

impl JsMap {
    pub fn find(&self, key: &Value) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| crate::ops::same_value_zero(k, key))
    }
}

#[derive(Debug, Default)]
pub struct JsSet {
    pub entries: Vec<Value>,
}

impl JsSet {
    pub fn find(&self, value: &Value) -> Option<usize> {
        self.entries
            .iter()
            .position(|v| crate::ops::same_value_zero(v, value))
    }
}

#[derive(Debug)]
pub struct JsRegExp {
    pub pattern: String,
    pub flags: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled,
    Rejected,
}

/// What to run when a promise settles.
pub enum Reaction {
    /// `then`/`catch` handlers chained into `target`.
    Then {
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
        target: Ref<PromiseState>,
    },
    /// Resume a suspended state machine with the settlement.
    Resume(Ref<StateMachineObj>),
    /// Native settlement hook (`Promise.all` collectors); runs at settle
    /// time and never re-enters user code.
    Native(Box<dyn FnOnce(&mut crate::ctx::RuntimeCtx, Value, bool)>),
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reaction::Then { .. } => write!(f, "Reaction::Then"),
            Reaction::Resume(_) => write!(f, "Reaction::Resume"),
            Reaction::Native(_) => write!(f, "Reaction::Native"),
        }
    }
}

#[derive(Debug)]
pub struct PromiseState {
    pub status: PromiseStatus,
    pub value: Value,
    pub reactions: Vec<Reaction>,
    pub handled: bool,
}

impl PromiseState {
    pub fn pending() -> Ref<PromiseState> {
        make_ref(PromiseState {
            status: PromiseStatus::Pending,
            value: Value::Undefined,
            reactions: Vec::new(),
            handled: false,
        })
    }
}

/// A native (non-compiled) function installed by the loader.
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: crate::registry::NativeFn,
}

impl std::fmt::Debug for BuiltinDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuiltinDef({})", self.name)
    }
}

/// A materialized iterator over a native collection snapshot.
#[derive(Debug)]
pub struct NativeIter {
    pub items: Vec<Value>,
    pub pos: usize,
}

/// Event-emitter instance state (see `events`).
#[derive(Debug, Default)]
pub struct EmitterState {
    pub listeners: IndexMap<String, Vec<Value>>,
    pub max_listeners: usize,
    pub warned: Vec<String>,
}

/// Writable-stream instance state (see `stream`).
#[derive(Debug)]
pub struct WritableState {
    pub writable: bool,
    pub ended: bool,
    pub finished: bool,
    pub destroyed: bool,
    pub corked: u32,
    pub buffered: Vec<Value>,
    pub write_callback: Value,
    pub final_callback: Value,
    pub emitter: Ref<EmitterState>,
}

#[derive(Clone, Debug)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i64),
    Str(Rc<str>),
    Array(Ref<Vec<Value>>),
    Object(Ref<JsObject>),
    Function(Rc<Closure>),
    Builtin(&'static BuiltinDef),
    Class(Rc<ClassValue>),
    MapV(Ref<JsMap>),
    SetV(Ref<JsSet>),
    Date(f64),
    RegExp(Rc<JsRegExp>),
    Promise(Ref<PromiseState>),
    Machine(Ref<StateMachineObj>),
    Emitter(Ref<EmitterState>),
    Writable(Ref<WritableState>),
    Iter(Ref<NativeIter>),
    /// TDZ poison; reading it raises a ReferenceError. Never user-visible.
    Uninitialized,
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(make_ref(values))
    }

    pub fn object(obj: JsObject) -> Value {
        Value::Object(make_ref(obj))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::Class(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Build an `Error`-shaped object `{name, message}`.
pub fn error_value(name: &str, message: impl Into<String>) -> Value {
    let mut obj = JsObject::plain();
    obj.props.insert("name".to_string(), Value::str(name));
    obj.props
        .insert("message".to_string(), Value::str(message.into()));
    obj.props.insert(
        "stack".to_string(),
        Value::str(format!("{name}: <native>")),
    );
    Value::object(obj)
}
