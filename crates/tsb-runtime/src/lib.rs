//! The runtime library compiled programs call into.
//!
//! Everything here operates on `Value` and is reachable two ways: through
//! the helper symbol table the artifact references by name (`registry`), and
//! through the VM's method dispatch (`dispatch`). Helpers that need to call
//! back into user code (comparators, listeners, `toJSON`, promise
//! reactions) do so through the `Host` trait the VM implements.
//!
//! All helpers are pure functions of their inputs except the timer queue,
//! per-instance event-emitter state, and the reflection-metadata store,
//! which live on the explicit `RuntimeCtx`.

pub mod array;
pub mod collections;
pub mod console;
pub mod ctx;
pub mod dispatch;
pub mod events;
pub mod iter;
pub mod json;
pub mod metadata;
pub mod object;
pub mod ops;
pub mod promise;
pub mod registry;
pub mod stream;
pub mod timers;
pub mod value;

pub use ctx::RuntimeCtx;
pub use registry::{helper_by_name, NativeFn};
pub use value::{Env, Value};

/// Callback surface into the VM for helpers that re-enter user code.
pub trait Host {
    /// Call a callable value (`closure`, builtin, bound method).
    fn call(&mut self, callee: Value, this: Value, args: Vec<Value>) -> Result<Value, Value>;
    /// Construct an instance of a class value.
    fn construct(&mut self, class: Value, args: Vec<Value>) -> Result<Value, Value>;
    /// Advance a suspended state machine one step, optionally injecting an
    /// exception at the resume point. Returns the `{value, done}` record
    /// (async generators may return a promise for it instead).
    fn machine_resume(
        &mut self,
        machine: value::Ref<value::StateMachineObj>,
        sent: Value,
        inject: Option<Value>,
    ) -> Result<Value, Value>;
    /// Load a module at runtime (`import(expr)`), returning a promise for
    /// its namespace object.
    fn dynamic_import(&mut self, specifier: &str) -> Result<Value, Value>;
    fn ctx_mut(&mut self) -> &mut RuntimeCtx;
}

/// Make a JS `TypeError`-style thrown value.
pub fn throw_type_error(message: impl Into<String>) -> Value {
    value::error_value("TypeError", message)
}

pub fn throw_range_error(message: impl Into<String>) -> Value {
    value::error_value("RangeError", message)
}

pub fn throw_reference_error(message: impl Into<String>) -> Value {
    value::error_value("ReferenceError", message)
}
