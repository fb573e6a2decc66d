//! Variable resolver.
//!
//! A single pre-pass over each module that records, per identifier use, how
//! many lexical scopes separate the use from its declaration. The emitter
//! turns that distance into an environment-chain walk; names that resolve to
//! no scope are looked up through the module's bindings (imports, module
//! globals, builtins) at runtime.
//!
//! Declarations are two-phase: `declare` marks the name before its
//! initializer runs, `define` marks it readable, so a read inside the
//! binding's own initializer is reported as a temporal-dead-zone error.

pub mod resolver;

pub use resolver::{ResolveMap, Resolver};
