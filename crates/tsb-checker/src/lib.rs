//! Structural type checker.
//!
//! Organized as:
//! - `types` — the `TypeInfo` sum type, class/interface/enum tables, and
//!   type-parameter substitution
//! - `context` — `CheckerContext`, the explicit state threaded through the
//!   pipeline (declaration tables plus the side tables the emitter reads)
//! - `compat` — assignability (`is_compatible`)
//! - `members` — property access resolution, including the builtin member
//!   tables for primitives and collections
//! - `check` — the statement/expression walk
//!
//! Classes, enums, and interfaces are nominal (compared by declaration
//! identity); everything else is structural. Type errors are fatal: the
//! first diagnostic aborts the pipeline.

pub mod check;
pub mod compat;
pub mod context;
pub mod members;
pub mod types;

pub use check::Checker;
pub use context::CheckerContext;
pub use types::{ClassId, EnumConst, EnumId, FunctionType, InterfaceId, NamespaceId, TypeInfo};
