//! Common types and utilities for the tsb compiler.
//!
//! This crate provides the foundational types used across all tsb crates:
//! - Source spans (`Span`, `Spanned`)
//! - Line/column mapping (`LineMap`, `Location`)
//! - The compile-time diagnostic taxonomy (`Diagnostic`, `ErrorKind`)
//! - Numeric literal parsing shared by the scanner and the checker

pub mod diagnostics;
pub mod numeric;
pub mod position;
pub mod span;

pub use diagnostics::{Diagnostic, ErrorKind};
pub use position::{LineMap, Location};
pub use span::{Span, Spanned};
