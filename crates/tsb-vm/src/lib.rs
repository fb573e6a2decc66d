//! The execution substrate for compiled artifacts: the loader that binds
//! the artifact's runtime symbol table to native helpers, the stack VM the
//! IL targets, the global/builtin environment, and the cooperative
//! event-loop driver (microtasks + the virtual timer queue).

pub mod builtins;
pub mod vm;

pub use vm::{error_to_string, run_artifact_bytes, run_program, RunOutcome, Vm};
