//! CLI support for the tsb compiler: argument parsing, the compilation
//! driver, and tracing setup. The `tsb` binary lives in `bin/tsb.rs`.

pub mod args;
pub mod driver;
pub mod tracing_config;
