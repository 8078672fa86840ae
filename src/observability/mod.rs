//! Structured logging setup for the CLI.

mod tracing_init;

pub use tracing_init::*;
