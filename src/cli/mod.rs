// file: src/cli/mod.rs
// version: 1.0.0
// guid: 6b2e9f05-d8a3-4e71-9c64-a0f5b7d3e182

//! Command line interface for the tunnel provisioner

pub mod args;
pub mod commands;
pub mod prompt;

pub use args::{Cli, Commands};
pub use commands::*;
