// file: src/logging/mod.rs
// version: 1.0.0
// guid: 0b8e2d64-1f37-4c5a-a9e2-6d71c3f04b58

//! Logging system for the tunnel provisioner

pub mod logger;

pub use logger::{init_logger, with_async_operation_span, DEFAULT_LOG_FILE};
