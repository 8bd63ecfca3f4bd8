// file: src/utils/mod.rs
// version: 1.0.0
// guid: a90c4e2f-7d18-4b53-9e6a-15d8f2c7b041

//! Utility modules for system operations

pub mod crypto;
pub mod system;

pub use system::SystemUtils;
