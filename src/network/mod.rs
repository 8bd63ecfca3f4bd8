// file: src/network/mod.rs
// version: 1.0.0
// guid: 84b2f0c7-5e61-4a9d-8c3f-7a1e6d92b450

//! Host and network operations module

pub mod download;
pub mod executor;
pub mod local;

pub use download::{public_ip, HttpFetcher, NetworkDownloader};
pub use executor::{CommandOutput, HostCommand, HostExecutor};
pub use local::LocalExecutor;
