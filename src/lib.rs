// file: src/lib.rs
// version: 1.0.0
// guid: e4c1a7f8-30b6-4d95-a2e7-5f8d9b06c341

//! # Tunnel Provisioner
//!
//! Brings a fresh Ubuntu host to a running tunnel server: resolver
//! reconfiguration, package installation, binary download and config
//! generation, systemd registration and an optional reboot.
//!
//! Every step checks the current host state first and only changes what is
//! missing, so the whole run can be repeated safely.

pub mod cli;
pub mod config;
pub mod error;
pub mod installer;
pub mod logging;
pub mod network;
pub mod steps;
pub mod utils;

pub use error::{ProvisionError, Result};

/// Version information for the utility
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
