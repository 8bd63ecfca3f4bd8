// file: src/config/mod.rs
// version: 1.0.0
// guid: fe08b7e3-ca59-4329-8613-7181c7fc50a6

//! Configuration module for the tunnel provisioner
//!
//! Holds the fixed values the provisioning procedure works with. Every field
//! has a default, so running without a config file reproduces the fixed
//! behavior; a YAML file may override any subset of fields.

pub mod loader;
pub mod provision;

pub use provision::{
    DnsConfig, ProtocolPort, ProvisionConfig, ServiceConfig, TunnelConfig,
};
