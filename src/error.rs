// file: src/error.rs
// version: 1.0.0
// guid: 670feda0-a410-4666-adb8-ef65ec922897

//! Error taxonomy for the provisioning run

use thiserror::Error;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Error types for the tunnel provisioner
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Missing required commands: {}", missing.join(", "))]
    Preflight { missing: Vec<String> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Package error: {0}")]
    Package(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Interrupted by operator")]
    Interrupted,
}

impl ProvisionError {
    /// Create a new preflight error from the commands that could not be resolved
    pub fn preflight(missing: Vec<String>) -> Self {
        Self::Preflight { missing }
    }

    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new package error
    pub fn package(msg: impl Into<String>) -> Self {
        Self::Package(msg.into())
    }

    /// Create a new external service error
    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Process exit status reported for this failure kind
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Preflight { .. } => 2,
            Self::Network(_) | Self::Http(_) => 3,
            Self::Package(_) => 4,
            Self::ExternalService(_) => 5,
            Self::Config(_) | Self::Validation(_) | Self::Yaml(_) | Self::Json(_) => 6,
            Self::Io(_) => 7,
            Self::Integrity(_) => 8,
            Self::Interrupted => 130,
        }
    }

    /// Short name of the failure kind, used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Preflight { .. } => "preflight",
            Self::Network(_) | Self::Http(_) => "network",
            Self::Package(_) => "package",
            Self::ExternalService(_) => "external-service",
            Self::Config(_) | Self::Yaml(_) | Self::Json(_) => "config",
            Self::Validation(_) => "validation",
            Self::Io(_) => "io",
            Self::Integrity(_) => "integrity",
            Self::Interrupted => "interrupted",
        }
    }
}
