// file: src/config/provision.rs
// version: 1.0.0
// guid: 7aa09b54-dc37-40e3-b335-92a0c6e1593b

//! Provisioning configuration structures

use crate::error::ProvisionError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Complete configuration for a provisioning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Commands that must resolve on PATH before anything is changed
    pub required_commands: Vec<String>,
    /// Resolver reconfiguration
    pub dns: DnsConfig,
    /// Packages installed through apt
    pub packages: Vec<String>,
    /// Tunnel binary download and configuration
    pub tunnel: TunnelConfig,
    /// systemd unit registration
    pub service: ServiceConfig,
}

/// systemd-resolved configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Path of the resolver configuration file
    pub resolved_conf: PathBuf,
    /// Upstream DNS server added to the `[Resolve]` section
    pub upstream: String,
    /// Resolver unit restarted after a change
    pub service: String,
}

/// Tunnel binary configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    pub install_dir: PathBuf,
    pub binary_name: String,
    pub binary_url: String,
    /// Expected SHA-256 of the binary (hex). Unverified when unset.
    pub binary_sha256: Option<String>,
    /// Plain-text "what is my IP" endpoint
    pub public_ip_url: String,
    /// Protocol/port pairs passed to `generate`
    pub protocols: Vec<ProtocolPort>,
    /// Config file written by `generate`, relative to the install dir
    pub config_file: String,
    /// Key of the bind address inside the generated config
    pub bind_address_field: String,
    /// Value written into the bind address field
    pub bind_address: String,
    /// Server entry written by `generate`, relative to the install dir
    pub server_entry_file: String,
}

/// Service manager unit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub description: String,
    pub unit_path: PathBuf,
    pub restart_sec: u32,
}

/// A `PROTOCOL:PORT` pair understood by the tunnel binary's `generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolPort {
    pub protocol: String,
    pub port: u16,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            required_commands: vec![
                "apt-get".to_string(),
                "dpkg-query".to_string(),
                "systemctl".to_string(),
            ],
            dns: DnsConfig::default(),
            packages: vec![
                "ca-certificates".to_string(),
                "curl".to_string(),
                "net-tools".to_string(),
            ],
            tunnel: TunnelConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            resolved_conf: PathBuf::from("/etc/systemd/resolved.conf"),
            upstream: "8.8.8.8".to_string(),
            service: "systemd-resolved".to_string(),
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("/opt/psiphon"),
            binary_name: "psiphond".to_string(),
            binary_url: "https://raw.githubusercontent.com/Psiphon-Labs/psiphon-tunnel-core-binaries/master/psiphond/psiphond".to_string(),
            binary_sha256: None,
            public_ip_url: "https://api.ipify.org".to_string(),
            protocols: vec![
                ProtocolPort::new("OSSH", 53),
                ProtocolPort::new("UNFRONTED-MEEK-OSSH", 443),
            ],
            config_file: "psiphond.config".to_string(),
            bind_address_field: "ServerIPAddress".to_string(),
            bind_address: "0.0.0.0".to_string(),
            server_entry_file: "server-entry.dat".to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "psiphond".to_string(),
            description: "Psiphon tunnel server".to_string(),
            unit_path: PathBuf::from("/etc/systemd/system/psiphond.service"),
            restart_sec: 10,
        }
    }
}

impl ProvisionConfig {
    /// Validate the complete configuration
    pub fn validate(&self) -> Result<()> {
        for cmd in &self.required_commands {
            if cmd.trim().is_empty() || cmd.contains('/') {
                return Err(ProvisionError::validation(format!(
                    "Invalid required command name: '{}'",
                    cmd
                )));
            }
        }

        if self.packages.iter().any(|p| !is_valid_package_name(p)) {
            return Err(ProvisionError::validation(format!(
                "Invalid package list: {}",
                self.packages.join(" ")
            )));
        }

        self.dns.validate()?;
        self.tunnel.validate()?;
        self.service.validate()?;
        Ok(())
    }
}

impl DnsConfig {
    pub fn validate(&self) -> Result<()> {
        self.upstream.parse::<IpAddr>().map_err(|_| {
            ProvisionError::validation(format!(
                "Upstream DNS server must be an IP address: {}",
                self.upstream
            ))
        })?;

        if self.service.trim().is_empty() {
            return Err(ProvisionError::validation(
                "Resolver service name cannot be empty",
            ));
        }

        Ok(())
    }
}

impl TunnelConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.install_dir.is_absolute() {
            return Err(ProvisionError::validation(format!(
                "Install directory must be absolute: {}",
                self.install_dir.display()
            )));
        }

        if self.binary_name.is_empty() || self.binary_name.contains('/') {
            return Err(ProvisionError::validation(format!(
                "Invalid binary name: '{}'",
                self.binary_name
            )));
        }

        for (name, value) in [
            ("binary_url", &self.binary_url),
            ("public_ip_url", &self.public_ip_url),
        ] {
            let parsed = url::Url::parse(value).map_err(|e| {
                ProvisionError::validation(format!("Invalid {}: {} ({})", name, value, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ProvisionError::validation(format!(
                    "{} must use http or https: {}",
                    name, value
                )));
            }
        }

        if let Some(digest) = &self.binary_sha256 {
            if digest.len() != 64 || hex::decode(digest).is_err() {
                return Err(ProvisionError::validation(
                    "binary_sha256 must be 64 hexadecimal characters",
                ));
            }
        }

        if self.protocols.is_empty() {
            return Err(ProvisionError::validation(
                "At least one protocol must be configured",
            ));
        }

        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(ProvisionError::validation(format!(
                "Bind address must be an IP address: {}",
                self.bind_address
            )));
        }

        if self.bind_address_field.is_empty()
            || self.config_file.is_empty()
            || self.server_entry_file.is_empty()
        {
            return Err(ProvisionError::validation(
                "Tunnel config file, server entry file and bind field must be set",
            ));
        }

        Ok(())
    }

    /// Full path of the installed executable
    pub fn binary_path(&self) -> PathBuf {
        self.install_dir.join(&self.binary_name)
    }

    /// Full path of the generated configuration file
    pub fn config_path(&self) -> PathBuf {
        self.install_dir.join(&self.config_file)
    }

    /// Full path of the generated server entry artifact
    pub fn server_entry_path(&self) -> PathBuf {
        self.install_dir.join(&self.server_entry_file)
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') || self.name.contains(' ') {
            return Err(ProvisionError::validation(format!(
                "Invalid service name: '{}'",
                self.name
            )));
        }

        if !self.unit_path.is_absolute() {
            return Err(ProvisionError::validation(format!(
                "Unit path must be absolute: {}",
                self.unit_path.display()
            )));
        }

        Ok(())
    }

    /// Unit name as systemctl expects it
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.name)
    }
}

impl ProtocolPort {
    pub fn new(protocol: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            port,
        }
    }
}

impl fmt::Display for ProtocolPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.port)
    }
}

impl FromStr for ProtocolPort {
    type Err = ProvisionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (protocol, port) = s.rsplit_once(':').ok_or_else(|| {
            ProvisionError::validation(format!("Expected PROTOCOL:PORT, got '{}'", s))
        })?;

        if protocol.is_empty()
            || !protocol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ProvisionError::validation(format!(
                "Invalid protocol name in '{}'",
                s
            )));
        }

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| ProvisionError::validation(format!("Invalid port in '{}'", s)))?;

        Ok(Self::new(protocol, port))
    }
}

impl TryFrom<String> for ProtocolPort {
    type Error = ProvisionError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProtocolPort> for String {
    fn from(value: ProtocolPort) -> Self {
        value.to_string()
    }
}

fn is_valid_package_name(name: &str) -> bool {
    // Debian policy: lowercase alphanumerics plus + - . , at least two chars
    name.len() >= 2
        && name.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+-.".contains(c))
}
