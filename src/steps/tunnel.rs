// file: src/steps/tunnel.rs
// version: 1.0.0
// guid: f3b97a02-5c8e-4d61-b1f4-96a0e2d7c538

//! Tunnel binary download, config generation and bind address patch

use super::{ChangeSet, ProvisionStep, StepContext, StepOutcome};
use crate::config::TunnelConfig;
use crate::error::ProvisionError;
use crate::network::{public_ip, HostCommand, HostExecutor, HttpFetcher};
use crate::utils::crypto;
use crate::Result;
use regex::Regex;
use tracing::{debug, info, warn};

pub struct TunnelStep;

fn field_regex(field: &str) -> Result<Regex> {
    Regex::new(&format!(r#"("{}"\s*:\s*)"([^"]*)""#, regex::escape(field)))
        .map_err(|e| ProvisionError::config(format!("Invalid bind address field pattern: {}", e)))
}

/// Current value(s) of a quoted `"field": "value"` entry in `content`
pub fn field_values(content: &str, field: &str) -> Result<Vec<String>> {
    let re = field_regex(field)?;
    Ok(re
        .captures_iter(content)
        .map(|cap| cap[2].to_string())
        .collect())
}

/// Replace the value of every `"field": "..."` entry with `value`.
///
/// Returns `None` when every occurrence already holds `value`; fails when
/// the field does not appear at all.
pub fn patch_bind_address(content: &str, field: &str, value: &str) -> Result<Option<String>> {
    let current = field_values(content, field)?;
    if current.is_empty() {
        return Err(ProvisionError::validation(format!(
            "Field \"{}\" not found in generated configuration",
            field
        )));
    }
    if current.iter().all(|v| v == value) {
        return Ok(None);
    }

    let re = field_regex(field)?;
    let patched = re.replace_all(content, |cap: &regex::Captures<'_>| {
        format!("{}\"{}\"", &cap[1], value)
    });
    Ok(Some(patched.into_owned()))
}

impl TunnelStep {
    async fn ensure_install_dir(
        executor: &dyn HostExecutor,
        tunnel: &TunnelConfig,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        if executor.exists(&tunnel.install_dir).await? {
            debug!("{} already exists", tunnel.install_dir.display());
            return Ok(());
        }
        executor.create_dir_all(&tunnel.install_dir).await?;
        changes.record(format!("Created {}", tunnel.install_dir.display()));
        Ok(())
    }

    async fn needs_download(executor: &dyn HostExecutor, tunnel: &TunnelConfig) -> Result<bool> {
        let binary = tunnel.binary_path();
        if !executor.exists(&binary).await? {
            return Ok(true);
        }
        match &tunnel.binary_sha256 {
            Some(expected) => match crypto::verify_sha256(&binary, expected).await {
                Ok(()) => Ok(false),
                Err(e) => {
                    warn!("Installed binary will be replaced: {}", e);
                    Ok(true)
                }
            },
            None => Ok(false),
        }
    }

    async fn ensure_binary(
        executor: &dyn HostExecutor,
        fetcher: &dyn HttpFetcher,
        tunnel: &TunnelConfig,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        let binary = tunnel.binary_path();

        if Self::needs_download(executor, tunnel).await? {
            let staging = tempfile::Builder::new()
                .prefix("tunnel-provisioner-")
                .tempdir()?;
            let staged = staging.path().join(&tunnel.binary_name);

            fetcher.download(&tunnel.binary_url, &staged).await?;

            match &tunnel.binary_sha256 {
                Some(expected) => {
                    crypto::verify_sha256(&staged, expected).await?;
                    info!("SHA-256 of downloaded binary matches");
                }
                None => warn!(
                    "No binary_sha256 configured; {} is installed without an integrity check",
                    tunnel.binary_url
                ),
            }

            executor.install_file(&staged, &binary, 0o755).await?;
            changes.record(format!(
                "Installed {} from {}",
                binary.display(),
                tunnel.binary_url
            ));
            return Ok(());
        }

        let mode = executor.mode(&binary).await?;
        if mode & 0o111 != 0o111 {
            executor.set_mode(&binary, mode | 0o755).await?;
            changes.record(format!("Marked {} executable", binary.display()));
        }
        Ok(())
    }

    async fn ensure_generated(
        executor: &dyn HostExecutor,
        fetcher: &dyn HttpFetcher,
        tunnel: &TunnelConfig,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        let config_path = tunnel.config_path();
        if executor.exists(&config_path).await? {
            info!(
                "{} already generated, keeping it",
                config_path.display()
            );
            return Ok(());
        }

        let ip = public_ip(fetcher, &tunnel.public_ip_url).await?;
        info!("Public IP address: {}", ip);

        let mut generate = HostCommand::privileged(tunnel.binary_path().display().to_string())
            .arg("--ipaddress")
            .arg(ip.to_string());
        for protocol in &tunnel.protocols {
            generate = generate.arg("--protocol").arg(protocol.to_string());
        }
        generate
            .arg("generate")
            .current_dir(&tunnel.install_dir)
            .run_checked(executor, |msg| {
                ProvisionError::external_service(format!("Config generation failed: {}", msg))
            })
            .await?;

        if !executor.exists(&config_path).await? {
            return Err(ProvisionError::external_service(format!(
                "generate finished but {} was not created",
                config_path.display()
            )));
        }
        changes.record(format!("Generated {} for {}", config_path.display(), ip));
        Ok(())
    }

    async fn ensure_bind_address(
        executor: &dyn HostExecutor,
        tunnel: &TunnelConfig,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        let config_path = tunnel.config_path();
        let content = executor.read_to_string(&config_path).await?.ok_or_else(|| {
            ProvisionError::external_service(format!("{} is missing", config_path.display()))
        })?;

        let Some(patched) =
            patch_bind_address(&content, &tunnel.bind_address_field, &tunnel.bind_address)?
        else {
            debug!("{} already set to {}", tunnel.bind_address_field, tunnel.bind_address);
            return Ok(());
        };

        if serde_json::from_str::<serde_json::Value>(&content).is_ok() {
            serde_json::from_str::<serde_json::Value>(&patched)?;
        }

        executor.write_file(&config_path, patched.as_bytes()).await?;
        changes.record(format!(
            "Set {} to {} in {}",
            tunnel.bind_address_field,
            tunnel.bind_address,
            config_path.display()
        ));
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProvisionStep for TunnelStep {
    fn name(&self) -> &str {
        "tunnel"
    }

    fn description(&self) -> &str {
        "Download the tunnel binary and generate its configuration"
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        let tunnel = &ctx.config.tunnel;
        let executor = ctx.executor();
        let fetcher = ctx.fetcher();
        let mut changes = ChangeSet::new();

        Self::ensure_install_dir(executor, tunnel, &mut changes).await?;
        Self::ensure_binary(executor, fetcher, tunnel, &mut changes).await?;
        Self::ensure_generated(executor, fetcher, tunnel, &mut changes).await?;
        Self::ensure_bind_address(executor, tunnel, &mut changes).await?;

        Ok(changes.into_outcome("tunnel already installed and configured"))
    }

    async fn verify(&self, ctx: &StepContext<'_>) -> Result<()> {
        let tunnel = &ctx.config.tunnel;
        let executor = ctx.executor();

        let mode = executor.mode(&tunnel.binary_path()).await?;
        if mode & 0o111 == 0 {
            return Err(ProvisionError::validation(format!(
                "{} is not executable",
                tunnel.binary_path().display()
            )));
        }

        let content = executor
            .read_to_string(&tunnel.config_path())
            .await?
            .unwrap_or_default();
        let values = field_values(&content, &tunnel.bind_address_field)?;
        if values.is_empty() || values.iter().any(|v| v != &tunnel.bind_address) {
            return Err(ProvisionError::validation(format!(
                "{} in {} is {:?}, expected {}",
                tunnel.bind_address_field,
                tunnel.config_path().display(),
                values,
                tunnel.bind_address
            )));
        }
        Ok(())
    }
}
