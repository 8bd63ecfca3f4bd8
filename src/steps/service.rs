// file: src/steps/service.rs
// version: 1.0.0
// guid: 2e9c5d70-a4b1-4f83-86d2-c15f7e3a90b6

//! systemd unit registration for the tunnel daemon

use super::{ChangeSet, ProvisionStep, StepContext, StepOutcome};
use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::network::HostCommand;
use crate::Result;
use tracing::{debug, info};

/// Step whose changes to the binary or config require a daemon restart
const TUNNEL_STEP: &str = "tunnel";

pub struct ServiceStep;

/// Render the unit file running `<binary> run` from the install directory
pub fn render_unit(config: &ProvisionConfig) -> String {
    format!(
        r#"[Unit]
Description={description}
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
WorkingDirectory={workdir}
ExecStart={binary} run
Restart=on-failure
RestartSec={restart_sec}

[Install]
WantedBy=multi-user.target
"#,
        description = config.service.description,
        workdir = config.tunnel.install_dir.display(),
        binary = config.tunnel.binary_path().display(),
        restart_sec = config.service.restart_sec,
    )
}

fn systemctl(action: &str, unit: &str) -> HostCommand {
    HostCommand::privileged("systemctl").args([action, unit])
}

fn systemctl_query(query: &str, unit: &str) -> HostCommand {
    HostCommand::new("systemctl").args([query, "--quiet", unit])
}

#[async_trait::async_trait]
impl ProvisionStep for ServiceStep {
    fn name(&self) -> &str {
        "service"
    }

    fn description(&self) -> &str {
        "Install, enable and start the systemd unit"
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        let service = &ctx.config.service;
        let executor = ctx.executor();
        let unit = service.unit_name();
        let mut changes = ChangeSet::new();

        let desired = render_unit(ctx.config);
        let current = executor.read_to_string(&service.unit_path).await?;
        let unit_changed = current.as_deref() != Some(desired.as_str());

        if unit_changed {
            executor
                .write_file(&service.unit_path, desired.as_bytes())
                .await?;
            changes.record(format!("Wrote {}", service.unit_path.display()));

            HostCommand::privileged("systemctl")
                .arg("daemon-reload")
                .run_checked(executor, ProvisionError::external_service)
                .await?;
            changes.record("Reloaded systemd units");
        } else {
            debug!("{} is up to date", service.unit_path.display());
        }

        if !systemctl_query("is-enabled", &unit).check(executor).await? {
            systemctl("enable", &unit)
                .run_checked(executor, ProvisionError::external_service)
                .await?;
            changes.record(format!("Enabled {}", unit));
        }

        let active = systemctl_query("is-active", &unit).check(executor).await?;
        if !active {
            systemctl("start", &unit)
                .run_checked(executor, ProvisionError::external_service)
                .await?;
            changes.record(format!("Started {}", unit));
        } else if unit_changed || ctx.changed_earlier(TUNNEL_STEP) {
            systemctl("restart", &unit)
                .run_checked(executor, ProvisionError::external_service)
                .await?;
            changes.record(format!(
                "Restarted {} to pick up the new unit or tunnel files",
                unit
            ));
        } else {
            info!("{} is already running", unit);
        }

        Ok(changes.into_outcome(format!("{} already enabled and running", unit)))
    }

    async fn verify(&self, ctx: &StepContext<'_>) -> Result<()> {
        let unit = ctx.config.service.unit_name();
        if systemctl_query("is-active", &unit)
            .check(ctx.executor())
            .await?
        {
            Ok(())
        } else {
            Err(ProvisionError::external_service(format!(
                "{} is not active after start; see journalctl -u {}",
                unit, unit
            )))
        }
    }
}
