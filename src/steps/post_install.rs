// file: src/steps/post_install.rs
// version: 1.0.0
// guid: 57d1a8c3-e06f-4b92-9a45-0b3c8f6e21d7

//! Operator questions after installation: show the server entry, reboot

use super::{ChangeSet, ProvisionStep, StepContext, StepOutcome};
use crate::error::ProvisionError;
use crate::network::HostCommand;
use crate::Result;
use tracing::{info, warn};

pub struct PostInstallStep;

impl PostInstallStep {
    async fn offer_server_entry(ctx: &StepContext<'_>) -> Result<()> {
        let path = ctx.config.tunnel.server_entry_path();
        if !ctx
            .prompter()
            .confirm("Display the server entry now?")
            .await?
        {
            info!("Server entry not displayed; it is stored at {}", path.display());
            return Ok(());
        }

        match ctx.executor().read_to_string(&path).await? {
            Some(entry) => {
                info!("Displaying server entry from {}", path.display());
                println!("{}", entry.trim_end());
            }
            None => warn!("Server entry file {} not found", path.display()),
        }
        Ok(())
    }

    async fn offer_reboot(ctx: &StepContext<'_>, changes: &mut ChangeSet) -> Result<()> {
        if !ctx.prompter().confirm("Reboot now?").await? {
            info!("Reboot skipped; reboot the host later to complete provisioning");
            return Ok(());
        }

        info!("Rebooting");
        HostCommand::privileged("systemctl")
            .arg("reboot")
            .run_checked(ctx.executor(), ProvisionError::external_service)
            .await?;
        changes.record("Reboot requested");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProvisionStep for PostInstallStep {
    fn name(&self) -> &str {
        "post-install"
    }

    fn description(&self) -> &str {
        "Offer to show the server entry and to reboot"
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        let mut changes = ChangeSet::new();
        Self::offer_server_entry(ctx).await?;
        Self::offer_reboot(ctx, &mut changes).await?;
        Ok(changes.into_outcome("reboot deferred"))
    }
}
