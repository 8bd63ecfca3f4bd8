// file: src/steps/preflight.rs
// version: 1.0.0
// guid: 4a81c6e9-f2d5-4b37-90e8-7c3b5d16a2f4

//! Required command check, run before anything on the host is changed

use super::{ProvisionStep, StepContext, StepOutcome};
use crate::error::ProvisionError;
use crate::utils::SystemUtils;
use crate::Result;
use tracing::{error, info};

pub struct PreflightStep;

impl PreflightStep {
    /// Commands this run needs, including sudo when escalating
    pub fn required_commands(ctx: &StepContext<'_>) -> Vec<String> {
        let mut required = ctx.config.required_commands.clone();
        if ctx.host.escalate && !required.iter().any(|c| c == "sudo") {
            required.push("sudo".to_string());
        }
        required
    }
}

#[async_trait::async_trait]
impl ProvisionStep for PreflightStep {
    fn name(&self) -> &str {
        "preflight"
    }

    fn description(&self) -> &str {
        "Check that required commands are installed"
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        let required = Self::required_commands(ctx);
        let missing = SystemUtils::find_missing_commands(&required, ctx.host.search_path.clone());

        if !missing.is_empty() {
            error!("✗ Missing required commands: {}", missing.join(", "));
            return Err(ProvisionError::preflight(missing));
        }

        info!("✓ All {} required commands are available", required.len());
        Ok(StepOutcome::Unchanged(format!(
            "found {}",
            required.join(", ")
        )))
    }
}
