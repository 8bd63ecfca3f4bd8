// file: src/steps/packages.rs
// version: 1.0.0
// guid: 8c3e6a51-b9d7-4f02-a4e6-2d71f5c8b093

//! Package installation through apt

use super::{ChangeSet, ProvisionStep, StepContext, StepOutcome};
use crate::error::ProvisionError;
use crate::network::{HostCommand, HostExecutor};
use crate::Result;
use tracing::info;

pub struct PackagesStep;

/// Whether dpkg reports `package` as fully installed
pub async fn is_package_installed(executor: &dyn HostExecutor, package: &str) -> Result<bool> {
    let output = executor
        .run(&HostCommand::new("dpkg-query").args(["-W", "--showformat=${Status}", package]))
        .await?;
    Ok(output.success() && output.stdout.trim() == "install ok installed")
}

/// Packages from `packages` that are not installed yet, in input order
pub async fn missing_packages(
    executor: &dyn HostExecutor,
    packages: &[String],
) -> Result<Vec<String>> {
    let mut missing = Vec::new();
    for package in packages {
        if !is_package_installed(executor, package).await? {
            missing.push(package.clone());
        }
    }
    Ok(missing)
}

fn apt_get() -> HostCommand {
    HostCommand::privileged("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
}

#[async_trait::async_trait]
impl ProvisionStep for PackagesStep {
    fn name(&self) -> &str {
        "packages"
    }

    fn description(&self) -> &str {
        "Refresh the package index and install required packages"
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        let executor = ctx.executor();
        let mut changes = ChangeSet::new();

        let missing = missing_packages(executor, &ctx.config.packages).await?;
        if missing.is_empty() {
            info!("All {} packages already installed", ctx.config.packages.len());
            return Ok(changes.into_outcome("packages already installed"));
        }

        info!("Installing missing packages: {}", missing.join(" "));

        apt_get()
            .arg("update")
            .run_checked(executor, |msg| {
                ProvisionError::network(format!("Package index refresh failed: {}", msg))
            })
            .await?;
        changes.record("Refreshed package index");

        apt_get()
            .args(["install", "-y"])
            .args(missing.iter().cloned())
            .run_checked(executor, ProvisionError::package)
            .await?;
        changes.record(format!("Installed {}", missing.join(" ")));

        Ok(changes.into_outcome("packages already installed"))
    }

    async fn verify(&self, ctx: &StepContext<'_>) -> Result<()> {
        let missing = missing_packages(ctx.executor(), &ctx.config.packages).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::package(format!(
                "Packages still not installed: {}",
                missing.join(" ")
            )))
        }
    }
}
