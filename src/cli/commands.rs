// file: src/cli/commands.rs
// version: 1.0.0
// guid: 0e6d4a97-b5f3-4c28-8a1d-7f92c3e5b064

//! Command implementations for the CLI

use super::prompt::{NonInteractive, Prompter, StdinPrompter};
use crate::{
    config::ProvisionConfig,
    installer::Provisioner,
    logging::with_async_operation_span,
    error::ProvisionError,
    network::{HostCommand, HostExecutor, LocalExecutor, NetworkDownloader},
    steps::{Host, PreflightStep, ProvisionStep},
    utils::SystemUtils,
    Result,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Build the real host collaborators for this machine
pub fn local_host(non_interactive: bool, quiet: bool) -> Result<Host> {
    let executor = LocalExecutor::new();
    let escalate = executor.escalates();

    let mut downloader = NetworkDownloader::new()?;
    if quiet {
        downloader = downloader.without_progress();
    }

    let prompter: Arc<dyn Prompter> = if non_interactive {
        Arc::new(NonInteractive)
    } else {
        Arc::new(StdinPrompter)
    };

    Ok(Host {
        executor: Arc::new(executor),
        fetcher: Arc::new(downloader),
        prompter,
        escalate,
        search_path: None,
    })
}

/// Whether the process itself can append to `path`, creating it if needed
async fn log_file_writable(path: &Path) -> bool {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if tokio::fs::create_dir_all(parent).await.is_err() {
            return false;
        }
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .is_ok()
}

/// Make the log file appendable by an unprivileged run.
///
/// When escalating and the file cannot be opened directly, it is created
/// through sudo and handed to the invoking user; existing content is kept.
pub async fn prepare_log_file(
    executor: &dyn HostExecutor,
    escalate: bool,
    path: &Path,
) -> Result<()> {
    if !escalate || log_file_writable(path).await {
        return Ok(());
    }

    let on_failure = |msg: String| {
        ProvisionError::config(format!(
            "Cannot prepare log file {} (use --log-file to choose another path): {}",
            path.display(),
            msg
        ))
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        HostCommand::privileged("mkdir")
            .arg("-p")
            .arg(parent.display().to_string())
            .run_checked(executor, on_failure)
            .await?;
    }
    HostCommand::privileged("touch")
        .arg(path.display().to_string())
        .run_checked(executor, on_failure)
        .await?;
    HostCommand::privileged("chown")
        .arg(SystemUtils::owner_spec())
        .arg(path.display().to_string())
        .run_checked(executor, on_failure)
        .await?;
    Ok(())
}

/// Run the full provisioning procedure
pub async fn provision_command(
    config: ProvisionConfig,
    host: Host,
    report_path: Option<&Path>,
) -> Result<()> {
    if host.escalate {
        info!("Not running as root; privileged commands will use sudo");
    }

    let provisioner = Provisioner::new(config, host);
    let (report, result) =
        with_async_operation_span("provision", || provisioner.run_with_report()).await;

    report.print_summary();
    if let Some(path) = report_path {
        if let Err(e) = report.write_json(path).await {
            warn!("Failed to write report to {}: {}", path.display(), e);
        }
    }

    result
}

/// Check system prerequisites without changing anything
pub async fn check_prerequisites_command(config: ProvisionConfig, host: Host) -> Result<()> {
    info!("Checking prerequisites for provisioning");

    if SystemUtils::is_root() {
        info!("✓ Running as root");
    } else {
        info!("⚠ Not running as root - privileged steps will go through sudo");
    }

    let steps: Vec<Box<dyn ProvisionStep>> = vec![Box::new(PreflightStep)];
    Provisioner::with_steps(config, host, steps).run().await?;

    info!("System is ready for provisioning");
    Ok(())
}

/// Print the effective configuration
pub fn show_config_command(config: &ProvisionConfig) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
