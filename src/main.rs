// file: src/main.rs
// version: 1.0.0
// guid: a52f8c1e-6d90-4b37-b8f4-1e7c3a95d026

//! Tunnel Provisioner - Main entry point

use clap::Parser;
use tokio::signal;
use tracing::{error, warn};
use tunnel_provisioner::{
    cli::{self, Cli, Commands},
    config::loader::ConfigLoader,
    logging::logger,
    network::LocalExecutor,
    ProvisionError, Result,
};

async fn execute(cli: Cli) -> Result<()> {
    let config = ConfigLoader::new().load_or_default(cli.config.as_deref())?;
    let host = cli::local_host(cli.non_interactive, cli.quiet)?;

    match cli.command() {
        Commands::Provision => cli::provision_command(config, host, cli.report.as_deref()).await,
        Commands::CheckPrereqs => cli::check_prerequisites_command(config, host).await,
        Commands::ShowConfig => cli::show_config_command(&config),
    }
}

// Single-threaded: steps run strictly one after another
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if cli.command() == Commands::ShowConfig {
        let result = ConfigLoader::new()
            .load_or_default(cli.config.as_deref())
            .and_then(|config| cli::show_config_command(&config));
        if let Err(e) = result {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
        return;
    }

    let executor = LocalExecutor::new();
    if let Err(e) = cli::prepare_log_file(&executor, executor.escalates(), &cli.log_file).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }

    if let Err(e) = logger::init_logger(cli.verbose, cli.quiet, &cli.log_file) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }

    let result = tokio::select! {
        result = execute(cli) => result,
        _ = signal::ctrl_c() => {
            warn!("Received Ctrl+C, abandoning the run; the log shows the last completed step");
            Err(ProvisionError::Interrupted)
        }
    };

    if let Err(e) = result {
        error!("Provisioning failed ({}): {}", e.kind(), e);
        std::process::exit(e.exit_code());
    }
}
