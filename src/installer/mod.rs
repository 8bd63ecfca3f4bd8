// file: src/installer/mod.rs
// version: 1.0.0
// guid: c8a3f6e1-47b9-4d20-bd5c-e9026a1f73b4

//! Provisioning orchestrator
//!
//! Runs the configured steps in order and stops at the first failure. There
//! is no rollback: the report (and the log file) show how far the run got.

use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::steps::{self, Host, ProvisionStep, StepContext, StepRecord, StepStatus};
use crate::Result;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, Instrument};
use uuid::Uuid;

/// Result of a provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub run_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub steps: Vec<StepRecord>,
    /// Error message of the step that aborted the run
    pub failure: Option<String>,
}

/// Main provisioning orchestrator
pub struct Provisioner {
    config: ProvisionConfig,
    host: Host,
    run_id: Uuid,
    steps: Vec<Box<dyn ProvisionStep>>,
}

impl Provisioner {
    /// Create a provisioner running the full step sequence
    pub fn new(config: ProvisionConfig, host: Host) -> Self {
        Self::with_steps(config, host, steps::standard_steps())
    }

    /// Create a provisioner running an explicit step sequence
    pub fn with_steps(
        config: ProvisionConfig,
        host: Host,
        steps: Vec<Box<dyn ProvisionStep>>,
    ) -> Self {
        let run_id = Uuid::new_v4();
        info!("Creating provisioning run {}", run_id);
        Self {
            config,
            host,
            run_id,
            steps,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Names of the steps in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run all steps, returning the report on success
    pub async fn run(&self) -> Result<ProvisionReport> {
        let (report, result) = self.run_with_report().await;
        result.map(|()| report)
    }

    /// Run all steps; the report is returned even when a step fails
    pub async fn run_with_report(&self) -> (ProvisionReport, Result<()>) {
        let mut report = ProvisionReport {
            run_id: self.run_id,
            started_at: chrono::Utc::now(),
            finished_at: None,
            steps: Vec::with_capacity(self.steps.len()),
            failure: None,
        };

        let span = tracing::info_span!("provision", run = %self.run_id);
        let result = self
            .execute_steps(&mut report)
            .instrument(span)
            .await;

        report.finished_at = Some(chrono::Utc::now());
        if let Err(e) = &result {
            report.failure = Some(e.to_string());
        }
        (report, result)
    }

    async fn execute_steps(&self, report: &mut ProvisionReport) -> Result<()> {
        let total = self.steps.len();

        for (index, step) in self.steps.iter().enumerate() {
            let ctx = StepContext {
                run_id: self.run_id,
                config: &self.config,
                host: &self.host,
                step_number: index + 1,
                total_steps: total,
                completed: &report.steps,
            };

            match self.execute_step(step.as_ref(), &ctx).await {
                Ok(record) => report.steps.push(record),
                Err((record, e)) => {
                    report.steps.push(record);
                    error!(
                        "Provisioning aborted at step {}/{} ({}): {}",
                        index + 1,
                        total,
                        e.kind(),
                        e
                    );
                    return Err(e);
                }
            }
        }

        info!("Provisioning completed: {} steps", total);
        Ok(())
    }

    async fn execute_step(
        &self,
        step: &dyn ProvisionStep,
        ctx: &StepContext<'_>,
    ) -> std::result::Result<StepRecord, (StepRecord, ProvisionError)> {
        let started_at = chrono::Utc::now();
        let timer = Instant::now();
        let span = tracing::info_span!("step", name = step.name());

        let result = async {
            info!(
                "[{}/{}] {}: {}",
                ctx.step_number,
                ctx.total_steps,
                step.name(),
                step.description()
            );
            let outcome = step.apply(ctx).await?;
            step.verify(ctx).await?;
            Ok::<_, ProvisionError>(outcome)
        }
        .instrument(span)
        .await;

        let mut record = StepRecord {
            number: ctx.step_number,
            name: step.name().to_string(),
            status: StepStatus::Failed,
            message: String::new(),
            started_at,
            duration: timer.elapsed(),
        };

        match result {
            Ok(outcome) => {
                record.status = outcome.status();
                record.message = outcome.message().to_string();
                info!(
                    "[{}/{}] {} {}: {}",
                    ctx.step_number,
                    ctx.total_steps,
                    step.name(),
                    record.status.as_str(),
                    record.message
                );
                Ok(record)
            }
            Err(e) => {
                record.message = e.to_string();
                Err((record, e))
            }
        }
    }
}

impl ProvisionReport {
    /// Status of every step, in execution order
    pub fn statuses(&self) -> Vec<(&str, StepStatus)> {
        self.steps
            .iter()
            .map(|s| (s.name.as_str(), s.status))
            .collect()
    }

    /// Write the report as pretty JSON
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        info!("Report written to {}", path.display());
        Ok(())
    }

    /// Print a per-step summary table to stdout
    pub fn print_summary(&self) {
        println!();
        println!("{} {}", "Provisioning run".bold(), self.run_id);
        println!("{:<4} {:<14} {:<10} {:>8}  {}", "#", "Step", "Status", "Time", "Details");
        println!("{:-<72}", "");

        for step in &self.steps {
            let status = match step.status {
                StepStatus::Changed => step.status.as_str().yellow(),
                StepStatus::Unchanged => step.status.as_str().green(),
                StepStatus::Failed => step.status.as_str().red(),
            };
            println!(
                "{:<4} {:<14} {:<10} {:>7.1}s  {}",
                step.number,
                step.name,
                status,
                step.duration.as_secs_f64(),
                step.message
            );
        }

        if let Some(failure) = &self.failure {
            println!("{} {}", "✗".red(), failure);
        } else {
            println!("{} {}", "✓".green(), "All steps completed");
        }
    }
}
