// file: src/steps/mod.rs
// version: 1.0.0
// guid: b7e40d19-3c6a-45f2-8d9b-e5a1c03f7826

//! Provisioning steps
//!
//! Each step inspects the host before mutating it and only changes what is
//! not already in the target state, so a step can be re-run on its own.

pub mod dns;
pub mod packages;
pub mod post_install;
pub mod preflight;
pub mod service;
pub mod tunnel;

pub use dns::DnsStep;
pub use packages::PackagesStep;
pub use post_install::PostInstallStep;
pub use preflight::PreflightStep;
pub use service::ServiceStep;
pub use tunnel::TunnelStep;

use crate::cli::prompt::Prompter;
use crate::config::ProvisionConfig;
use crate::network::{HostExecutor, HttpFetcher};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// External collaborators the steps act through
#[derive(Clone)]
pub struct Host {
    pub executor: Arc<dyn HostExecutor>,
    pub fetcher: Arc<dyn HttpFetcher>,
    pub prompter: Arc<dyn Prompter>,
    /// Privileged work goes through sudo, which then must be installed
    pub escalate: bool,
    /// Search path for the preflight lookup; `None` means the process PATH
    pub search_path: Option<OsString>,
}

/// Context passed to each provisioning step
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Current provisioning run ID
    pub run_id: Uuid,

    pub config: &'a ProvisionConfig,

    pub host: &'a Host,

    /// Current step number (1-based)
    pub step_number: usize,

    pub total_steps: usize,

    /// Records of the steps that already finished in this run
    pub completed: &'a [StepRecord],
}

impl<'a> StepContext<'a> {
    pub fn executor(&self) -> &'a dyn HostExecutor {
        self.host.executor.as_ref()
    }

    pub fn fetcher(&self) -> &'a dyn HttpFetcher {
        self.host.fetcher.as_ref()
    }

    pub fn prompter(&self) -> &'a dyn Prompter {
        self.host.prompter.as_ref()
    }

    /// Whether the named step changed the host earlier in this run
    pub fn changed_earlier(&self, step: &str) -> bool {
        self.completed
            .iter()
            .any(|r| r.name == step && r.status == StepStatus::Changed)
    }
}

/// What a successful step did to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// At least one change was made
    Changed(String),
    /// The host was already in the target state
    Unchanged(String),
}

/// Status recorded for a step in the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Changed,
    Unchanged,
    Failed,
}

/// Record of one executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub number: usize,
    pub name: String,
    pub status: StepStatus,
    pub message: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

/// Trait for provisioning steps
#[async_trait::async_trait]
pub trait ProvisionStep: Send + Sync {
    /// Short identifier used in logs and reports
    fn name(&self) -> &str;

    /// What this step does
    fn description(&self) -> &str;

    /// Bring the host to this step's target state
    async fn apply(&self, ctx: &StepContext<'_>) -> Result<StepOutcome>;

    /// Post-condition check, run after `apply` succeeds
    async fn verify(&self, _ctx: &StepContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Accumulates the changes a step makes so it can report changed/unchanged
#[derive(Debug, Default)]
pub struct ChangeSet {
    changes: Vec<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and remember one change made to the host
    pub fn record(&mut self, change: impl Into<String>) {
        let change = change.into();
        info!("{}", change);
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Summarize as an outcome; `unchanged` is reported when nothing was recorded
    pub fn into_outcome(self, unchanged: impl Into<String>) -> StepOutcome {
        if self.changes.is_empty() {
            StepOutcome::Unchanged(unchanged.into())
        } else {
            StepOutcome::Changed(self.changes.join("; "))
        }
    }
}

impl StepOutcome {
    pub fn status(&self) -> StepStatus {
        match self {
            Self::Changed(_) => StepStatus::Changed,
            Self::Unchanged(_) => StepStatus::Unchanged,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Changed(m) | Self::Unchanged(m) => m,
        }
    }
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// The steps of a full provisioning run, in required order
pub fn standard_steps() -> Vec<Box<dyn ProvisionStep>> {
    vec![
        Box::new(PreflightStep),
        Box::new(DnsStep),
        Box::new(PackagesStep),
        Box::new(TunnelStep),
        Box::new(ServiceStep),
        Box::new(PostInstallStep),
    ]
}
