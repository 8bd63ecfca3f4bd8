// file: src/network/executor.rs
// version: 1.0.0
// guid: 9d4f1e26-3a8b-47c0-b5e9-81f2a6c7d043

//! Command and file execution seam between provisioning steps and the host

use crate::error::ProvisionError;
use crate::Result;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single external command to run on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Needs superuser rights; escalated through sudo when not root
    pub privileged: bool,
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Trait for executing commands and touching files on the provisioned host
#[async_trait::async_trait]
pub trait HostExecutor: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// A nonzero exit is not an error here; only a failure to spawn is.
    async fn run(&self, command: &HostCommand) -> Result<CommandOutput>;

    /// Read a file, `None` if it does not exist
    async fn read_to_string(&self, path: &Path) -> Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether a path exists
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    /// Create a directory and its parents
    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    /// Replace a file's contents
    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    /// Copy `src` to `dest` and apply `mode`
    async fn install_file(&self, src: &Path, dest: &Path, mode: u32) -> Result<()> {
        tokio::fs::copy(src, dest).await?;
        self.set_mode(dest, mode).await
    }

    /// Current permission bits of a file
    async fn mode(&self, path: &Path) -> Result<u32> {
        use std::os::unix::fs::PermissionsExt;
        let metadata = tokio::fs::metadata(path).await?;
        Ok(metadata.permissions().mode() & 0o7777)
    }

    /// Set permission bits on a file
    async fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
        Ok(())
    }
}

impl HostCommand {
    /// Create an unprivileged command
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            privileged: false,
        }
    }

    /// Create a command that requires superuser rights
    pub fn privileged(program: impl Into<String>) -> Self {
        Self {
            privileged: true,
            ..Self::new(program)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Run on `executor` and turn a nonzero exit into the error built by `on_failure`
    pub async fn run_checked<F>(
        &self,
        executor: &dyn HostExecutor,
        on_failure: F,
    ) -> Result<CommandOutput>
    where
        F: FnOnce(String) -> ProvisionError + Send,
    {
        let output = executor.run(self).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(on_failure(format!(
                "'{}' failed with exit code {}: {}",
                self,
                output
                    .code
                    .map_or_else(|| "none".to_string(), |c| c.to_string()),
                output.diagnostic()
            )))
        }
    }

    /// Run on `executor` and report only whether it exited zero
    pub async fn check(&self, executor: &dyn HostExecutor) -> Result<bool> {
        Ok(executor.run(self).await?.success())
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The most useful stream for an error message
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}
