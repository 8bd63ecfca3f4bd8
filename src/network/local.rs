// file: src/network/local.rs
// version: 1.0.0
// guid: 3e7a5c92-6d14-4f8b-a2c0-9b58e1d7f364

//! Local command execution for on-machine provisioning

use super::executor::{CommandOutput, HostCommand, HostExecutor};
use crate::error::ProvisionError;
use crate::utils::system::SystemUtils;
use crate::Result;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Executes commands on the local machine, escalating through sudo when not root
pub struct LocalExecutor {
    escalate: bool,
}

impl LocalExecutor {
    /// Create an executor that escalates only if the process is not already root
    pub fn new() -> Self {
        Self {
            escalate: !SystemUtils::is_root(),
        }
    }

    /// Create an executor with explicit escalation behavior
    pub fn with_escalation(escalate: bool) -> Self {
        Self { escalate }
    }

    /// Whether privileged operations go through sudo
    pub fn escalates(&self) -> bool {
        self.escalate
    }

    fn build_command(&self, command: &HostCommand) -> Command {
        let mut cmd = if command.privileged && self.escalate {
            let mut sudo = Command::new("sudo");
            if !command.env.is_empty() {
                sudo.arg("env");
                for (key, value) in &command.env {
                    sudo.arg(format!("{}={}", key, value));
                }
            }
            sudo.arg(&command.program);
            sudo
        } else {
            let mut direct = Command::new(&command.program);
            direct.envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            direct
        };

        cmd.args(&command.args);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run a privileged helper (mkdir, tee, install, chmod) and fail on nonzero exit
    async fn privileged_helper(&self, command: HostCommand, stdin: Option<&[u8]>) -> Result<()> {
        let mut cmd = self.build_command(&command);
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(&command, e))?;
        if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(data).await?;
            pipe.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ProvisionError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!(
                    "'{}' failed: {}",
                    command,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            )))
        }
    }
}

fn spawn_error(command: &HostCommand, e: std::io::Error) -> ProvisionError {
    ProvisionError::Io(std::io::Error::new(
        e.kind(),
        format!("Failed to execute '{}': {}", command.program, e),
    ))
}

/// `sudo test -e` equivalent for paths the process may not be able to stat
fn exists_command(path: &Path) -> HostCommand {
    HostCommand::privileged("test")
        .arg("-e")
        .arg(path.display().to_string())
}

/// `sudo cat` equivalent for files owned by root with restrictive modes
fn read_command(path: &Path) -> HostCommand {
    HostCommand::privileged("cat").arg(path.display().to_string())
}

fn octal(mode: u32) -> String {
    format!("{:o}", mode)
}

#[async_trait::async_trait]
impl HostExecutor for LocalExecutor {
    async fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        debug!("Executing local command: {}", command);

        let output = self
            .build_command(command)
            .output()
            .await
            .map_err(|e| spawn_error(command, e))?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if result.success() {
            debug!("Command succeeded: {}", command.program);
        } else {
            debug!("Command '{}' exited with {:?}", command, result.code);
            if !result.stderr.trim().is_empty() {
                debug!("STDERR: {}", result.stderr.trim());
            }
        }

        Ok(result)
    }

    async fn read_to_string(&self, path: &Path) -> Result<Option<String>> {
        if !self.escalate {
            return match tokio::fs::read_to_string(path).await {
                Ok(content) => Ok(Some(content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            };
        }
        if !self.exists(path).await? {
            return Ok(None);
        }

        let command = read_command(path);
        let output = self.run(&command).await?;
        if output.success() {
            Ok(Some(output.stdout))
        } else {
            Err(ProvisionError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("'{}' failed: {}", command, output.diagnostic()),
            )))
        }
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        if !self.escalate {
            return Ok(tokio::fs::try_exists(path).await?);
        }
        exists_command(path).check(self).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        if !self.escalate {
            tokio::fs::create_dir_all(path).await?;
            return Ok(());
        }
        let cmd = HostCommand::privileged("mkdir").arg("-p").arg(path.display().to_string());
        self.privileged_helper(cmd, None).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if !self.escalate {
            tokio::fs::write(path, contents).await?;
            return Ok(());
        }
        let cmd = HostCommand::privileged("tee").arg(path.display().to_string());
        self.privileged_helper(cmd, Some(contents)).await
    }

    async fn install_file(&self, src: &Path, dest: &Path, mode: u32) -> Result<()> {
        if !self.escalate {
            tokio::fs::copy(src, dest).await?;
            return self.set_mode(dest, mode).await;
        }
        let cmd = HostCommand::privileged("install")
            .args(["-m".to_string(), octal(mode)])
            .arg(src.display().to_string())
            .arg(dest.display().to_string());
        self.privileged_helper(cmd, None).await
    }

    async fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        if !self.escalate {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
            return Ok(());
        }
        let cmd = HostCommand::privileged("chmod")
            .arg(octal(mode))
            .arg(path.display().to_string());
        self.privileged_helper(cmd, None).await
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}
