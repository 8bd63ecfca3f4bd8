// file: tests/integration_test.rs
// version: 1.0.0
// guid: 7f3c0a6d-e9b2-4185-a6d7-2c4e8b1f9053

//! Integration tests for the tunnel provisioner

use std::collections::{HashSet, VecDeque};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tunnel_provisioner::{
    cli::prompt::Prompter,
    config::{loader::ConfigLoader, ProvisionConfig},
    installer::Provisioner,
    network::{CommandOutput, HostCommand, HostExecutor, HttpFetcher},
    steps::{Host, StepStatus},
    ProvisionError, Result,
};

const STOCK_RESOLVED_CONF: &str = "\
[Resolve]
#DNS=
#FallbackDNS=
#DNSStubListener=yes
";

/// Simulated host: records commands, tracks packages and unit state
#[derive(Default)]
struct FakeHost {
    commands: Mutex<Vec<String>>,
    installed: Mutex<HashSet<String>>,
    enabled: Mutex<bool>,
    active: Mutex<bool>,
    fail_index_refresh: bool,
    fail_install: bool,
    write_server_entry: bool,
    unit: String,
}

impl FakeHost {
    fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            write_server_entry: true,
            ..Self::default()
        }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn clear_commands(&self) {
        self.commands.lock().unwrap().clear();
    }

    fn generate(&self, command: &HostCommand) -> CommandOutput {
        let ip = command
            .args
            .iter()
            .position(|a| a == "--ipaddress")
            .and_then(|i| command.args.get(i + 1))
            .cloned()
            .unwrap_or_default();
        let Some(dir) = &command.cwd else {
            return CommandOutput::failed(1, "no working directory");
        };
        std::fs::write(
            dir.join("psiphond.config"),
            format!(
                "{{\n  \"LogLevel\": \"info\",\n  \"ServerIPAddress\": \"{}\",\n  \"WebServerPort\": 8000\n}}\n",
                ip
            ),
        )
        .unwrap();
        if self.write_server_entry {
            std::fs::write(dir.join("server-entry.dat"), "3132372e302e302e31\n").unwrap();
        }
        CommandOutput::ok("")
    }
}

#[async_trait::async_trait]
impl HostExecutor for FakeHost {
    async fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();

        let output = match (command.program.as_str(), args.as_slice()) {
            ("dpkg-query", [.., package]) => {
                if self.installed.lock().unwrap().contains(*package) {
                    CommandOutput::ok("install ok installed")
                } else {
                    CommandOutput::failed(1, "dpkg-query: no packages found")
                }
            }
            ("apt-get", ["update"]) if self.fail_index_refresh => {
                CommandOutput::failed(100, "Temporary failure resolving 'archive.ubuntu.com'")
            }
            ("apt-get", ["install", ..]) if self.fail_install => {
                CommandOutput::failed(100, "E: Unable to locate package net-tools")
            }
            ("apt-get", ["install", "-y", packages @ ..]) => {
                let mut installed = self.installed.lock().unwrap();
                installed.extend(packages.iter().map(|p| p.to_string()));
                CommandOutput::ok("")
            }
            ("systemctl", ["is-enabled", "--quiet", unit]) if *unit == self.unit => {
                if *self.enabled.lock().unwrap() {
                    CommandOutput::ok("")
                } else {
                    CommandOutput::failed(1, "")
                }
            }
            ("systemctl", ["is-active", "--quiet", unit]) if *unit == self.unit => {
                if *self.active.lock().unwrap() {
                    CommandOutput::ok("")
                } else {
                    CommandOutput::failed(3, "")
                }
            }
            ("systemctl", ["enable", unit]) if *unit == self.unit => {
                *self.enabled.lock().unwrap() = true;
                CommandOutput::ok("")
            }
            ("systemctl", ["start" | "restart", unit]) if *unit == self.unit => {
                *self.active.lock().unwrap() = true;
                CommandOutput::ok("")
            }
            (program, [.., "generate"]) if program.ends_with("/psiphond") => self.generate(command),
            _ => CommandOutput::ok(""),
        };
        Ok(output)
    }
}

/// Serves a fake binary and a fixed public address
struct FakeFetcher {
    downloads: AtomicUsize,
    ip_lookups: AtomicUsize,
    body: &'static [u8],
}

impl FakeFetcher {
    fn new() -> Self {
        Self {
            downloads: AtomicUsize::new(0),
            ip_lookups: AtomicUsize::new(0),
            body: b"#!/bin/sh\nexit 0\n",
        }
    }
}

#[async_trait::async_trait]
impl HttpFetcher for FakeFetcher {
    async fn download(&self, _url: &str, dest: &Path) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, self.body).await?;
        Ok(())
    }

    async fn fetch_text(&self, _url: &str) -> Result<String> {
        self.ip_lookups.fetch_add(1, Ordering::SeqCst);
        Ok("203.0.113.7\n".to_string())
    }
}

/// Replays scripted answers and remembers the questions asked
struct ScriptedPrompter {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, question: &str) -> Result<bool> {
        self.asked.lock().unwrap().push(question.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
    }
}

struct Fixture {
    dir: TempDir,
    config: ProvisionConfig,
    bin_dir: PathBuf,
    executor: Arc<FakeHost>,
    fetcher: Arc<FakeFetcher>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let bin_dir = dir.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();

        let mut config = ProvisionConfig::default();
        config.dns.resolved_conf = dir.path().join("resolved.conf");
        config.tunnel.install_dir = dir.path().join("opt").join("psiphon");
        config.service.unit_path = dir.path().join("psiphond.service");
        std::fs::write(&config.dns.resolved_conf, STOCK_RESOLVED_CONF).unwrap();

        for cmd in &config.required_commands {
            let path = bin_dir.join(cmd);
            std::fs::write(&path, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let executor = Arc::new(FakeHost::new(&config.service.unit_name()));
        Self {
            dir,
            config,
            bin_dir,
            executor,
            fetcher: Arc::new(FakeFetcher::new()),
        }
    }

    fn host(&self, prompter: Arc<ScriptedPrompter>) -> Host {
        Host {
            executor: self.executor.clone(),
            fetcher: self.fetcher.clone(),
            prompter,
            escalate: false,
            search_path: Some(self.bin_dir.as_os_str().to_owned()),
        }
    }

    fn provisioner(&self, answers: &[bool]) -> Provisioner {
        Provisioner::new(
            self.config.clone(),
            self.host(Arc::new(ScriptedPrompter::new(answers))),
        )
    }

    fn resolved_conf(&self) -> String {
        std::fs::read_to_string(&self.config.dns.resolved_conf).unwrap()
    }
}

#[tokio::test]
async fn test_full_run_enables_and_starts_service() -> Result<()> {
    let fixture = Fixture::new();
    let prompter = Arc::new(ScriptedPrompter::new(&[false, false]));
    let provisioner = Provisioner::new(fixture.config.clone(), fixture.host(prompter.clone()));

    let report = provisioner.run().await?;

    assert_eq!(
        report.statuses(),
        vec![
            ("preflight", StepStatus::Unchanged),
            ("dns", StepStatus::Changed),
            ("packages", StepStatus::Changed),
            ("tunnel", StepStatus::Changed),
            ("service", StepStatus::Changed),
            ("post-install", StepStatus::Unchanged),
        ]
    );
    let numbers: Vec<usize> = report.steps.iter().map(|s| s.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);

    assert!(*fixture.executor.enabled.lock().unwrap());
    assert!(*fixture.executor.active.lock().unwrap());

    let binary = fixture.config.tunnel.binary_path();
    let mode = std::fs::metadata(&binary)?.permissions().mode();
    assert_eq!(mode & 0o777, 0o755);

    let generated = std::fs::read_to_string(fixture.config.tunnel.config_path())?;
    assert!(generated.contains(r#""ServerIPAddress": "0.0.0.0""#));

    let unit = std::fs::read_to_string(&fixture.config.service.unit_path)?;
    assert!(unit.contains(&format!("ExecStart={} run", binary.display())));
    assert!(unit.contains("Restart=on-failure"));
    assert!(unit.contains("RestartSec=10"));

    let commands = fixture.executor.commands();
    assert!(commands.contains(&"systemctl restart systemd-resolved".to_string()));
    assert!(commands.contains(&"systemctl daemon-reload".to_string()));
    assert!(commands
        .iter()
        .any(|c| c.ends_with("--ipaddress 203.0.113.7 --protocol OSSH:53 --protocol UNFRONTED-MEEK-OSSH:443 generate")));
    assert!(!commands.iter().any(|c| c.contains("reboot")));

    assert_eq!(prompter.asked.lock().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_second_run_converges_without_changes() -> Result<()> {
    let fixture = Fixture::new();
    fixture.provisioner(&[]).run().await?;
    fixture.executor.clear_commands();

    let report = fixture.provisioner(&[]).run().await?;

    assert!(report
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Unchanged));
    assert_eq!(fixture.resolved_conf().matches("DNS=8.8.8.8").count(), 1);
    assert_eq!(fixture.fetcher.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.fetcher.ip_lookups.load(Ordering::SeqCst), 1);

    let commands = fixture.executor.commands();
    assert!(!commands.iter().any(|c| c.contains("apt-get")));
    assert!(!commands.iter().any(|c| c.contains("restart")));
    Ok(())
}

#[tokio::test]
async fn test_missing_commands_abort_before_any_change() {
    let fixture = Fixture::new();
    std::fs::remove_file(fixture.bin_dir.join("dpkg-query")).unwrap();

    let (report, result) = fixture.provisioner(&[]).run_with_report().await;

    match result {
        Err(ProvisionError::Preflight { missing }) => {
            assert_eq!(missing, vec!["dpkg-query".to_string()]);
        }
        other => panic!("expected preflight error, got {:?}", other),
    }
    assert_eq!(report.statuses(), vec![("preflight", StepStatus::Failed)]);
    assert!(fixture.executor.commands().is_empty());
    assert_eq!(fixture.resolved_conf(), STOCK_RESOLVED_CONF);
}

#[tokio::test]
async fn test_index_refresh_failure_is_network_error() {
    let mut fixture = Fixture::new();
    let mut executor = FakeHost::new(&fixture.config.service.unit_name());
    executor.fail_index_refresh = true;
    fixture.executor = Arc::new(executor);

    let (report, result) = fixture.provisioner(&[]).run_with_report().await;

    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert!(err.to_string().contains("Package index refresh failed"));
    assert_eq!(
        report.statuses(),
        vec![
            ("preflight", StepStatus::Unchanged),
            ("dns", StepStatus::Changed),
            ("packages", StepStatus::Failed),
        ]
    );
    assert_eq!(fixture.fetcher.downloads.load(Ordering::SeqCst), 0);
    assert!(!fixture.config.tunnel.install_dir.exists());
}

#[tokio::test]
async fn test_package_install_failure_is_package_error() {
    let mut fixture = Fixture::new();
    let mut executor = FakeHost::new(&fixture.config.service.unit_name());
    executor.fail_install = true;
    fixture.executor = Arc::new(executor);

    let (report, result) = fixture.provisioner(&[]).run_with_report().await;

    let err = result.unwrap_err();
    assert!(matches!(err, ProvisionError::Package(_)));
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("Unable to locate package"));
    assert_eq!(
        report.steps.last().map(|s| (s.name.as_str(), s.status)),
        Some(("packages", StepStatus::Failed))
    );
    assert!(!fixture.config.tunnel.install_dir.exists());
}

#[tokio::test]
async fn test_log_file_records_each_step_in_order() -> Result<()> {
    let mut fixture = Fixture::new();
    let mut executor = FakeHost::new(&fixture.config.service.unit_name());
    executor.write_server_entry = false;
    fixture.executor = Arc::new(executor);

    let log_path = fixture.dir.path().join("provision.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_target(false)
        .with_max_level(tracing::Level::INFO)
        .with_writer(Mutex::new(file))
        .finish();

    {
        let _guard = tracing::subscriber::set_default(subscriber);
        fixture.provisioner(&[true, false]).run().await?;
    }

    let log = std::fs::read_to_string(&log_path)?;
    let steps = ["preflight", "dns", "packages", "tunnel", "service", "post-install"];
    let positions: Vec<usize> = steps
        .iter()
        .enumerate()
        .map(|(i, name)| {
            log.find(&format!("[{}/6] {}:", i + 1, name))
                .unwrap_or_else(|| panic!("no start line for {} in:\n{}", name, log))
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let missing_entry = format!(
        "Server entry file {} not found",
        fixture.config.tunnel.server_entry_path().display()
    );
    let warning = log
        .lines()
        .find(|line| line.contains(&missing_entry))
        .expect("missing server entry is logged");
    assert!(warning.contains("WARN"));
    assert!(positions[5] < log.find(&missing_entry).unwrap());
    Ok(())
}

#[tokio::test]
async fn test_tunnel_change_restarts_running_service() -> Result<()> {
    let fixture = Fixture::new();
    fixture.provisioner(&[]).run().await?;
    fixture.executor.clear_commands();

    let config_path = fixture.config.tunnel.config_path();
    let drifted = std::fs::read_to_string(&config_path)?.replace("0.0.0.0", "203.0.113.7");
    std::fs::write(&config_path, drifted)?;

    let report = fixture.provisioner(&[]).run().await?;

    assert_eq!(
        report.statuses()[3..5],
        [
            ("tunnel", StepStatus::Changed),
            ("service", StepStatus::Changed),
        ]
    );
    let commands = fixture.executor.commands();
    assert!(commands.contains(&"systemctl restart psiphond.service".to_string()));
    assert!(!commands.contains(&"systemctl daemon-reload".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_reboot_and_missing_server_entry() -> Result<()> {
    let mut fixture = Fixture::new();
    let mut executor = FakeHost::new(&fixture.config.service.unit_name());
    executor.write_server_entry = false;
    fixture.executor = Arc::new(executor);

    let report = fixture.provisioner(&[true, true]).run().await?;

    assert!(!fixture.config.tunnel.server_entry_path().exists());
    assert_eq!(report.steps[5].status, StepStatus::Changed);
    assert!(fixture
        .executor
        .commands()
        .contains(&"systemctl reboot".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_no_binary() {
    let mut fixture = Fixture::new();
    fixture.config.tunnel.binary_sha256 = Some("0".repeat(64));

    let (report, result) = fixture.provisioner(&[]).run_with_report().await;

    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), 8);
    assert_eq!(report.steps.last().map(|s| s.name.as_str()), Some("tunnel"));
    assert!(!fixture.config.tunnel.binary_path().exists());
}

#[tokio::test]
async fn test_existing_config_bind_address_is_patched() -> Result<()> {
    let fixture = Fixture::new();
    let tunnel = &fixture.config.tunnel;
    std::fs::create_dir_all(&tunnel.install_dir)?;
    std::fs::write(tunnel.binary_path(), "#!/bin/sh\n")?;
    std::fs::set_permissions(tunnel.binary_path(), std::fs::Permissions::from_mode(0o644))?;
    std::fs::write(
        tunnel.config_path(),
        r#"{"ServerIPAddress": "10.1.2.3", "WebServerPort": 8000}"#,
    )?;

    fixture.provisioner(&[]).run().await?;

    let patched = std::fs::read_to_string(tunnel.config_path())?;
    assert_eq!(patched, r#"{"ServerIPAddress": "0.0.0.0", "WebServerPort": 8000}"#);
    assert_eq!(fixture.fetcher.downloads.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.fetcher.ip_lookups.load(Ordering::SeqCst), 0);

    let mode = std::fs::metadata(tunnel.binary_path())?.permissions().mode();
    assert_eq!(mode & 0o111, 0o111);
    Ok(())
}

#[tokio::test]
async fn test_config_file_overrides_are_used() -> Result<()> {
    let fixture = Fixture::new();
    let config_path = fixture.dir.path().join("provision.yaml");
    tokio::fs::write(
        &config_path,
        format!(
            "dns:\n  resolved_conf: {}\n  upstream: 1.1.1.1\n",
            fixture.config.dns.resolved_conf.display()
        ),
    )
    .await?;

    let loader = ConfigLoader::new();
    let mut config = loader.load_or_default(Some(&config_path))?;
    config.tunnel = fixture.config.tunnel.clone();
    config.service = fixture.config.service.clone();

    let prompter = Arc::new(ScriptedPrompter::new(&[]));
    Provisioner::new(config, fixture.host(prompter)).run().await?;

    let resolved = fixture.resolved_conf();
    assert!(resolved.contains("DNS=1.1.1.1\n"));
    assert!(!resolved.contains("DNS=8.8.8.8"));
    Ok(())
}

mod cli {
    use assert_cmd::Command;
    use predicates::prelude::*;

    #[test]
    fn test_help_lists_subcommands() {
        Command::cargo_bin("tunnel-provisioner")
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("check-prereqs"))
            .stdout(predicate::str::contains("--non-interactive"));
    }

    #[test]
    fn test_show_config_prints_defaults() {
        Command::cargo_bin("tunnel-provisioner")
            .unwrap()
            .arg("show-config")
            .assert()
            .success()
            .stdout(predicate::str::contains("install_dir: /opt/psiphon"))
            .stdout(predicate::str::contains("OSSH:53"));
    }

    #[test]
    fn test_missing_config_variable_exits_with_config_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("provision.yaml");
        std::fs::write(&config, "dns:\n  upstream: ${TUNNEL_PROVISIONER_UNSET_TEST_VAR}\n").unwrap();

        Command::cargo_bin("tunnel-provisioner")
            .unwrap()
            .args(["show-config", "--config"])
            .arg(&config)
            .env_remove("TUNNEL_PROVISIONER_UNSET_TEST_VAR")
            .assert()
            .code(6)
            .stderr(predicate::str::contains("TUNNEL_PROVISIONER_UNSET_TEST_VAR"));
    }

    #[test]
    fn test_check_prereqs_reports_missing_commands() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("provision.log");

        Command::cargo_bin("tunnel-provisioner")
            .unwrap()
            .arg("check-prereqs")
            .arg("--log-file")
            .arg(&log_file)
            .env("PATH", dir.path())
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Missing required commands"));

        let log = std::fs::read_to_string(&log_file).unwrap();
        assert!(log.contains("apt-get"));
    }
}
