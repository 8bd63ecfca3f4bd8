// file: src/steps/dns.rs
// version: 1.0.0
// guid: d0f25b83-6e4a-4c19-b7a2-38e9f1c6d705

//! systemd-resolved reconfiguration: stub listener off, upstream server added

use super::{ChangeSet, ProvisionStep, StepContext, StepOutcome};
use crate::error::ProvisionError;
use crate::network::HostCommand;
use crate::Result;
use tracing::{debug, info};

const SECTION: &str = "[Resolve]";
const STUB_KEY: &str = "DNSStubListener";
const DNS_KEY: &str = "DNS";

pub struct DnsStep;

/// Key of an active `Key=value` line, `None` for comments, blanks and headers
fn active_key(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') || trimmed.starts_with(';') || trimmed.starts_with('[') {
        return None;
    }
    trimmed
        .split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
}

fn is_commented_key(line: &str, key: &str) -> bool {
    let trimmed = line.trim_start();
    let Some(rest) = trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix(';'))
    else {
        return false;
    };
    matches!(rest.trim_start().split_once('='), Some((k, _)) if k.trim() == key)
}

/// Bounds `(header, end)` of the `[Resolve]` section; `end` is exclusive
fn section_bounds(lines: &[String]) -> Option<(usize, usize)> {
    let header = lines.iter().position(|l| l.trim() == SECTION)?;
    let end = lines[header + 1..]
        .iter()
        .position(|l| l.trim_start().starts_with('['))
        .map_or(lines.len(), |offset| header + 1 + offset);
    Some((header, end))
}

/// Index just past the last non-blank line of the section
fn insertion_point(lines: &[String], header: usize, end: usize) -> usize {
    (header + 1..end)
        .rev()
        .find(|&i| !lines[i].trim().is_empty())
        .map_or(header + 1, |i| i + 1)
}

/// Rewrite resolved.conf content so the stub listener is disabled and
/// `upstream` is among the configured DNS servers.
///
/// Returns `None` when the content already satisfies both.
pub fn converge_resolved_conf(content: &str, upstream: &str) -> Option<String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut edited = false;

    if section_bounds(&lines).is_none() {
        if lines.last().is_some_and(|l| !l.trim().is_empty()) {
            lines.push(String::new());
        }
        lines.push(SECTION.to_string());
        edited = true;
    }

    // Section bounds are recomputed after each edit since inserts shift them
    if let Some((header, end)) = section_bounds(&lines) {
        let active = (header + 1..end)
            .filter(|&i| matches!(active_key(&lines[i]), Some((k, _)) if k == STUB_KEY))
            .last();

        match active {
            Some(i) => {
                if !matches!(active_key(&lines[i]), Some((_, v)) if v == "no") {
                    lines[i] = format!("{}=no", STUB_KEY);
                    edited = true;
                }
            }
            None => {
                match (header + 1..end).find(|&i| is_commented_key(&lines[i], STUB_KEY)) {
                    Some(i) => lines[i] = format!("{}=no", STUB_KEY),
                    None => {
                        let at = insertion_point(&lines, header, end);
                        lines.insert(at, format!("{}=no", STUB_KEY));
                    }
                }
                edited = true;
            }
        }
    }

    if let Some((header, end)) = section_bounds(&lines) {
        let listed = (header + 1..end).any(|i| {
            matches!(active_key(&lines[i]), Some((k, v))
                if k == DNS_KEY && v.split_whitespace().any(|server| server_address(server) == upstream))
        });

        if !listed {
            let at = insertion_point(&lines, header, end);
            lines.insert(at, format!("{}={}", DNS_KEY, upstream));
            edited = true;
        }
    }

    if !edited {
        return None;
    }

    let mut converged = lines.join("\n");
    converged.push('\n');
    Some(converged)
}

/// Address part of a `DNS=` entry, dropping the `#server-name` suffix
fn server_address(server: &str) -> &str {
    server.split_once('#').map_or(server, |(address, _)| address)
}

#[async_trait::async_trait]
impl ProvisionStep for DnsStep {
    fn name(&self) -> &str {
        "dns"
    }

    fn description(&self) -> &str {
        "Disable the resolver stub listener and add the upstream DNS server"
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        let dns = &ctx.config.dns;
        let executor = ctx.executor();
        let mut changes = ChangeSet::new();

        let current = executor
            .read_to_string(&dns.resolved_conf)
            .await?
            .unwrap_or_default();

        match converge_resolved_conf(&current, &dns.upstream) {
            Some(updated) => {
                debug!("New {}:\n{}", dns.resolved_conf.display(), updated);
                executor
                    .write_file(&dns.resolved_conf, updated.as_bytes())
                    .await?;
                changes.record(format!(
                    "Updated {} ({}=no, {}={})",
                    dns.resolved_conf.display(),
                    STUB_KEY,
                    DNS_KEY,
                    dns.upstream
                ));

                HostCommand::privileged("systemctl")
                    .args(["restart", dns.service.as_str()])
                    .run_checked(executor, ProvisionError::external_service)
                    .await?;
                changes.record(format!("Restarted {}", dns.service));
            }
            None => info!(
                "{} already has the stub listener disabled and {} configured",
                dns.resolved_conf.display(),
                dns.upstream
            ),
        }

        Ok(changes.into_outcome("resolver already configured"))
    }

    async fn verify(&self, ctx: &StepContext<'_>) -> Result<()> {
        let dns = &ctx.config.dns;
        let content = ctx
            .executor()
            .read_to_string(&dns.resolved_conf)
            .await?
            .unwrap_or_default();

        if converge_resolved_conf(&content, &dns.upstream).is_some() {
            return Err(ProvisionError::external_service(format!(
                "{} does not hold the expected resolver settings",
                dns.resolved_conf.display()
            )));
        }
        Ok(())
    }
}
