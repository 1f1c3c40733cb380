//! Rendering rules to `iptables` and applying them.
//!
//! Managed rules live in dedicated chains hooked into the built-in ones, so
//! replacing the whole rule set is a flush of those chains followed by
//! appending every rule again. Nothing outside the managed chains is touched.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::rules::{FirewallConfiguration, NatRule, OpenPortRule, PortForwardRule, Protocol};
use crate::error::{Error, Result};
use crate::services::{Command, CommandExecutor};
use crate::validation::Validatable;

/// A managed chain and the built-in chain that jumps to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain {
    pub table: &'static str,
    pub name: &'static str,
    pub hook: &'static str,
}

pub const INPUT: Chain = Chain {
    table: "filter",
    name: "gw-input",
    hook: "INPUT",
};
pub const FORWARD: Chain = Chain {
    table: "filter",
    name: "gw-forward",
    hook: "FORWARD",
};
pub const PREROUTING: Chain = Chain {
    table: "nat",
    name: "gw-prerouting",
    hook: "PREROUTING",
};
pub const POSTROUTING: Chain = Chain {
    table: "nat",
    name: "gw-postrouting",
    hook: "POSTROUTING",
};

/// Every managed chain.
pub const CHAINS: [Chain; 4] = [INPUT, FORWARD, PREROUTING, POSTROUTING];

/// One rule appended to a managed chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IptablesRule {
    pub chain: Chain,
    pub spec: Vec<String>,
}

impl IptablesRule {
    fn new(chain: Chain) -> Self {
        Self {
            chain,
            spec: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.spec.push(arg.into());
        self
    }

    fn args<const N: usize>(mut self, args: [&str; N]) -> Self {
        self.spec.extend(args.iter().map(|a| a.to_string()));
        self
    }

    fn opt(self, flag: &str, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value.to_string()),
            None => self,
        }
    }

    /// `iptables -t <table> -A <chain> <spec>`
    pub fn command(&self) -> Command {
        Command::new("iptables")
            .args(["-t", self.chain.table, "-A", self.chain.name])
            .args(self.spec.iter().cloned())
    }
}

impl fmt::Display for IptablesRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

fn mac(rule: IptablesRule, mac: Option<&String>) -> IptablesRule {
    match mac {
        Some(mac) => rule.args(["-m", "mac", "--mac-source"]).arg(mac.as_str()),
        None => rule,
    }
}

fn protocol(rule: IptablesRule, protocol: Option<Protocol>) -> IptablesRule {
    match protocol {
        Some(Protocol::All) | None => rule,
        Some(p) => rule.arg("-p").arg(p.as_str()),
    }
}

fn named(iface: &str) -> Option<&str> {
    (!iface.is_empty()).then_some(iface)
}

fn non_any(network: Option<&super::rules::NetworkPair>) -> Option<String> {
    network.filter(|n| !n.is_any()).map(ToString::to_string)
}

/// Rules for an open port.
pub fn open_port_rules(rule: &OpenPortRule) -> Vec<IptablesRule> {
    let mut r = protocol(IptablesRule::new(INPUT), Some(rule.protocol))
        .opt("-s", non_any(rule.permitted_network.as_ref()))
        .opt("-i", rule.permitted_interface.as_ref());
    if let Some(iface) = &rule.unpermitted_interface {
        r = r.args(["!", "-i"]).arg(iface.as_str());
    }
    let r = mac(r, rule.permitted_mac.as_ref())
        .opt("--sport", rule.source_port_range)
        .arg("--dport")
        .arg(rule.port.to_string())
        .args(["-j", "ACCEPT"]);
    vec![r]
}

/// Rules for a port forward: the DNAT itself, the forward accept and, when
/// masquerading, the return-path masquerade.
pub fn port_forward_rules(rule: &PortForwardRule) -> Vec<IptablesRule> {
    let source = non_any(rule.permitted_network.as_ref());
    let matches = |chain: Chain| {
        let r = protocol(IptablesRule::new(chain), Some(rule.protocol)).opt("-s", source.clone());
        mac(r, rule.permitted_mac.as_ref()).opt("--sport", rule.source_port_range)
    };

    let mut rules = vec![
        matches(PREROUTING)
            .arg("-i")
            .arg(rule.inbound_interface.as_str())
            .arg("--dport")
            .arg(rule.in_port.to_string())
            .args(["-j", "DNAT", "--to-destination"])
            .arg(format!("{}:{}", rule.address, rule.out_port)),
        matches(FORWARD)
            .arg("-i")
            .arg(rule.inbound_interface.as_str())
            .arg("-o")
            .arg(rule.outbound_interface.as_str())
            .arg("-d")
            .arg(rule.address.to_string())
            .arg("--dport")
            .arg(rule.out_port.to_string())
            .args(["-j", "ACCEPT"]),
    ];
    if rule.masquerade {
        rules.push(
            protocol(IptablesRule::new(POSTROUTING), Some(rule.protocol))
                .arg("-o")
                .arg(rule.outbound_interface.as_str())
                .arg("-d")
                .arg(rule.address.to_string())
                .arg("--dport")
                .arg(rule.out_port.to_string())
                .args(["-j", "MASQUERADE"]),
        );
    }
    rules
}

/// Rules for a NAT rule: forwarding in both directions (return traffic only
/// for established flows) and the masquerade when enabled.
pub fn nat_rules(rule: &NatRule) -> Vec<IptablesRule> {
    let source = non_any(rule.source.as_ref());
    let destination = non_any(rule.destination.as_ref());

    let mut rules = vec![
        protocol(IptablesRule::new(FORWARD), rule.protocol)
            .opt("-i", named(&rule.source_interface))
            .opt("-o", named(&rule.destination_interface))
            .opt("-s", source.clone())
            .opt("-d", destination.clone())
            .args(["-j", "ACCEPT"]),
        IptablesRule::new(FORWARD)
            .opt("-i", named(&rule.destination_interface))
            .opt("-o", named(&rule.source_interface))
            .args(["-m", "state", "--state", "RELATED,ESTABLISHED", "-j", "ACCEPT"]),
    ];
    if rule.masquerade {
        rules.push(
            protocol(IptablesRule::new(POSTROUTING), rule.protocol)
                .opt("-s", source)
                .opt("-d", destination)
                .opt("-o", named(&rule.destination_interface))
                .args(["-j", "MASQUERADE"]),
        );
    }
    rules
}

/// Every rule of `config`, in application order.
pub fn render(config: &FirewallConfiguration) -> Vec<IptablesRule> {
    config
        .open_ports
        .iter()
        .flat_map(open_port_rules)
        .chain(config.port_forwards.iter().flat_map(port_forward_rules))
        .chain(config.nat.iter().flat_map(nat_rules))
        .collect()
}

/// Options for applying a rule set.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Don't run anything, just report what would be run.
    pub dry_run: bool,
}

/// A rule that could not be added.
#[derive(Debug)]
pub struct ApplyError {
    pub rule: String,
    pub error: Error,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.error)
    }
}

/// Result of applying a rule set.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Rules added (or that would be added in dry-run mode).
    pub changes_made: usize,
    /// Rules that failed to be added.
    pub errors: Vec<ApplyError>,
    /// Commands run (or that would be run), in order.
    pub summary: Vec<String>,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn summary_text(&self) -> String {
        if self.summary.is_empty() {
            "No changes made".to_string()
        } else {
            self.summary.join("\n")
        }
    }
}

/// Applies rule sets with replace-all semantics.
pub struct FirewallApplier {
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for FirewallApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirewallApplier").finish_non_exhaustive()
    }
}

impl FirewallApplier {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Replace every managed rule with the rules of `config`.
    ///
    /// Invalid configurations are rejected before anything runs. Failing to
    /// prepare or flush a chain aborts; a rule that fails to be added is
    /// recorded in the result and the rest are still added.
    pub async fn apply(
        &self,
        config: &FirewallConfiguration,
        options: ApplyOptions,
    ) -> Result<ApplyResult> {
        config.validate().into_result()?;
        let mut result = ApplyResult::default();

        for chain in CHAINS {
            let flush = Command::new("iptables").args(["-t", chain.table, "-F", chain.name]);
            if options.dry_run {
                result.summary.push(flush.to_string());
                continue;
            }
            self.ensure_chain(chain).await?;
            self.executor.execute_checked(&flush).await?;
            result.summary.push(flush.to_string());
        }

        for rule in render(config) {
            let command = rule.command();
            if options.dry_run {
                result.summary.push(command.to_string());
                result.changes_made += 1;
                continue;
            }
            match self.executor.execute_checked(&command).await {
                Ok(_) => {
                    result.summary.push(command.to_string());
                    result.changes_made += 1;
                }
                Err(error) => {
                    warn!(%command, error = %error, "failed to add firewall rule");
                    result.errors.push(ApplyError {
                        rule: command.to_string(),
                        error,
                    });
                }
            }
        }

        if !options.dry_run {
            info!(
                rules = result.changes_made,
                failed = result.errors.len(),
                "firewall rules applied"
            );
        }
        Ok(result)
    }

    /// Remove every managed rule.
    pub async fn clear(&self) -> Result<ApplyResult> {
        self.apply(&FirewallConfiguration::default(), ApplyOptions::default())
            .await
    }

    /// Create `chain` if missing and hook it into its built-in chain.
    async fn ensure_chain(&self, chain: Chain) -> Result<()> {
        let create = Command::new("iptables").args(["-t", chain.table, "-N", chain.name]);
        if !self.executor.execute(&create).await?.success() {
            debug!(chain = chain.name, "chain already exists");
        }

        let jump = ["-t", chain.table, "-C", chain.hook, "-j", chain.name];
        if !self
            .executor
            .execute(&Command::new("iptables").args(jump))
            .await?
            .success()
        {
            self.executor
                .execute_checked(&Command::new("iptables").args([
                    "-t",
                    chain.table,
                    "-I",
                    chain.hook,
                    "-j",
                    chain.name,
                ]))
                .await?;
        }
        Ok(())
    }
}
