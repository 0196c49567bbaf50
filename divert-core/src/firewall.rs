/*
 * divert-core
 *
 * Copyright (C) 2023-2024 Xavier R.M. <sapphirus@azorium.net>
 * SPDX-License-Identifier: GPL-3.0-only
 *
 * This library is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, version 3.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! The firewall reconciler (§4.C): a two-variant enum, not an inheritance
//! hierarchy, over whichever backend is present on the host.

use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    config::ANY_INTERFACE,
    constants::{IPTABLES_TOOL, NFT_TOOL, OUTPUT_CHAIN, RULE_TAG, WORKER_MARK},
    err,
    exec::{probe, run, run_with_stdin, tool_exists},
    strategy::FilterRule,
    ErrorKind,
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    ModernNft,
    LegacyIpt,
}

impl Display for Backend {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(fmter, "{}", self.name())
    }
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ModernNft => "modern-nft",
            Self::LegacyIpt => "legacy-ipt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Active,
    Inactive,
    NoTable,
    NoChain,
}

#[derive(Debug, Clone)]
pub struct Status {
    pub backend: Backend,
    pub state: BackendState,
    pub rule_count: usize,
}

/// Selects `modern-nft` when its control tool is invocable and a
/// non-mutating probe succeeds; otherwise falls back to `legacy-ipt` on the
/// same condition; otherwise no usable backend exists (§4.C).
pub fn select_backend() -> Result<Backend> {
    if tool_exists(NFT_TOOL) && probe(NFT_TOOL, &["list", "tables"]) {
        return Ok(Backend::ModernNft);
    }

    if tool_exists(IPTABLES_TOOL) && probe(IPTABLES_TOOL, &["-L", "-n"]) {
        return Ok(Backend::LegacyIpt);
    }

    err!(ErrorKind::FirewallSetup("none", "select", "neither nft nor iptables is usable on this host".into()))
}

/// Installs exactly `rules`, first removing any prior tagged artefacts.
pub fn setup(backend: Backend, rules: &[FilterRule], iface: &str, router_mode: bool) -> Result<()> {
    cleanup(backend);

    match backend {
        Backend::ModernNft => setup_nft(rules, iface, router_mode),
        Backend::LegacyIpt => setup_ipt(rules, iface),
    }
}

/// Removes every tagged object. Idempotent; a missing object is a success,
/// so individual tool failures are swallowed here rather than propagated.
pub fn cleanup(backend: Backend) {
    match backend {
        Backend::ModernNft => cleanup_nft(),
        Backend::LegacyIpt => cleanup_ipt(),
    }
}

pub fn status(backend: Backend) -> Result<Status> {
    match backend {
        Backend::ModernNft => status_nft(),
        Backend::LegacyIpt => status_ipt(),
    }
}

// --- modern-nft -------------------------------------------------------

lazy_static! {
    static ref HANDLE_LINE: Regex = Regex::new(&format!("comment \"{RULE_TAG}\".*# handle (\\d+)")).unwrap();
    static ref QUEUE_LINE: Regex = Regex::new("queue num").unwrap();
}

fn nat_table() -> String {
    format!("{RULE_TAG}_nat")
}

fn setup_nft(rules: &[FilterRule], iface: &str, router_mode: bool) -> Result<()> {
    let mut script = String::new();

    script.push_str(&format!("add table inet {RULE_TAG}\n"));
    script.push_str(&format!("add chain inet {RULE_TAG} output {{ type filter hook output priority 0; }}\n"));

    for rule in rules {
        let mut line = format!("add rule inet {RULE_TAG} output ");

        if iface != ANY_INTERFACE {
            line.push_str(&format!("oifname \"{iface}\" "));
        }

        line.push_str(&format!("meta mark != {WORKER_MARK:#x} "));
        line.push_str(&format!("{} dport {{ {} }} ", rule.protocol, rule.ports));
        line.push_str(&format!("counter queue num {} bypass comment \"{RULE_TAG}\"\n", rule.queue_num));
        script.push_str(&line);
    }

    if router_mode && iface != ANY_INTERFACE {
        let nat = nat_table();

        script.push_str(&format!("add table ip {nat}\n"));
        script.push_str(&format!("add chain ip {nat} postrouting {{ type nat hook postrouting priority 100; }}\n"));
        script.push_str(&format!("add rule ip {nat} postrouting oifname \"{iface}\" masquerade comment \"{RULE_TAG}\"\n"));
    }

    run_with_stdin("modern-nft", "setup", NFT_TOOL, &["-f", "-"], &script)?;
    Ok(())
}

fn cleanup_nft() {
    if let Ok(listing) = run("modern-nft", "cleanup", NFT_TOOL, &["-a", "list", "chain", "inet", RULE_TAG, "output"]) {
        for line in listing.lines() {
            if let Some(captures) = HANDLE_LINE.captures(line) {
                let _ = run("modern-nft", "cleanup", NFT_TOOL, &["delete", "rule", "inet", RULE_TAG, "output", "handle", &captures[1]]);
            }
        }
    }

    let _ = run("modern-nft", "cleanup", NFT_TOOL, &["delete", "chain", "inet", RULE_TAG, "output"]);
    let _ = run("modern-nft", "cleanup", NFT_TOOL, &["delete", "table", "inet", RULE_TAG]);

    let nat = nat_table();
    let _ = run("modern-nft", "cleanup", NFT_TOOL, &["delete", "chain", "ip", &nat, "postrouting"]);
    let _ = run("modern-nft", "cleanup", NFT_TOOL, &["delete", "table", "ip", &nat]);
}

fn status_nft() -> Result<Status> {
    match run("modern-nft", "status", NFT_TOOL, &["list", "chain", "inet", RULE_TAG, "output"]) {
        Ok(listing) => {
            let rule_count = listing.lines().filter(|l| QUEUE_LINE.is_match(l)).count();
            let state = match rule_count {
                0 => BackendState::Inactive,
                _ => BackendState::Active,
            };

            Ok(Status {
                backend: Backend::ModernNft,
                state,
                rule_count,
            })
        }
        Err(_) => Ok(Status {
            backend: Backend::ModernNft,
            state: BackendState::NoTable,
            rule_count: 0,
        }),
    }
}

// --- legacy-ipt ---------------------------------------------------------

fn setup_ipt(rules: &[FilterRule], iface: &str) -> Result<()> {
    run("legacy-ipt", "setup", IPTABLES_TOOL, &["-N", RULE_TAG])?;

    for rule in rules {
        let proto = rule.protocol.to_string();
        let queue = rule.queue_num.to_string();

        for dport in expand_ports(&rule.ports) {
            let mut args: Vec<&str> = vec!["-A", RULE_TAG, "-p", &proto];

            if iface != ANY_INTERFACE {
                args.push("-o");
                args.push(iface);
            }

            args.push("--dport");
            args.push(&dport);
            args.push("-j");
            args.push("NFQUEUE");
            args.push("--queue-num");
            args.push(&queue);

            run("legacy-ipt", "setup", IPTABLES_TOOL, &args)?;
        }
    }

    run("legacy-ipt", "setup", IPTABLES_TOOL, &["-A", OUTPUT_CHAIN, "-j", RULE_TAG])?;
    Ok(())
}

fn cleanup_ipt() {
    let _ = run("legacy-ipt", "cleanup", IPTABLES_TOOL, &["-D", OUTPUT_CHAIN, "-j", RULE_TAG]);
    let _ = run("legacy-ipt", "cleanup", IPTABLES_TOOL, &["-F", RULE_TAG]);
    let _ = run("legacy-ipt", "cleanup", IPTABLES_TOOL, &["-X", RULE_TAG]);
}

fn status_ipt() -> Result<Status> {
    match run("legacy-ipt", "status", IPTABLES_TOOL, &["-L", RULE_TAG, "-n"]) {
        Ok(listing) => {
            let rule_count = listing.lines().filter(|l| l.contains("NFQUEUE")).count();
            let state = match rule_count {
                0 => BackendState::Inactive,
                _ => BackendState::Active,
            };

            Ok(Status {
                backend: Backend::LegacyIpt,
                state,
                rule_count,
            })
        }
        Err(_) => Ok(Status {
            backend: Backend::LegacyIpt,
            state: BackendState::NoChain,
            rule_count: 0,
        }),
    }
}

/// Expands a comma-separated port-set expression into individual
/// `--dport`-ready tokens (`p` or `lo:hi`), for the legacy backend which has
/// no native set syntax.
fn expand_ports(ports: &str) -> Vec<String> {
    ports
        .split(',')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('-') {
            Some((lo, hi)) => format!("{lo}:{hi}"),
            None => p.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_ports_single_and_range() {
        assert_eq!(expand_ports("443"), vec!["443"]);
        assert_eq!(expand_ports("1-65535"), vec!["1:65535"]);
        assert_eq!(expand_ports("53,1000-2000"), vec!["53", "1000:2000"]);
    }

    #[test]
    fn backend_names_match_status_kind() {
        assert_eq!(Backend::ModernNft.name(), "modern-nft");
        assert_eq!(Backend::LegacyIpt.name(), "legacy-ipt");
        assert_eq!(Backend::ModernNft.to_string(), "modern-nft");
    }
}
