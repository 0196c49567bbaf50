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

//! One-shot subprocess invocation shared by the firewall reconciler (§4.C),
//! for running `nft`/`iptables` and reading back their stderr on failure.

use std::process::{Command, Stdio};

use crate::{err, error, Error, ErrorKind, Result};

/// Returns `true` if `tool` resolves on `$PATH` via `which`, without
/// invoking it. Used for backend selection's non-mutating probe (§4.C).
pub fn tool_exists(tool: &str) -> bool {
    Command::new("which").arg(tool).stdout(Stdio::null()).stderr(Stdio::null()).status().map(|s| s.success()).unwrap_or(false)
}

/// Runs `tool` with `args`, returning its stdout on success. On nonzero exit,
/// returns `ErrorKind::FirewallSetup(backend, operation, stderr)`.
pub fn run(backend: &'static str, operation: &'static str, tool: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(tool).args(args).output().map_err(|e| error!(ErrorKind::FirewallSetup(backend, operation, e.to_string())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        err!(ErrorKind::FirewallSetup(backend, operation, stderr))?
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Like [`run`] but feeds `stdin_data` to the child's standard input, for
/// `nft -f -` style ruleset submission.
pub fn run_with_stdin(backend: &'static str, operation: &'static str, tool: &str, args: &[&str], stdin_data: &str) -> Result<String> {
    use std::io::Write;

    let mut child = Command::new(tool)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| error!(ErrorKind::FirewallSetup(backend, operation, e.to_string())))?;

    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(stdin_data.as_bytes())
        .map_err(|e| error!(ErrorKind::FirewallSetup(backend, operation, e.to_string())))?;

    let output = child.wait_with_output().map_err(|e| error!(ErrorKind::FirewallSetup(backend, operation, e.to_string())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        err!(ErrorKind::FirewallSetup(backend, operation, stderr))?
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs `tool` with `args` purely to probe availability/permission; returns
/// whether the process exited successfully, swallowing stderr.
pub fn probe(tool: &str, args: &[&str]) -> bool {
    Command::new(tool).args(args).stdout(Stdio::null()).stderr(Stdio::null()).status().map(|s| s.success()).unwrap_or(false)
}
