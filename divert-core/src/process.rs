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

//! `/proc` introspection used by the worker supervisor's `killAll` sweep
//! (§4.D) and by liveness probes (§4.D `status`).

use std::{
    fs::read_dir,
    path::{Path, PathBuf},
};

use nix::sys::signal::kill;
use nix::unistd::Pid;

/// A zero-signal liveness probe: `true` iff the kernel still schedules `pid`.
pub fn is_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Resolves `/proc/<pid>/exe`, the canonical executable path the kernel
/// associates with a running process.
fn exe_of(pid: i32) -> Option<PathBuf> {
    std::fs::read_link(format!("/proc/{pid}/exe")).ok()
}

/// Enumerates every pid in `/proc` whose resolved executable equals `binary`.
///
/// Used by `killAll` (§4.D): a system-wide sweep independent of this
/// process's own handle table, so it also finds workers left behind by a
/// crashed or rebooted prior instance.
pub fn pids_by_exe(binary: &Path) -> Vec<i32> {
    let Ok(target) = binary.canonicalize() else {
        return Vec::new();
    };

    let Ok(entries) = read_dir("/proc") else {
        return Vec::new();
    };

    let mut found = Vec::new();

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };

        if exe_of(pid).as_deref() == Some(target.as_path()) {
            found.push(pid);
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_is_alive() {
        assert!(is_alive(std::process::id() as i32));
    }

    #[test]
    fn exe_of_self_resolves() {
        let exe = exe_of(std::process::id() as i32);
        assert!(exe.is_some());
    }

    #[test]
    fn pids_by_exe_finds_current_test_binary() {
        let exe = std::env::current_exe().unwrap();
        let found = pids_by_exe(&exe);
        assert!(found.contains(&(std::process::id() as i32)));
    }
}
