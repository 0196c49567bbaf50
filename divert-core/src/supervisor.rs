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

//! The worker supervisor (§4.D): spawns, tracks, signals and reaps the
//! per-queue worker cohort behind a single exclusive handle-table lock.

use std::{
    os::unix::process::CommandExt,
    path::PathBuf,
    process::Command,
    sync::Mutex,
    thread::sleep,
    time::{Instant, SystemTime},
};

use nix::sys::{
    signal::{kill, Signal},
    wait::waitpid,
};
use nix::unistd::Pid;

use crate::{
    constants::{PROCESS_SLEEP_DURATION, WORKER_STOP_TIMEOUT},
    err,
    process::{is_alive, pids_by_exe},
    strategy::WorkerSpec,
    ErrorKind,
    Result,
};

#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub pid: i32,
    /// Equal to `pid`: each worker is spawned as its own process group
    /// leader (`process_group(0)`) so the whole group can be signaled at
    /// once on teardown.
    pub pgid: i32,
    pub queue_num: u32,
    pub args: Vec<String>,
    pub created_at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub count: usize,
    pub active_queue_numbers: Vec<u32>,
    pub running: bool,
}

/// Spawns and tracks the worker cohort. `binary` is the configured worker
/// executable; the handle table is behind one exclusive lock (§4.D, §5).
pub struct Supervisor {
    binary: PathBuf,
    handles: Mutex<Vec<WorkerHandle>>,
}

impl Supervisor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one process per `WorkerSpec`, each in its own process group.
    /// Partial success is not acceptable: if spawning worker `k` fails,
    /// workers `0..k-1` already spawned in this call are torn down first.
    pub fn start(&self, workers: &[WorkerSpec]) -> Result<()> {
        let mut handles = self.handles.lock().expect("handle table lock poisoned");
        let mut spawned: Vec<WorkerHandle> = Vec::new();

        for spec in workers {
            let mut args = vec!["--qnum".to_string(), spec.queue_num.to_string()];
            args.extend(spec.args.iter().cloned());

            match Command::new(&self.binary).args(&args).process_group(0).spawn() {
                Ok(child) => {
                    let pid = child.id() as i32;
                    spawned.push(WorkerHandle {
                        pid,
                        pgid: pid,
                        queue_num: spec.queue_num,
                        args,
                        created_at: SystemTime::now(),
                    })
                }
                Err(e) => {
                    for handle in &spawned {
                        terminate(handle);
                    }

                    return err!(ErrorKind::ProcessManagement(self.binary.display().to_string(), None, e.kind()));
                }
            }
        }

        handles.extend(spawned);
        Ok(())
    }

    /// Terminates every live handle: SIGTERM, a bounded wait, then SIGKILL.
    /// Idempotent; clears the handle table unconditionally on return.
    pub fn stop(&self) -> Result<()> {
        let mut handles = self.handles.lock().expect("handle table lock poisoned");

        for handle in handles.iter() {
            let _ = kill(Pid::from_raw(-handle.pgid), Signal::SIGTERM);
        }

        let deadline = Instant::now() + WORKER_STOP_TIMEOUT;

        for handle in handles.iter() {
            while is_alive(handle.pid) && Instant::now() < deadline {
                sleep(PROCESS_SLEEP_DURATION);
            }

            terminate(handle);
        }

        handles.clear();
        Ok(())
    }

    /// A system-wide sweep independent of the handle table: signals every
    /// process on the host whose executable resolves to the configured
    /// worker binary. Used for reboot-survival and manual recovery.
    pub fn kill_all(&self) -> usize {
        let pids = pids_by_exe(&self.binary);

        for pid in &pids {
            let _ = kill(Pid::from_raw(-*pid), Signal::SIGTERM);
        }

        pids.len()
    }

    pub fn status(&self) -> SupervisorStatus {
        let handles = self.handles.lock().expect("handle table lock poisoned");
        let active_queue_numbers: Vec<u32> = handles.iter().filter(|h| is_alive(h.pid)).map(|h| h.queue_num).collect();

        SupervisorStatus {
            count: handles.len(),
            running: !active_queue_numbers.is_empty(),
            active_queue_numbers,
        }
    }
}

/// Force-kills and reaps a single handle, ignoring errors: by the time this
/// runs the process may already be gone, which is the success case.
fn terminate(handle: &WorkerHandle) {
    if is_alive(handle.pid) {
        let _ = kill(Pid::from_raw(-handle.pgid), Signal::SIGKILL);
    }

    let _ = waitpid(Pid::from_raw(handle.pid), None);
}
