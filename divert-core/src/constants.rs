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

use std::{env::var, time::Duration};

use lazy_static::lazy_static;
use nix::unistd::{getegid, geteuid};
use signal_hook::consts::*;

use crate::utils::ansi::*;

/// Interval polled while waiting for a spawned child or a shutdown to settle.
pub static PROCESS_SLEEP_DURATION: Duration = Duration::from_millis(250);

/// Bound on how long `stop` waits for SIGTERM to take effect before
/// escalating to SIGKILL.
pub static WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub const SIGNAL_LIST: &[i32; 3] = &[SIGHUP, SIGINT, SIGTERM];

/// The identifying string under which the firewall reconciler claims
/// ownership of kernel objects (nft rule comment / iptables chain name).
pub const RULE_TAG: &str = "divert-fw";

/// Packet mark applied by the worker to traffic it has already processed;
/// excluded from re-queueing by the modern backend.
pub const WORKER_MARK: u32 = 0x4000_0000;

pub const OUTPUT_CHAIN: &str = "OUTPUT";

pub const NFT_TOOL: &str = "nft";
pub const IPTABLES_TOOL: &str = "iptables";

const DEFAULT_SOCKET_PATH: &str = "/var/run/zapret.sock";
const DEFAULT_PID_FILE: &str = "/var/run/zapret.pid";
const DEFAULT_LOG_FILE: &str = "/var/log/divertd.log";
const DEFAULT_CONFIG_FILE: &str = "/etc/divert/config.yml";

/// Environment variable prefix for per-field config overrides (§4.A).
pub const ENV_PREFIX: &str = "DIVERT_";

#[macro_export]
macro_rules! format_str {
    ( $( $x:expr ),+ ) => {
        format!($( $x, )+).leak()
    };
}

lazy_static! {
    pub static ref UID: u32 = geteuid().as_raw();
    pub static ref GID: u32 = getegid().as_raw();
    pub static ref TERM: &'static str = env_opt("TERM");
    pub static ref COLORTERM: &'static str = env_opt("COLORTERM");
    pub static ref DEFAULT_SOCKET: &'static str = DEFAULT_SOCKET_PATH;
    pub static ref DEFAULT_PID: &'static str = DEFAULT_PID_FILE;
    pub static ref DEFAULT_LOG: &'static str = DEFAULT_LOG_FILE;
    pub static ref CONFIG_FILE: &'static str = env_default("DIVERT_CONFIG_FILE", DEFAULT_CONFIG_FILE);
    pub static ref IS_COLOR_TERMINAL: bool = is_color_terminal();
    pub static ref BOLD: &'static str = bold();
    pub static ref RESET: &'static str = reset();
    pub static ref DIM: &'static str = dim();
    pub static ref BOLD_RED: &'static str = bold_red();
    pub static ref BOLD_YELLOW: &'static str = bold_yellow();
    pub static ref BOLD_GREEN: &'static str = bold_green();
    pub static ref ARROW_GREEN: &'static str = arrow_green();
    pub static ref ARROW_RED: &'static str = arrow_red();
}

pub fn env_opt(env: &str) -> &'static str {
    var(env).map_or_else(|_| "", |var| var.leak())
}

pub fn env_default(env: &str, default: &'static str) -> &'static str {
    var(env).map_or_else(|_| default, |var| var.leak())
}
