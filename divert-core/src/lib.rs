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

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use crate::constants::{BOLD, RESET};

pub mod config;
pub mod constants;
pub mod error;
pub mod exec;
pub mod firewall;
pub mod ipc;
pub mod lock;
pub mod log;
pub mod process;
pub mod session;
pub mod strategy;
pub mod supervisor;
pub mod utils;

pub use error::*;

/// The closed taxonomy of error kinds from which every fallible operation in
/// this crate draws. Callers match on the variant, never on `Display` text.
#[derive(Debug)]
pub enum ErrorKind {
    /// A config field was missing, unreadable, or otherwise invalid.
    ConfigValidation(String),
    /// A firewall backend invocation failed. Carries backend name, operation,
    /// and the tool's stderr.
    FirewallSetup(&'static str, &'static str, String),
    /// A worker process could not be spawned, signaled, or reaped. Carries
    /// the command and, where known, the pid.
    ProcessManagement(String, Option<i32>, std::io::ErrorKind),
    /// An init-system operation failed at the external service-installer
    /// boundary.
    ServiceOperation(String),
    NotFound(String),
    PermissionDenied(String),
    Timeout(String),
    /// A request was incompatible with the session's current state.
    SessionState(String),
    EnvVarUnset(&'static str),
    IOError(String, std::io::ErrorKind),
    Message(String),
}

impl Display for ErrorKind {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::ConfigValidation(msg) => write!(fmter, "Configuration invalid: {msg}"),
            Self::FirewallSetup(backend, op, stderr) => write!(fmter, "[{backend}] {op} failed: {stderr}"),
            Self::ProcessManagement(cmd, Some(pid), err) => write!(fmter, "'{cmd}' (pid {pid}): {err}"),
            Self::ProcessManagement(cmd, None, err) => write!(fmter, "'{cmd}': {err}"),
            Self::ServiceOperation(msg) => write!(fmter, "Service operation failed: {msg}"),
            Self::NotFound(what) => write!(fmter, "{what} not found."),
            Self::PermissionDenied(what) => write!(fmter, "Permission denied: {what}"),
            Self::Timeout(what) => write!(fmter, "Timed out waiting on {what}."),
            Self::SessionState(msg) => write!(fmter, "{msg}"),
            Self::EnvVarUnset(var) => write!(fmter, "${}{var}{} is unset.", *BOLD, *RESET),
            Self::IOError(ctx, error) => write!(fmter, "'{ctx}': {error}"),
            Self::Message(msg) => write!(fmter, "{msg}"),
        }
    }
}

impl ErrorTrait for ErrorKind {
    fn code(&self) -> i32 {
        match self {
            Self::NotFound(_) => 3,
            Self::PermissionDenied(_) => 4,
            Self::Timeout(_) => 5,
            Self::SessionState(_) => 6,
            Self::IOError(..) => 2,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            std::io::ErrorKind::TimedOut => Self::Timeout(err.to_string()),
            kind => Self::IOError(err.to_string(), kind),
        }
    }
}
