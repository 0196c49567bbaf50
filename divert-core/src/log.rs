/*
 * divert-core
 *
 * Copyright (C) 2023-2024 Xavier Moffett <sapphirus@azorium.net>
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

//! Structured, file-backed logging (§4.G). Records carry `component` and
//! `operation` at minimum, with optional `backend`/`kind`/`queue`/`pid`
//! fields appended when set.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
};

use time::{format_description::FormatItem, macros::format_description, OffsetDateTime, UtcOffset};

use crate::{err, impl_error, ErrorKind, Result};

const DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour][offset_minute]");
const UTC_OFFSET: &[FormatItem<'static>] = format_description!("[offset_hour]");

#[derive(Debug)]
pub enum LoggerError {
    Uninitialized,
}

impl_error!(LoggerError);

impl Display for LoggerError {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Uninitialized => write!(fmter, "Logger is uninitialized"),
        }
    }
}

#[derive(PartialEq, Clone, Copy)]
pub enum Level {
    Info,
    Warn,
    Error,
    Debug,
}

impl Level {
    fn to_str(&self) -> &str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
        }
    }

    fn verbosity(&self) -> i8 {
        self.into()
    }
}

impl From<&Level> for i8 {
    fn from(val: &Level) -> Self {
        match val {
            Level::Info => 0,
            Level::Warn => 1,
            Level::Error => 2,
            Level::Debug => 3,
        }
    }
}

impl Display for Level {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(fmter, "{}", self.to_str())
    }
}

/// A single structured log record (§4.G). Built with the setter methods,
/// then handed to [`Logger::log`].
pub struct LogRecord<'a> {
    component: &'a str,
    operation: &'a str,
    message: &'a str,
    kind: Option<&'a str>,
    backend: Option<&'static str>,
    queue: Option<u32>,
    pid: Option<i32>,
}

impl<'a> LogRecord<'a> {
    pub fn new(component: &'a str, operation: &'a str, message: &'a str) -> Self {
        Self {
            component,
            operation,
            message,
            kind: None,
            backend: None,
            queue: None,
            pid: None,
        }
    }

    pub fn kind(mut self, kind: &'a str) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn queue(mut self, queue: u32) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }
}

impl Display for LogRecord<'_> {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> FmtResult {
        write!(fmter, "component={} operation={}", self.component, self.operation)?;

        if let Some(backend) = self.backend {
            write!(fmter, " backend={backend}")?;
        }
        if let Some(kind) = self.kind {
            write!(fmter, " kind={kind}")?;
        }
        if let Some(queue) = self.queue {
            write!(fmter, " queue={queue}")?;
        }
        if let Some(pid) = self.pid {
            write!(fmter, " pid={pid}")?;
        }

        write!(fmter, " msg=\"{}\"", self.message)
    }
}

pub struct Logger {
    verbosity: i8,
    file: Option<File>,
    path: String,
    module: &'static str,
    debug_stderr: bool,
    offset: UtcOffset,
}

impl Logger {
    pub fn new(module_name: &'static str) -> Self {
        let ofs = OffsetDateTime::now_local()
            .unwrap_or(OffsetDateTime::now_utc())
            .format(UTC_OFFSET)
            .unwrap();
        let ofs = UtcOffset::parse(ofs.as_str(), UTC_OFFSET).unwrap();

        Self {
            verbosity: Level::Error.verbosity(),
            file: None,
            path: String::new(),
            module: module_name,
            debug_stderr: false,
            offset: ofs,
        }
    }

    pub fn init(mut self, log_file: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).truncate(false).open(log_file);

        self.file = Some(match file {
            Ok(file) => file,
            Err(error) => err!(ErrorKind::IOError(log_file.display().to_string(), error.kind()))?,
        });
        self.path = log_file.display().to_string();
        Ok(self)
    }

    pub fn set_level(&mut self, level: Level) {
        self.verbosity = level.verbosity()
    }

    /// When set, `Warn`/`Error` records are mirrored to stderr in addition to
    /// the log file; matches this lineage's `debug`-gated stderr mirroring.
    pub fn set_debug_stderr(&mut self, debug: bool) {
        self.debug_stderr = debug;
    }

    pub fn log(&mut self, level: Level, record: &LogRecord) -> Result<()> {
        if level.verbosity() > self.verbosity {
            return Ok(());
        }

        if let Ok(local) = OffsetDateTime::now_local() {
            self.offset = UtcOffset::parse(local.format(UTC_OFFSET).unwrap().as_str(), UTC_OFFSET).unwrap();
        }

        let time: OffsetDateTime = OffsetDateTime::now_utc().to_offset(self.offset);
        let line = format!("[{}] [{}] [{}] {}\n", time.format(DATE_FORMAT).unwrap(), self.module, level, record);

        let write = match self.file.as_mut() {
            Some(file) => file.write(line.as_bytes()),
            None => err!(LoggerError::Uninitialized)?,
        };

        if self.debug_stderr || level == Level::Error {
            eprint!("{line}");
        }

        match write {
            Ok(_) => Ok(()),
            Err(error) => err!(ErrorKind::IOError(self.path.clone(), error.kind())),
        }
    }
}
