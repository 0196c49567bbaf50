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

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, remove_file, write},
    path::{Path, PathBuf},
    process::id,
};

use crate::{err, impl_error, Error, ErrorGeneric, ErrorTrait, Result};

#[derive(Debug)]
pub enum LockError {
    Locked(PathBuf, i32),
    NotAcquired,
}

impl Display for LockError {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Locked(path, pid) => write!(fmter, "PID file '{}' already present (pid {})", path.display(), pid),
            Self::NotAcquired => write!(fmter, "PID lock not acquired."),
        }
    }
}

impl_error!(LockError);

/// A PID-file-backed lock enforcing the at-most-one-active-session
/// invariant (§4.E) and supporting startup recovery after a crash.
pub struct Lock {
    path: PathBuf,
}

impl Lock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Acquires the lock by writing the current pid to `path`. Fails if the
    /// file already exists and names a process that is still alive; a stale
    /// file (pid no longer running) is treated as a crash and overwritten.
    pub fn lock(self) -> Result<Self> {
        if let Some(pid) = self.held_by() {
            if super::process::is_alive(pid) {
                err!(LockError::Locked(self.path.clone(), pid))?
            }
        }

        write(&self.path, id().to_string()).prepend(|| format!("Failed to write pid file '{}'", self.path.display()))?;
        Ok(self)
    }

    /// The pid recorded in the lock file, if any and parseable.
    pub fn held_by(&self) -> Option<i32> {
        read_to_string(&self.path).ok().and_then(|s| s.trim().parse().ok())
    }

    pub fn assert(&self) -> Result<()> {
        match self.held_by() {
            Some(pid) if pid == id() as i32 => Ok(()),
            _ => err!(LockError::NotAcquired),
        }
    }

    pub fn unlock(&self) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }

        remove_file(&self.path).prepend(|| format!("Failed to remove pid file '{}'", self.path.display()))
    }

    pub fn exists(&self) -> bool {
        Path::new(&self.path).exists()
    }
}
