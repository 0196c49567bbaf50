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

//! The session controller (§4.E): owns the single in-process `Session`
//! value and its `idle/starting/active/stopping` transitions, composing
//! the strategy compiler, firewall reconciler and worker supervisor.

use std::{
    fmt::{Display, Formatter},
    sync::Mutex,
};

use crate::{
    config::Config,
    err,
    firewall::{self, Backend},
    log::{Level, LogRecord, Logger},
    strategy::{self, CompiledStrategy},
    supervisor::Supervisor,
    ErrorKind,
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
}

impl Display for SessionState {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(fmter, "idle"),
            Self::Starting => write!(fmter, "starting"),
            Self::Active => write!(fmter, "active"),
            Self::Stopping => write!(fmter, "stopping"),
        }
    }
}

struct Inner {
    state: SessionState,
    strategy: Option<CompiledStrategy>,
}

/// At-most-one-instance, process-wide. Holds the compiled strategy in use
/// and composes B (strategy), C (firewall) and D (supervisor) under a
/// single lock so `start`/`stop`/`restart` never interleave (§4.E, §5).
pub struct Session {
    config: Config,
    backend: Backend,
    supervisor: Supervisor,
    logger: Mutex<Logger>,
    inner: Mutex<Inner>,
}

impl Session {
    pub fn new(config: Config, logger: Logger) -> Result<Self> {
        let backend = firewall::select_backend()?;
        let supervisor = Supervisor::new(config.worker_binary());

        Ok(Self {
            config,
            backend,
            supervisor,
            logger: Mutex::new(logger),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                strategy: None,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().expect("session lock poisoned").state
    }

    /// Restores the `idle` invariant at daemon startup, even if a previous
    /// instance crashed and left tagged rules or worker processes behind.
    pub fn recover(&self) {
        firewall::cleanup(self.backend);
        let killed = self.supervisor.kill_all();
        self.log(Level::Info, "recover", &format!("swept {killed} stale worker process(es) and tagged firewall objects"));
    }

    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        self.do_start(&mut inner)
    }

    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        self.do_stop(&mut inner)
    }

    /// `stop` then `start`, holding the session lock across both so no
    /// other command can observe an intermediate state (§4.E).
    pub fn restart(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        self.do_stop(&mut inner)?;
        self.do_start(&mut inner)
    }

    fn do_start(&self, inner: &mut Inner) -> Result<()> {
        if inner.state != SessionState::Idle {
            return err!(ErrorKind::SessionState("daemon is already running".into()));
        }

        inner.state = SessionState::Starting;

        let strategy = match strategy::compile(self.config.strategy(), self.config.gamefilter_enabled()) {
            Ok(strategy) => strategy,
            Err(error) => {
                inner.state = SessionState::Idle;
                return Err(error);
            }
        };

        if strategy.is_empty() {
            self.log(Level::Warn, "start", "compiled strategy contains no directives; session will start but do nothing");
        }

        if let Err(error) = firewall::setup(self.backend, &strategy.rules, self.config.interface(), self.config.router_mode()) {
            inner.state = SessionState::Idle;
            return Err(error);
        }

        if let Err(error) = self.supervisor.start(&strategy.workers) {
            firewall::cleanup(self.backend);
            inner.state = SessionState::Idle;
            return Err(error);
        }

        self.log(Level::Info, "start", &format!("session active with {} rule(s)", strategy.rules.len()));
        inner.strategy = Some(strategy);
        inner.state = SessionState::Active;
        Ok(())
    }

    fn do_stop(&self, inner: &mut Inner) -> Result<()> {
        if inner.state != SessionState::Active {
            return err!(ErrorKind::SessionState("daemon is not running".into()));
        }

        inner.state = SessionState::Stopping;

        if let Err(error) = self.supervisor.stop() {
            self.log(Level::Warn, "stop", &format!("worker teardown reported an error: {error}"));
        }

        firewall::cleanup(self.backend);
        inner.strategy = None;
        inner.state = SessionState::Idle;
        self.log(Level::Info, "stop", "session idle");
        Ok(())
    }

    fn log(&self, level: Level, operation: &str, message: &str) {
        let mut logger = self.logger.lock().expect("logger lock poisoned");
        let _ = logger.log(level, &LogRecord::new("session", operation, message));
    }
}
