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

//! The config record (§4.A): loaded once from a YAML file, overlaid with
//! `DIVERT_`-prefixed environment variables, then validated.

use std::{
    env::{current_exe, var},
    fmt::{Display, Formatter},
    fs::File,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    constants::CONFIG_FILE,
    err,
    error::*,
    impl_error,
    log::Level,
    ErrorKind,
};

#[derive(Debug, Clone)]
pub enum ConfigError {
    Load(String, String),
}

impl_error!(ConfigError);

impl Display for ConfigError {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        match self {
            Self::Load(path, error) => write!(fmter, "Failed to load '{path}': {error}"),
        }
    }
}

/// Sentinel value for `Interface` meaning "do not restrict by output interface".
pub const ANY_INTERFACE: &str = "any";

#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    strategy: String,
    #[serde(default = "default_interface")]
    interface: String,
    #[serde(default)]
    gamefilter: bool,
    #[serde(default)]
    nfqws_path: String,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    nointeractive: bool,
    #[serde(default)]
    log_color: Option<bool>,
    #[serde(default = "default_socket_path")]
    socket_path: String,
    #[serde(default = "default_pid_file")]
    pid_file: String,
    #[serde(default = "default_log_file")]
    log_file: String,
    #[serde(default)]
    router: bool,
}

impl Config {
    pub fn strategy(&self) -> &Path {
        Path::new(&self.strategy)
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn gamefilter_enabled(&self) -> bool {
        self.gamefilter
    }

    pub fn worker_binary(&self) -> &Path {
        Path::new(&self.nfqws_path)
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn nointeractive(&self) -> bool {
        self.nointeractive
    }

    pub fn log_color(&self) -> Option<bool> {
        self.log_color
    }

    pub fn socket_path(&self) -> &Path {
        Path::new(&self.socket_path)
    }

    pub fn pid_file(&self) -> &Path {
        Path::new(&self.pid_file)
    }

    pub fn log_file(&self) -> &Path {
        Path::new(&self.log_file)
    }

    pub fn router_mode(&self) -> bool {
        self.router
    }

    pub fn log_level(&self) -> Level {
        match self.debug {
            true => Level::Debug,
            false => Level::Info,
        }
    }

    /// Resolves every path field to absolute, relative to `base` when not
    /// already absolute.
    fn normalize(mut self, base: &Path) -> Self {
        self.strategy = normalize_path(&self.strategy, base);
        self.nfqws_path = normalize_path(&self.nfqws_path, base);
        self.socket_path = normalize_path(&self.socket_path, base);
        self.pid_file = normalize_path(&self.pid_file, base);
        self.log_file = normalize_path(&self.log_file, base);
        self
    }

    /// Overlays environment variables sharing the config's field names,
    /// upper-cased and prefixed with `DIVERT_` (§2.A, §6).
    fn apply_env(mut self) -> Self {
        if let Some(v) = env_str("STRATEGY") {
            self.strategy = v;
        }
        if let Some(v) = env_str("INTERFACE") {
            self.interface = v;
        }
        if let Some(v) = env_bool("GAMEFILTER") {
            self.gamefilter = v;
        }
        if let Some(v) = env_str("NFQWS_PATH") {
            self.nfqws_path = v;
        }
        if let Some(v) = env_bool("DEBUG") {
            self.debug = v;
        }
        if let Some(v) = env_bool("NOINTERACTIVE") {
            self.nointeractive = v;
        }
        if let Some(v) = env_bool("LOG_COLOR") {
            self.log_color = Some(v);
        }
        if let Some(v) = env_str("SOCKET_PATH") {
            self.socket_path = v;
        }
        if let Some(v) = env_str("PID_FILE") {
            self.pid_file = v;
        }
        if let Some(v) = env_str("LOG_FILE") {
            self.log_file = v;
        }
        if let Some(v) = env_bool("ROUTER") {
            self.router = v;
        }

        self
    }

    /// `StrategyFile` and `WorkerBinary` must resolve to readable files; a
    /// missing `Interface` only warns (§3, §4.A).
    fn validate(self) -> Result<Self> {
        if self.strategy.is_empty() || File::open(&self.strategy).is_err() {
            err!(ErrorKind::ConfigValidation(format!("strategy file '{}' is not readable", self.strategy)))?
        }

        if self.nfqws_path.is_empty() || File::open(&self.nfqws_path).is_err() {
            err!(ErrorKind::ConfigValidation(format!("worker binary '{}' is not readable", self.nfqws_path)))?
        }

        if self.interface != ANY_INTERFACE && !interface_exists(&self.interface) {
            crate::utils::print_warning(&format!("interface '{}' not found on this host", self.interface));
        }

        Ok(self)
    }
}

fn default_interface() -> String {
    ANY_INTERFACE.into()
}

fn default_socket_path() -> String {
    crate::constants::DEFAULT_SOCKET.to_string()
}

fn default_pid_file() -> String {
    crate::constants::DEFAULT_PID.to_string()
}

fn default_log_file() -> String {
    crate::constants::DEFAULT_LOG.to_string()
}

fn normalize_path(path: &str, base: &Path) -> String {
    if path.is_empty() {
        return path.into();
    }

    let p = Path::new(path);

    match p.is_absolute() {
        true => path.into(),
        false => base.join(p).to_string_lossy().into_owned(),
    }
}

fn env_str(field: &str) -> Option<String> {
    var(format!("{}{field}", crate::constants::ENV_PREFIX)).ok()
}

fn env_bool(field: &str) -> Option<bool> {
    env_str(field).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn interface_exists(iface: &str) -> bool {
    Path::new("/sys/class/net").join(iface).exists()
}

/// Loads the config from `CONFIG_FILE`, overlays environment variables, then
/// normalizes and validates. Paths are resolved against the running binary's
/// directory (§4.A).
pub fn load() -> Result<Config> {
    load_from(Path::new(*CONFIG_FILE))
}

pub fn load_from(path: &Path) -> Result<Config> {
    let file = File::open(path).map_err(|e| error!(ConfigError::Load(path.display().to_string(), e.to_string())))?;
    let config: Config = serde_yaml::from_reader(file).map_err(|e| error!(ConfigError::Load(path.display().to_string(), e.to_string())))?;
    let base = current_exe().ok().and_then(|p| p.parent().map(PathBuf::from)).unwrap_or_else(|| PathBuf::from("/"));

    config.apply_env().normalize(&base).validate()
}
