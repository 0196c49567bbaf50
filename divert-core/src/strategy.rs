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

//! The strategy compiler (§4.B): turns a flat, declarative strategy file
//! into a queue-numbered `CompiledStrategy`.

use std::{
    fmt::{Display, Formatter},
    fs::read_to_string,
    path::Path,
};

use lazy_static::lazy_static;
use regex::Regex;

use crate::{err, error::*, impl_error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Display for Protocol {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(fmter, "tcp"),
            Self::Udp => write!(fmter, "udp"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterRule {
    pub protocol: Protocol,
    pub ports: String,
    pub queue_num: u32,
    pub bypass_on_stall: bool,
}

#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub queue_num: u32,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledStrategy {
    pub rules: Vec<FilterRule>,
    pub workers: Vec<WorkerSpec>,
}

impl CompiledStrategy {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum StrategyError {
    UnreadableFile(String, String),
    MalformedArgs(String, usize),
}

impl_error!(StrategyError);

impl Display for StrategyError {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnreadableFile(path, error) => write!(fmter, "'{path}': {error}"),
            Self::MalformedArgs(path, line) => write!(fmter, "'{path}' line {line}: unterminated quote in argument list"),
        }
    }
}

lazy_static! {
    static ref DIRECTIVE: Regex = Regex::new(r"^--filter-(tcp|udp)=(\S*)(?:\s+(.*))?$").unwrap();
}

/// Compiles the strategy file at `path` into a [`CompiledStrategy`].
///
/// Streams the file line by line, applying substitutions and then splitting
/// each line on the `--new` separator so multiple directives packed onto one
/// physical line (as real strategy files do) each yield one rule/worker pair.
pub fn compile(path: &Path, gamefilter_enabled: bool) -> Result<CompiledStrategy> {
    let contents = read_to_string(path).map_err(|e| error!(StrategyError::UnreadableFile(path.display().to_string(), e.to_string())))?;
    let mut strategy = CompiledStrategy::default();
    let mut queue_num = 0u32;

    for (lineno, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        let trimmed = line.trim_start();

        if trimmed.is_empty() || trimmed.starts_with("::") || trimmed.starts_with("@echo") || trimmed.starts_with("chcp") {
            continue;
        }

        let substituted = substitute(line, gamefilter_enabled);

        for segment in substituted.split("--new") {
            let segment = segment.trim();

            if segment.is_empty() {
                continue;
            }

            let Some(captures) = DIRECTIVE.captures(segment) else {
                continue;
            };

            let protocol = match &captures[1] {
                "tcp" => Protocol::Tcp,
                "udp" => Protocol::Udp,
                _ => unreachable!("regex alternation is limited to tcp|udp"),
            };
            let ports = captures[2].to_string();
            let arg_string = captures.get(3).map(|m| m.as_str()).unwrap_or("");
            let args = split_args(arg_string, path, lineno + 1)?;

            strategy.rules.push(FilterRule {
                protocol,
                ports,
                queue_num,
                bypass_on_stall: true,
            });
            strategy.workers.push(WorkerSpec {
                queue_num,
                args,
            });

            queue_num += 1;
        }
    }

    Ok(strategy)
}

/// Applies the fixed token vocabulary (§3): `%BIN%` and `%LISTS%` substitute
/// unconditionally; `%GameFilter%` is context-sensitive on comma placement so
/// a disabled filter never leaves a dangling comma in the port list.
fn substitute(line: &str, gamefilter_enabled: bool) -> String {
    let line = line.replace("%BIN%", "bin/").replace("%LISTS%", "lists/");

    if gamefilter_enabled {
        return line.replace("%GameFilter%", "1024-65535");
    }

    line.replace(",%GameFilter%", "").replace("%GameFilter%,", "").replace("%GameFilter%", "")
}

/// Quote-aware splitting of the worker argument run, followed by the
/// `=^!` → `=!` normalization the spec mandates happens after splitting.
fn split_args(arg_string: &str, path: &Path, lineno: usize) -> Result<Vec<String>> {
    let args = match shlex::split(arg_string) {
        Some(args) => args,
        None => err!(StrategyError::MalformedArgs(path.display().to_string(), lineno))?,
    };

    Ok(args.into_iter().map(|a| a.replace("=^!", "=!")).collect())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn compile_str(content: &str, gamefilter: bool) -> Result<CompiledStrategy> {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        compile(file.path(), gamefilter)
    }

    #[test]
    fn two_directives_one_line() {
        let strategy = compile_str("--filter-tcp=443 arg1 arg2 --new --filter-udp=443 arg3 --new", false).unwrap();

        assert_eq!(strategy.rules.len(), 2);
        assert_eq!(strategy.workers.len(), 2);
        assert_eq!(strategy.rules[0].queue_num, 0);
        assert_eq!(strategy.rules[1].queue_num, 1);
        assert_eq!(strategy.rules[0].protocol, Protocol::Tcp);
        assert_eq!(strategy.rules[1].protocol, Protocol::Udp);
        assert_eq!(strategy.workers[1].args, vec!["arg3"]);
    }

    #[test]
    fn empty_file_compiles_to_empty_strategy() {
        let strategy = compile_str("", false).unwrap();
        assert!(strategy.is_empty());
    }

    #[test]
    fn comments_and_preamble_are_ignored() {
        let strategy = compile_str("::comment\n@echo off\nchcp 65001\n\n--filter-tcp=443 a --new", false).unwrap();
        assert_eq!(strategy.rules.len(), 1);
    }

    #[test]
    fn gamefilter_elision_leaves_no_dangling_comma() {
        let strategy = compile_str("--filter-udp=50000-65000,%GameFilter% args --new", false).unwrap();
        assert_eq!(strategy.rules[0].ports, "50000-65000");
    }

    #[test]
    fn gamefilter_enabled_expands_to_port_range() {
        let strategy = compile_str("--filter-udp=53,%GameFilter% args --new", true).unwrap();
        assert_eq!(strategy.rules[0].ports, "53,1024-65535");
    }

    #[test]
    fn directive_without_arguments_yields_empty_args() {
        let strategy = compile_str("--filter-tcp= --new", false).unwrap();
        assert!(strategy.workers[0].args.is_empty());
    }

    #[test]
    fn queue_numbers_are_sequential_across_lines() {
        let strategy = compile_str("--filter-tcp=80 a --new\n--filter-tcp=443 b --new\n", false).unwrap();
        assert_eq!(strategy.rules[0].queue_num, 0);
        assert_eq!(strategy.rules[1].queue_num, 1);
    }

    #[test]
    fn caret_bang_normalized_after_split() {
        let strategy = compile_str(r#"--filter-tcp=443 --dpi-desync-fooling=badseq=^! --new"#, false).unwrap();
        assert_eq!(strategy.workers[0].args, vec!["--dpi-desync-fooling=badseq=!"]);
    }

    #[test]
    fn bin_and_lists_substitution_order_independent() {
        let a = compile_str("--filter-tcp=443 %BIN%nfqws %LISTS%a.txt --new", false).unwrap();
        assert_eq!(a.workers[0].args, vec!["bin/nfqws", "lists/a.txt"]);
    }
}
