/*
 * divertctl
 *
 * Copyright (C) 2023-2024 Xavier R.M. <sapphirus@azorium.net>
 * SPDX-License-Identifier: GPL-3.0-only
 *
 * This program is free software: you can redistribute it and/or modify
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

use divert_core::{
    constants::{ARROW_GREEN, BOLD, DEFAULT_SOCKET, RESET},
    impl_error,
    ipc::Response,
    utils::{arguments::{InvalidArgument, Operand}, print_error, Arguments},
    ErrorTrait,
    Result,
};

mod client;
mod proc;

#[derive(Debug)]
pub enum CommandError {
    Failed(String),
}

impl_error!(CommandError);

impl std::fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(message) => write!(fmt, "{message}"),
        }
    }
}

fn main() {
    let result = run();

    if let Err(error) = result {
        print_error(&error.to_string());
        std::process::exit(error.kind().code());
    }
}

fn run() -> Result<()> {
    let mut arguments = Arguments::new().populate();
    let mut socket = DEFAULT_SOCKET.to_string();
    let mut command = None;

    while let Some(op) = arguments.next() {
        match op {
            Operand::LongPos("socket", val) => socket = val.to_string(),
            Operand::Long("socket") => continue,
            Operand::Value(cmd) if command.is_none() => command = Some(cmd),
            _ => {}
        }
    }

    match command {
        Some("status") => status(&socket),
        Some("start") => mutate(&socket, "start"),
        Some("stop") => mutate(&socket, "stop"),
        Some("restart") => mutate(&socket, "restart"),
        Some("config") => show(&socket, "config"),
        Some("firewall") => show(&socket, "firewall"),
        Some("processes") | Some("ps") => proc::processes(&socket),
        _ => divert_core::err!(InvalidArgument::OperationUnspecified),
    }
}

fn mutate(socket: &str, command: &str) -> Result<()> {
    let response = client::send(socket, command)?;

    match response.error {
        None => {
            let state = response.data["state"].as_str().unwrap_or("unknown");
            eprintln!("{} divertd is now {}{state}{}.", *ARROW_GREEN, *BOLD, *RESET);
            Ok(())
        }
        Some(message) => divert_core::err!(CommandError::Failed(message)),
    }
}

fn status(socket: &str) -> Result<()> {
    let response = client::send(socket, "status")?;
    print_fields(&response, &["state", "backend", "workers_running", "worker_count"])
}

fn show(socket: &str, command: &str) -> Result<()> {
    let response = client::send(socket, command)?;
    print_object(&response)
}

fn print_fields(response: &Response, keys: &[&str]) -> Result<()> {
    if let Some(message) = &response.error {
        return divert_core::err!(CommandError::Failed(message.clone()));
    }

    for key in keys {
        println!("{}{key}{}: {}", *BOLD, *RESET, response.data[*key]);
    }

    Ok(())
}

fn print_object(response: &Response) -> Result<()> {
    if let Some(message) = &response.error {
        return divert_core::err!(CommandError::Failed(message.clone()));
    }

    if let Some(map) = response.data.as_object() {
        for (key, value) in map {
            println!("{}{key}{}: {value}", *BOLD, *RESET);
        }
    }

    Ok(())
}
