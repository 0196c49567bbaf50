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

//! A thin IPC client: connect, send one request, read one response (§4.F).

use std::{
    fmt::{Display, Formatter},
    os::unix::net::UnixStream,
};

use divert_core::{
    impl_error,
    ipc::{read_frame, write_frame, Request, Response},
    ErrorTrait,
};

#[derive(Debug)]
pub enum ClientError {
    Connect(String, String),
}

impl_error!(ClientError);

impl Display for ClientError {
    fn fmt(&self, fmter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(socket, error) => write!(fmter, "Failed to connect to '{socket}': {error}\nIs divertd running?"),
        }
    }
}

/// Sends `command` with no parameters and returns the decoded response.
/// A transport failure (daemon not running, socket missing) is distinct
/// from a response carrying `error: Some(..)`, which the caller inspects.
pub fn send(socket: &str, command: &str) -> divert_core::Result<Response> {
    let mut stream = UnixStream::connect(socket).map_err(|e| divert_core::error!(ClientError::Connect(socket.to_string(), e.to_string())))?;

    write_frame(&mut stream, &Request::new(command))?;
    read_frame(&mut stream)
}
