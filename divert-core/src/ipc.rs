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

//! The IPC wire protocol (§4.F): `{command, params}` requests and
//! `{command, data, error}` responses, `serde_json`-encoded and framed with
//! a 32-bit big-endian length prefix over a Unix stream socket.

use std::io::{Read, Write};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error, ErrorKind, Result};

/// Frames larger than this are rejected outright; guards against a
/// malformed or hostile length prefix causing an unbounded allocation.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Request {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: Map::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Response {
    pub command: String,
    pub data: Value,
    pub error: Option<String>,
}

impl Response {
    pub fn ok(command: impl Into<String>, data: Value) -> Self {
        Self {
            command: command.into(),
            data,
            error: None,
        }
    }

    pub fn failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            data: Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Serializes `payload` and writes it as one length-prefixed frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, payload: &T) -> Result<()> {
    let bytes = serde_json::to_vec(payload).map_err(|e| error!(ErrorKind::Message(format!("failed to encode IPC frame: {e}"))))?;
    let len = u32::try_from(bytes.len()).map_err(|_| error!(ErrorKind::Message("IPC frame too large to encode".into())))?;

    writer.write_all(&len.to_be_bytes()).map_err(|e| error!(ErrorKind::from(e)))?;
    writer.write_all(&bytes).map_err(|e| error!(ErrorKind::from(e)))?;
    writer.flush().map_err(|e| error!(ErrorKind::from(e)))
}

/// Reads exactly one length-prefixed frame and deserializes it.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).map_err(|e| error!(ErrorKind::from(e)))?;
    let len = u32::from_be_bytes(len_buf);

    if len > MAX_FRAME_LEN {
        return Err(error!(ErrorKind::Message(format!("IPC frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"))));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).map_err(|e| error!(ErrorKind::from(e)))?;

    serde_json::from_slice(&buf).map_err(|e| error!(ErrorKind::Message(format!("failed to decode IPC frame: {e}"))))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn request_round_trips_through_frame() {
        let mut req = Request::new("start");
        req.params.insert("foo".into(), Value::String("bar".into()));

        let mut buf = Vec::new();
        write_frame(&mut buf, &req).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded: Request = read_frame(&mut cursor).unwrap();
        assert_eq!(decoded.command, "start");
        assert_eq!(decoded.params.get("foo").unwrap(), "bar");
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());

        let mut cursor = Cursor::new(buf);
        let result: Result<Request> = read_frame(&mut cursor);
        assert!(result.is_err());
    }

    #[test]
    fn response_failed_carries_no_data() {
        let resp = Response::failed("start", "daemon is already running");
        assert!(!resp.is_ok());
        assert_eq!(resp.data, Value::Null);
    }
}
