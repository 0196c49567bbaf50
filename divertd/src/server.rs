/*
 * divertd
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

//! Command dispatch for the IPC endpoint (§4.F): one function per command,
//! reading or mutating the shared `Session` and answering with a `Response`.

use std::sync::Arc;

use divert_core::{firewall, ipc::Response, session::Session};
use serde_json::json;

/// Executes one decoded `Request` against `session`, never panicking: every
/// failure path becomes a `Response::failed`, not a dropped connection.
pub fn dispatch(session: &Arc<Session>, command: &str) -> Response {
    match command {
        "status" => status(session),
        "start" => match session.start() {
            Ok(()) => Response::ok(command, json!({ "state": session.state().to_string() })),
            Err(error) => Response::failed(command, error.to_string()),
        },
        "stop" => match session.stop() {
            Ok(()) => Response::ok(command, json!({ "state": session.state().to_string() })),
            Err(error) => Response::failed(command, error.to_string()),
        },
        "restart" => match session.restart() {
            Ok(()) => Response::ok(command, json!({ "state": session.state().to_string() })),
            Err(error) => Response::failed(command, error.to_string()),
        },
        "config" => config(session, command),
        "firewall" => firewall_status(session, command),
        "processes" => processes(session, command),
        other => Response::failed(other, format!("unknown command '{other}'")),
    }
}

fn status(session: &Arc<Session>) -> Response {
    let supervisor = session.supervisor().status();
    let data = json!({
        "state": session.state().to_string(),
        "backend": session.backend().to_string(),
        "workers_running": supervisor.running,
        "worker_count": supervisor.count,
    });

    Response::ok("status", data)
}

fn config(session: &Arc<Session>, command: &str) -> Response {
    let config = session.config();
    let data = json!({
        "interface": config.interface(),
        "gamefilter": config.gamefilter_enabled(),
        "debug": config.debug(),
        "router": config.router_mode(),
        "socket_path": config.socket_path().display().to_string(),
        "pid_file": config.pid_file().display().to_string(),
        "log_file": config.log_file().display().to_string(),
    });

    Response::ok(command, data)
}

fn firewall_status(session: &Arc<Session>, command: &str) -> Response {
    match firewall::status(session.backend()) {
        Ok(status) => Response::ok(
            command,
            json!({
                "backend": status.backend.to_string(),
                "state": format!("{:?}", status.state),
                "rule_count": status.rule_count,
            }),
        ),
        Err(error) => Response::failed(command, error.to_string()),
    }
}

fn processes(session: &Arc<Session>, command: &str) -> Response {
    let status = session.supervisor().status();
    Response::ok(
        command,
        json!({
            "count": status.count,
            "running": status.running,
            "active_queue_numbers": status.active_queue_numbers,
        }),
    )
}
