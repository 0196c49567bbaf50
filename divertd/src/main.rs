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

use std::{
    fs::{remove_file, set_permissions, Permissions},
    io::ErrorKind as IoErrorKind,
    os::unix::{
        fs::PermissionsExt,
        net::{UnixListener, UnixStream},
    },
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use divert_core::{
    config,
    error,
    ipc::{read_frame, write_frame, Request},
    lock::Lock,
    log::{Level, LogRecord, Logger},
    session::{Session, SessionState},
    utils::{print_error, require_root},
    ErrorKind,
    ErrorTrait,
};
use signal_hook::iterator::Signals;

mod server;

/// Upper bound on how long shutdown waits for in-flight connection handlers
/// (§5) before giving up and tearing the lock/socket down anyway.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

fn main() {
    if let Err(error) = run() {
        print_error(&error.to_string());
        std::process::exit(error.kind().code());
    }
}

fn run() -> divert_core::Result<()> {
    require_root()?;

    let config = config::load()?;

    let mut init_logger = Logger::new("divertd").init(config.log_file())?;
    init_logger.set_level(config.log_level());
    init_logger.set_debug_stderr(config.debug());
    let logger = Arc::new(Mutex::new(init_logger));

    log(&logger, Level::Info, "startup", "divertd starting");

    let lock = Lock::new(config.pid_file()).lock()?;

    let mut session_logger = Logger::new("divertd").init(config.log_file())?;
    session_logger.set_level(config.log_level());
    session_logger.set_debug_stderr(config.debug());
    let session = Arc::new(Session::new(config.clone(), session_logger)?);
    session.recover();

    let listener = bind_listener(config.socket_path())?;
    listener.set_nonblocking(true).map_err(|e| error!(ErrorKind::from(e)))?;
    let running = Arc::new(AtomicBool::new(true));

    let signal_running = running.clone();
    let signal_logger = logger.clone();
    let mut signals =
        Signals::new(divert_core::constants::SIGNAL_LIST).map_err(|e| error!(ErrorKind::from(e)))?;

    thread::spawn(move || {
        for sig in signals.forever() {
            log(&signal_logger, Level::Info, "signal", &format!("received signal {sig}, shutting down"));
            signal_running.store(false, Ordering::SeqCst);
            break;
        }
    });

    log(&logger, Level::Info, "startup", &format!("listening on {}", config.socket_path().display()));

    let handles: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let session = session.clone();
                let logger = logger.clone();
                let handle = thread::spawn(move || handle_connection(stream, session, logger));
                handles.lock().expect("handle list lock poisoned").push(handle);
            }
            Err(e) if e.kind() == IoErrorKind::WouldBlock => thread::sleep(Duration::from_millis(50)),
            Err(e) => log(&logger, Level::Warn, "accept", &format!("accept failed: {e}")),
        }
    }

    join_connection_handlers(&handles, &logger);

    if session.state() == SessionState::Active {
        let _ = session.stop();
    }

    let _ = lock.unlock();
    let _ = remove_file(config.socket_path());
    log(&logger, Level::Info, "shutdown", "divertd stopped");
    Ok(())
}

/// Waits for every spawned connection handler to finish, up to
/// `SHUTDOWN_JOIN_TIMEOUT`, so a handler mid-`start`/`stop` (installing or
/// tearing down firewall rules and worker processes) completes before the
/// final session-state check and lock/socket teardown run (§5, §8).
fn join_connection_handlers(handles: &Arc<Mutex<Vec<JoinHandle<()>>>>, logger: &Arc<Mutex<Logger>>) {
    let deadline = Instant::now() + SHUTDOWN_JOIN_TIMEOUT;

    loop {
        let finished: Vec<JoinHandle<()>> = {
            let mut handles = handles.lock().expect("handle list lock poisoned");
            let still_running: Vec<JoinHandle<()>> = handles.drain(..).collect();
            let (finished, pending): (Vec<_>, Vec<_>) = still_running.into_iter().partition(JoinHandle::is_finished);
            *handles = pending;
            finished
        };

        for handle in finished {
            let _ = handle.join();
        }

        let pending = handles.lock().expect("handle list lock poisoned").len();
        if pending == 0 {
            return;
        }

        if Instant::now() >= deadline {
            log(
                logger,
                Level::Warn,
                "shutdown",
                &format!("{pending} connection handler(s) still running after {SHUTDOWN_JOIN_TIMEOUT:?}, proceeding with teardown"),
            );
            return;
        }

        thread::sleep(Duration::from_millis(20));
    }
}

fn bind_listener(path: &std::path::Path) -> divert_core::Result<UnixListener> {
    let _ = remove_file(path);

    let listener = UnixListener::bind(path).map_err(|e| error!(ErrorKind::from(e)))?;
    set_permissions(path, Permissions::from_mode(0o666)).map_err(|e| error!(ErrorKind::from(e)))?;
    Ok(listener)
}

/// One thread per connection (§4.F); a handler never blocks the accept loop
/// since it only touches its own stream and the session lock, which
/// mutating commands already serialize on.
fn handle_connection(mut stream: UnixStream, session: Arc<Session>, logger: Arc<Mutex<Logger>>) {
    let request: Request = match read_frame(&mut stream) {
        Ok(request) => request,
        Err(error) => {
            log(&logger, Level::Warn, "ipc", &format!("failed to read request: {error}"));
            return;
        }
    };

    let response = server::dispatch(&session, &request.command);

    if let Err(error) = write_frame(&mut stream, &response) {
        log(&logger, Level::Warn, "ipc", &format!("failed to write response: {error}"));
    }
}

fn log(logger: &Arc<Mutex<Logger>>, level: Level, operation: &str, message: &str) {
    let mut logger = logger.lock().expect("logger lock poisoned");
    let _ = logger.log(level, &LogRecord::new("divertd", operation, message));
}
