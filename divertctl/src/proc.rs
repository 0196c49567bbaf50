/*
 * divertctl
 *
 * Copyright (C) 2023-2024 Xavier Moffett <sapphirus@azorium.net>
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
    impl_error,
    utils::{
        print_warning,
        table::{ColumnAttribute, Table},
    },
    ErrorTrait,
    Result,
};

use crate::client;

#[derive(Debug)]
pub enum ProcError {
    Failed(String),
}

impl_error!(ProcError);

impl std::fmt::Display for ProcError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(message) => write!(fmt, "{message}"),
        }
    }
}

/// Queries D via `processes` and renders the active queue cohort as a table.
pub fn processes(socket: &str) -> Result<()> {
    let response = client::send(socket, "processes")?;

    if let Some(message) = response.error {
        divert_core::err!(ProcError::Failed(message))?;
    }

    let count = response.data["count"].as_u64().unwrap_or(0);
    let queues = response.data["active_queue_numbers"].as_array().cloned().unwrap_or_default();

    if count == 0 {
        print_warning("No worker processes are registered.");
        return Ok(());
    }

    let mut table = Table::new().header(&["Queue", "Status"]).col_attribute(0, ColumnAttribute::AlignRight);

    for queue in &queues {
        let num = queue.as_u64().unwrap_or(0).to_string();
        table.insert(vec![num, "running".to_string()]);
    }

    print!("{}", table.build().unwrap());
    Ok(())
}
