// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use ::thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::warn;

pub const THREAD_PRIORITY_ENV: &str = "WAVEBANK_THREAD_PRIORITY";

/// Reads WAVEBANK_THREAD_PRIORITY (0-99). Unset or invalid leaves producer
/// threads at the default priority.
pub fn producer_thread_priority() -> Option<ThreadPriorityValue> {
    std::env::var(THREAD_PRIORITY_ENV)
        .ok()
        .and_then(|v| parse_priority(&v))
}

fn parse_priority(value: &str) -> Option<ThreadPriorityValue> {
    let n = value.trim().parse::<u8>().ok()?;
    if n >= 100 {
        return None;
    }
    ThreadPriorityValue::try_from(n).ok()
}

/// Applies `priority` to the calling thread, if there is one.
pub fn configure_producer_thread_priority(priority: Option<ThreadPriorityValue>) {
    let Some(priority) = priority else {
        return;
    };
    if let Err(e) = set_current_thread_priority(ThreadPriority::Crossplatform(priority)) {
        warn!(error = ?e, "Failed to set producer thread priority");
    }
}
