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
use std::{sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct SignalState {
    cancelled: bool,
    /// Set by `notify` and consumed by the next wait, so a wakeup sent while
    /// nobody is waiting is not lost.
    notified: bool,
}

/// A cancel handle shared between a producer thread and whoever drives it.
/// Besides cancellation it carries plain wakeups, used to tell a producer
/// that there is room for more work.
#[derive(Clone, Default)]
pub struct CancelHandle {
    state: Arc<Mutex<SignalState>>,
    condvar: Arc<Condvar>,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle::default()
    }

    /// Returns true once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Waits for a notification or cancellation, at most `timeout`. Returns
    /// true if the handle is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.cancelled && !state.notified {
            let _ = self.condvar.wait_for(&mut state, timeout);
        }
        state.notified = false;
        state.cancelled
    }

    /// Wakes the waiter.
    pub fn notify(&self) {
        self.state.lock().notified = true;
        self.condvar.notify_all();
    }

    /// Cancels the handle. Later calls do nothing.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if !state.cancelled {
            state.cancelled = true;
            self.condvar.notify_all();
        }
    }
}
