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
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use tracing::debug;

use crate::instance::{AssetId, InstanceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    /// Playback ran to the end, loops included.
    Finished,
    /// Playback stopped on an error.
    Error(String),
}

/// Reported once per playback when it ends on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub instance: InstanceId,
    pub asset: AssetId,
    pub kind: PlaybackEventKind,
}

/// Sends the terminal event of one playback. Only the first call has any
/// effect; later ones are dropped.
#[derive(Debug)]
pub(crate) struct EventSink {
    tx: Sender<PlaybackEvent>,
    instance: InstanceId,
    asset: AssetId,
    fired: AtomicBool,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<PlaybackEvent>, instance: InstanceId, asset: AssetId) -> Self {
        EventSink {
            tx,
            instance,
            asset,
            fired: AtomicBool::new(false),
        }
    }

    /// Returns true if this call sent the event.
    pub(crate) fn finished(&self) -> bool {
        self.send(PlaybackEventKind::Finished)
    }

    pub(crate) fn error(&self, message: String) -> bool {
        self.send(PlaybackEventKind::Error(message))
    }

    fn send(&self, kind: PlaybackEventKind) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let event = PlaybackEvent {
            instance: self.instance,
            asset: self.asset,
            kind,
        };
        // Nobody listening is fine.
        if self.tx.send(event).is_err() {
            debug!(instance = %self.instance, "Dropped playback event, no receiver");
        }
        true
    }
}
