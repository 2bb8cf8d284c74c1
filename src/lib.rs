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

//! A streaming wave-bank audio engine.
//!
//! Banks are parsed into a [`bank::BankContainer`] and either decoded up front
//! or streamed per playback by a producer thread. Playback runs on a fixed
//! pool of hardware voices through a [`voice::VoiceBackend`], wrapped in
//! reusable [`instance::PlaybackInstance`]s.

pub mod bank;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod instance;
pub mod playsync;
pub mod stream;
pub mod thread_priority;
pub mod voice;

#[cfg(test)]
mod testutil;

pub use bank::{Bank, BankContainer, LoadMode, TrackEntry, TrackRef};
pub use engine::{AudioEngine, PlayParams};
pub use error::{EngineError, FormatError};
pub use event::{PlaybackEvent, PlaybackEventKind};
pub use instance::{AssetId, InstanceId, InstanceState, LoopCount, PlaybackInstance};
pub use stream::{SessionState, SessionWatch};
