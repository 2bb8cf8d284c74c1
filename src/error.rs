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

//! Error types shared across the engine.
//!
//! Parse-time errors abort a bank open. Track and session errors are isolated
//! to the track or session they belong to.

use crate::codec::DecodeError;
use crate::voice::{BackendError, VoiceExhaustedError};

/// The header could not be recognized at all.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad bank magic {0:02x?}, expected \"WBND\"")]
    BadMagic([u8; 4]),

    #[error("unsupported bank version {0}")]
    UnsupportedVersion(u32),

    #[error("bank header truncated while reading {0}")]
    Truncated(&'static str),
}

/// Top level error for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    #[error("Track {track} failed to load: {reason}")]
    TrackLoad { track: u32, reason: String },

    #[error(transparent)]
    VoiceExhausted(#[from] VoiceExhaustedError),

    #[error("Unsupported codec for track {track}: {reason}")]
    UnsupportedCodec { track: u32, reason: String },

    #[error("Stream read failed for track {track}: {source}")]
    StreamRead {
        track: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Playing instance limit of {0} reached")]
    InstanceLimit(usize),

    #[error("No track {0} in bank")]
    UnknownTrack(String),

    #[error("Playback instance has been disposed")]
    Disposed,

    #[error("Playback instance was released back to the pool")]
    Released,

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Voice back-end error: {0}")]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to build decode thread pool: {0}")]
    DecodePool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl EngineError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        EngineError::CorruptContainer(message.into())
    }
}
