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

//! Hardware voices: the slot pool and the back-ends that play them.

use std::{fmt, sync::Arc};

use crate::bank::PcmFormat;

pub mod cpal;
pub mod mock;
mod pool;

pub use pool::HardwareVoicePool;

/// Opaque handle to a reserved voice. Handles from an earlier reservation of
/// the same slot are stale and ignored by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    index: u32,
    generation: u32,
}

impl VoiceHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        VoiceHandle { index, generation }
    }

    /// The back-end slot this handle refers to.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice {}#{}", self.index, self.generation)
    }
}

/// Every voice in the pool is reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, thiserror::Error)]
#[error("no free voice")]
pub struct VoiceExhaustedError;

/// Errors raised by a voice back-end.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Voice {0} has no PCM format configured")]
    Unconfigured(usize),

    #[error("Buffer of {len} bytes is not a whole number of {frame_size} byte frames")]
    PartialFrame { len: usize, frame_size: usize },

    #[error("No device found with name {0}")]
    DeviceNotFound(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-voice mix parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    /// Linear gain, 0.0 and up.
    pub volume: f32,
    /// -1.0 (left) to 1.0 (right).
    pub pan: f32,
    /// Playback rate multiplier.
    pub pitch: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        VoiceParams {
            volume: 1.0,
            pan: 0.0,
            pitch: 1.0,
        }
    }
}

/// Raised by a back-end when a voice finishes a buffer or runs dry.
///
/// Back-ends never hold their own locks while calling this, so implementations
/// may call back into the back-end and the voice pool.
pub trait BufferNeeded: Send + Sync {
    fn buffer_needed(&self, voice: usize);
}

impl<F> BufferNeeded for F
where
    F: Fn(usize) + Send + Sync,
{
    fn buffer_needed(&self, voice: usize) {
        self(voice)
    }
}

/// A device that plays queued PCM buffers on numbered voices.
pub trait VoiceBackend: Send + Sync {
    /// Sets the PCM format for subsequent submissions on a voice.
    fn configure(&self, voice: usize, format: PcmFormat) -> Result<(), BackendError>;

    /// Queues a copy of `data` behind anything already queued on the voice.
    fn submit(&self, voice: usize, data: &[u8]) -> Result<(), BackendError>;

    fn start(&self, voice: usize) -> Result<(), BackendError>;

    fn stop(&self, voice: usize);

    fn pause(&self, voice: usize);

    fn resume(&self, voice: usize);

    fn set_params(&self, voice: usize, params: VoiceParams);

    /// Frames played on the voice since it was last reset.
    fn sample_position(&self, voice: usize) -> u64;

    /// Buffers submitted and not yet fully played.
    fn queued_buffers(&self, voice: usize) -> usize;

    fn set_buffer_needed(&self, voice: usize, callback: Option<Arc<dyn BufferNeeded>>);

    /// Stops the voice and drops its queue, callback and position.
    fn reset(&self, voice: usize);

    fn name(&self) -> String;
}
