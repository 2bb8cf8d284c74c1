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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;

const DEFAULT_DEVICE: &str = "mock";
const DEFAULT_MAX_VOICES: usize = 256;
const DEFAULT_CHUNK_FRAMES: usize = 4096;
const DEFAULT_QUEUE_DEPTH: usize = 3;
const DEFAULT_RING_BUFFERS: usize = 4;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    /// Output device: "mock" or the name of a cpal output device.
    device: Option<String>,

    /// Number of hardware voices (default: 256).
    max_voices: Option<usize>,

    /// Cap on concurrently playing instances (default: max_voices).
    max_playing_instances: Option<usize>,

    /// Frames decoded per streaming chunk (default: 4096). ADPCM chunks are
    /// rounded down to whole blocks.
    chunk_frames: Option<usize>,

    /// Chunks a streaming producer keeps queued ahead of the voice (default: 3).
    queue_depth: Option<usize>,

    /// Reusable chunk buffers per streaming session (default: 4).
    ring_buffers: Option<usize>,

    /// How long a streaming producer waits for a refill signal (default: 100ms).
    poll_interval: Option<String>,

    /// Worker threads used to decode resident banks (default: one per CPU).
    decode_threads: Option<usize>,
}

impl EngineConfig {
    /// New will create a new engine configuration for the given device.
    pub fn new(device: &str) -> EngineConfig {
        EngineConfig {
            device: Some(device.to_string()),
            ..EngineConfig::default()
        }
    }

    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = Some(max_voices);
        self
    }

    pub fn with_max_playing_instances(mut self, max_playing_instances: usize) -> Self {
        self.max_playing_instances = Some(max_playing_instances);
        self
    }

    pub fn with_chunk_frames(mut self, chunk_frames: usize) -> Self {
        self.chunk_frames = Some(chunk_frames);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: &str) -> Self {
        self.poll_interval = Some(poll_interval.to_string());
        self
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(poll_interval) = &self.poll_interval {
            parse_duration("poll_interval", poll_interval)?;
        }
        if self.max_voices == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_voices",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the device name (default: "mock").
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the number of hardware voices (default: 256).
    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES).max(1)
    }

    /// Returns the playing instance cap (default: the voice count).
    pub fn max_playing_instances(&self) -> usize {
        self.max_playing_instances
            .unwrap_or_else(|| self.max_voices())
            .max(1)
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames.unwrap_or(DEFAULT_CHUNK_FRAMES).max(1)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH).max(1)
    }

    /// Returns the ring size. Never smaller than the queue depth.
    pub fn ring_buffers(&self) -> usize {
        self.ring_buffers
            .unwrap_or(DEFAULT_RING_BUFFERS)
            .max(self.queue_depth())
    }

    /// Returns the producer poll interval. Values that failed to parse were
    /// rejected at load time; the default covers configs built in code.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
            .as_deref()
            .and_then(|value| parse_duration("poll_interval", value).ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Returns the number of resident decode threads (default: one per CPU).
    pub fn decode_threads(&self) -> usize {
        self.decode_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Duration::from)
        .map_err(|e| ConfigError::Duration {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
