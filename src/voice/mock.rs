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
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Weak},
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{BackendError, BufferNeeded, VoiceBackend, VoiceParams};
use crate::bank::PcmFormat;

/// Frames played per pass by `drain`.
const DRAIN_FRAMES: u64 = 4096;

#[derive(Default)]
struct VoiceState {
    format: Option<PcmFormat>,
    queue: VecDeque<Vec<u8>>,
    /// Bytes of the front buffer already played.
    front_offset: usize,
    position: u64,
    playing: bool,
    paused: bool,
    params: VoiceParams,
    callback: Option<Arc<dyn BufferNeeded>>,
    captured: Vec<u8>,
}

/// A mock back-end. Nothing is audible; playback advances when `consume` is
/// called, either by a test or by the optional clock thread.
pub struct Backend {
    name: String,
    voices: Mutex<HashMap<usize, VoiceState>>,
    capture: bool,
}

impl Backend {
    pub fn new() -> Backend {
        Backend::named("mock")
    }

    pub fn named(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            voices: Mutex::new(HashMap::new()),
            capture: false,
        }
    }

    /// Keeps a copy of every byte played so tests can inspect it.
    pub fn capturing() -> Backend {
        Backend {
            capture: true,
            ..Backend::new()
        }
    }

    /// A mock back-end whose voices play in real time, driven by a clock
    /// thread that runs until the back-end is dropped.
    pub fn with_clock(name: &str, tick: Duration) -> Arc<Backend> {
        let backend = Arc::new(Backend::named(name));
        let weak = Arc::downgrade(&backend);
        thread::Builder::new()
            .name("wavebank-mock-clock".to_string())
            .spawn(move || run_clock(weak, tick))
            .map_err(|e| tracing::error!(err = %e, "Unable to start mock clock"))
            .ok();
        info!(device = name, tick = ?tick, "Started mock clock");
        backend
    }

    /// Plays up to `frames` frames on a voice. Raises the voice's
    /// buffer-needed callback when a buffer completed or the queue is empty.
    /// Returns the number of frames played.
    pub fn consume(&self, voice: usize, frames: u64) -> u64 {
        let (played, callback) = {
            let mut voices = self.voices.lock();
            let Some(state) = voices.get_mut(&voice) else {
                return 0;
            };
            if !state.playing || state.paused {
                return 0;
            }
            let Some(format) = state.format else {
                return 0;
            };
            let frame_size = format.frame_size().max(1);

            let mut wanted = frames as usize * frame_size;
            let mut played_bytes = 0;
            let mut completed = false;
            while wanted > 0 {
                let Some(front) = state.queue.front() else {
                    break;
                };
                let take = (front.len() - state.front_offset).min(wanted);
                if self.capture {
                    let start = state.front_offset;
                    state.captured.extend_from_slice(&front[start..start + take]);
                }
                state.front_offset += take;
                wanted -= take;
                played_bytes += take;
                if state.front_offset == front.len() {
                    state.queue.pop_front();
                    state.front_offset = 0;
                    completed = true;
                }
            }

            let played = (played_bytes / frame_size) as u64;
            state.position += played;
            let callback = if completed || state.queue.is_empty() {
                state.callback.clone()
            } else {
                None
            };
            (played, callback)
        };

        if let Some(callback) = callback {
            callback.buffer_needed(voice);
        }
        played
    }

    /// Plays a voice until a pass plays nothing. Never returns for a voice
    /// that is fed forever.
    pub fn drain(&self, voice: usize) -> u64 {
        let mut total = 0;
        loop {
            let played = self.consume(voice, DRAIN_FRAMES);
            if played == 0 {
                return total;
            }
            total += played;
        }
    }

    /// Bytes played so far on a voice. Empty unless built with `capturing`.
    pub fn captured(&self, voice: usize) -> Vec<u8> {
        self.voices
            .lock()
            .get(&voice)
            .map(|state| state.captured.clone())
            .unwrap_or_default()
    }

    pub fn is_playing(&self, voice: usize) -> bool {
        self.voices
            .lock()
            .get(&voice)
            .is_some_and(|state| state.playing && !state.paused)
    }

    pub fn params(&self, voice: usize) -> VoiceParams {
        self.voices
            .lock()
            .get(&voice)
            .map(|state| state.params)
            .unwrap_or_default()
    }

    pub fn has_buffer_needed(&self, voice: usize) -> bool {
        self.voices
            .lock()
            .get(&voice)
            .is_some_and(|state| state.callback.is_some())
    }

    fn playing_voices(&self) -> Vec<(usize, u32)> {
        self.voices
            .lock()
            .iter()
            .filter(|(_, state)| state.playing && !state.paused)
            .filter_map(|(voice, state)| state.format.map(|format| (*voice, format.sample_rate)))
            .collect()
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::new()
    }
}

fn run_clock(backend: Weak<Backend>, tick: Duration) {
    loop {
        thread::sleep(tick);
        let Some(backend) = backend.upgrade() else {
            debug!("Mock clock stopped");
            return;
        };
        for (voice, sample_rate) in backend.playing_voices() {
            let frames = (f64::from(sample_rate) * tick.as_secs_f64()).ceil() as u64;
            backend.consume(voice, frames.max(1));
        }
    }
}

impl VoiceBackend for Backend {
    fn configure(&self, voice: usize, format: PcmFormat) -> Result<(), BackendError> {
        self.voices.lock().entry(voice).or_default().format = Some(format);
        Ok(())
    }

    fn submit(&self, voice: usize, data: &[u8]) -> Result<(), BackendError> {
        let mut voices = self.voices.lock();
        let state = voices.entry(voice).or_default();
        let Some(format) = state.format else {
            return Err(BackendError::Unconfigured(voice));
        };
        let frame_size = format.frame_size();
        if frame_size == 0 || data.len() % frame_size != 0 {
            return Err(BackendError::PartialFrame {
                len: data.len(),
                frame_size,
            });
        }
        if !data.is_empty() {
            state.queue.push_back(data.to_vec());
        }
        Ok(())
    }

    fn start(&self, voice: usize) -> Result<(), BackendError> {
        let mut voices = self.voices.lock();
        let state = voices.entry(voice).or_default();
        if state.format.is_none() {
            return Err(BackendError::Unconfigured(voice));
        }
        state.playing = true;
        state.paused = false;
        Ok(())
    }

    fn stop(&self, voice: usize) {
        if let Some(state) = self.voices.lock().get_mut(&voice) {
            state.playing = false;
        }
    }

    fn pause(&self, voice: usize) {
        if let Some(state) = self.voices.lock().get_mut(&voice) {
            state.paused = true;
        }
    }

    fn resume(&self, voice: usize) {
        if let Some(state) = self.voices.lock().get_mut(&voice) {
            state.paused = false;
        }
    }

    fn set_params(&self, voice: usize, params: VoiceParams) {
        self.voices.lock().entry(voice).or_default().params = params;
    }

    fn sample_position(&self, voice: usize) -> u64 {
        self.voices
            .lock()
            .get(&voice)
            .map_or(0, |state| state.position)
    }

    fn queued_buffers(&self, voice: usize) -> usize {
        self.voices
            .lock()
            .get(&voice)
            .map_or(0, |state| state.queue.len())
    }

    fn set_buffer_needed(&self, voice: usize, callback: Option<Arc<dyn BufferNeeded>>) {
        self.voices.lock().entry(voice).or_default().callback = callback;
    }

    fn reset(&self, voice: usize) {
        // Dropped outside the lock; a callback may hold the last reference to
        // something that calls back in here when dropped.
        let old = self.voices.lock().remove(&voice);
        drop(old);
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::testutil::eventually;

    const MONO16: PcmFormat = PcmFormat {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
    };

    #[test]
    fn test_consume_plays_in_order() {
        let backend = Backend::capturing();
        backend.configure(0, MONO16).unwrap();
        backend.submit(0, &[1, 0, 2, 0]).unwrap();
        backend.submit(0, &[3, 0]).unwrap();

        // Nothing plays before start.
        assert_eq!(backend.consume(0, 10), 0);

        backend.start(0).unwrap();
        assert_eq!(backend.consume(0, 1), 1);
        assert_eq!(backend.queued_buffers(0), 2);
        assert_eq!(backend.consume(0, 10), 2);
        assert_eq!(backend.queued_buffers(0), 0);
        assert_eq!(backend.sample_position(0), 3);
        assert_eq!(backend.captured(0), vec![1, 0, 2, 0, 3, 0]);
    }

    #[test]
    fn test_submit_rejects_partial_frames() {
        let backend = Backend::new();
        assert!(matches!(
            backend.submit(0, &[0, 0]),
            Err(BackendError::Unconfigured(0))
        ));
        backend.configure(0, MONO16).unwrap();
        assert!(matches!(
            backend.submit(0, &[0, 0, 0]),
            Err(BackendError::PartialFrame { .. })
        ));
    }

    #[test]
    fn test_callback_when_buffer_completes() {
        let backend = Backend::new();
        let calls = Arc::new(AtomicUsize::new(0));
        backend.configure(3, MONO16).unwrap();
        backend.submit(3, &[0; 8]).unwrap();
        backend.submit(3, &[0; 8]).unwrap();
        {
            let calls = calls.clone();
            backend.set_buffer_needed(
                3,
                Some(Arc::new(move |voice: usize| {
                    assert_eq!(voice, 3);
                    calls.fetch_add(1, Ordering::SeqCst);
                })),
            );
        }
        backend.start(3).unwrap();

        backend.consume(3, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        backend.consume(3, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        backend.consume(3, 100);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Dry voices keep asking.
        backend.consume(3, 100);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_pause_holds_position() {
        let backend = Backend::new();
        backend.configure(0, MONO16).unwrap();
        backend.submit(0, &[0; 16]).unwrap();
        backend.start(0).unwrap();
        backend.consume(0, 2);
        backend.pause(0);
        assert_eq!(backend.consume(0, 2), 0);
        backend.resume(0);
        assert_eq!(backend.drain(0), 6);
        assert_eq!(backend.sample_position(0), 8);
    }

    #[test]
    fn test_clock_plays_in_real_time() {
        let backend = Backend::with_clock("clock", Duration::from_millis(5));
        backend.configure(0, MONO16).unwrap();
        backend.submit(0, &vec![0u8; 800]).unwrap();
        backend.start(0).unwrap();

        eventually(
            || backend.sample_position(0) == 400,
            "Clock never finished the buffer",
        );
        assert_eq!(backend.queued_buffers(0), 0);
    }
}
