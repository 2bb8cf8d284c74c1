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

//! Streaming playback. Each session owns one producer thread that reads a
//! track's payload, decodes it a chunk at a time into a small ring of reusable
//! buffers and queues them. The voice's buffer-needed callback drains the
//! queue into the voice and wakes the producer.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use ::thread_priority::ThreadPriorityValue;
use tracing::{debug, error, info, span, Level};

use crate::bank::{SourceOpener, TrackEntry, TrackFormat};
use crate::codec::{DecodeError, PcmDecoder};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::EventSink;
use crate::instance::LoopCount;
use crate::playsync::CancelHandle;
use crate::thread_priority::{configure_producer_thread_priority, producer_thread_priority};
use crate::voice::{BufferNeeded, VoiceBackend};

/// Tuning for streaming sessions.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Frames per chunk. ADPCM chunks are whole blocks, at least one.
    pub chunk_frames: usize,
    /// Chunks kept queued ahead of the voice.
    pub queue_depth: usize,
    /// Reusable chunk buffers per session.
    pub ring_buffers: usize,
    /// Longest the producer sleeps between refill checks.
    pub poll_interval: Duration,
    pub thread_priority: Option<ThreadPriorityValue>,
}

impl StreamSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        StreamSettings {
            chunk_frames: config.chunk_frames(),
            queue_depth: config.queue_depth(),
            ring_buffers: config.ring_buffers(),
            poll_interval: config.poll_interval(),
            thread_priority: producer_thread_priority(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        StreamSettings::from_config(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the source and reading the payload.
    Initializing,
    Streaming,
    /// Everything is decoded; waiting for the voice to play the rest.
    Draining,
    Finished,
    Failed,
}

/// Everything a session needs to start.
pub(crate) struct SessionRequest {
    pub opener: Arc<dyn SourceOpener>,
    /// Absolute offset of the track payload in the source.
    pub payload_offset: u64,
    pub entry: TrackEntry,
    pub decoder: Arc<dyn PcmDecoder>,
    pub loop_count: LoopCount,
    pub settings: StreamSettings,
    pub backend: Arc<dyn VoiceBackend>,
    pub voice: usize,
    pub events: EventSink,
}

/// State shared by the producer thread and the voice callback.
struct Shared {
    track: u32,
    state: Mutex<SessionState>,
    filled: Receiver<Vec<u8>>,
    recycle: Sender<Vec<u8>>,
    /// Held while draining so chunks reach the voice in decode order even if
    /// the back-end calls back from more than one thread.
    feed: Mutex<()>,
    backend: Arc<dyn VoiceBackend>,
    voice: usize,
    frame_size: usize,
    signal: CancelHandle,
    events: EventSink,
    producing: AtomicBool,
    frames_submitted: AtomicU64,
    loops_played: AtomicU32,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Moves forward unless the session already ended.
    fn advance(&self, next: SessionState) {
        let mut state = self.state.lock();
        if !matches!(*state, SessionState::Finished | SessionState::Failed) {
            *state = next;
        }
    }

    fn fail(&self, err: EngineError) {
        {
            let mut state = self.state.lock();
            if matches!(*state, SessionState::Finished | SessionState::Failed) {
                return;
            }
            *state = SessionState::Failed;
        }
        error!(track = self.track, voice = self.voice, err = %err, "Streaming session failed");
        self.signal.cancel();
        self.events.error(err.to_string());
    }

    fn finish(&self) {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Draining {
                return;
            }
            *state = SessionState::Finished;
        }
        info!(
            track = self.track,
            voice = self.voice,
            frames = self.frames_submitted.load(Ordering::Relaxed),
            loops = self.loops_played.load(Ordering::Relaxed),
            "Streaming session finished"
        );
        self.events.finished();
    }
}

/// The consumer side: installed as the voice's buffer-needed callback.
struct Feeder(Arc<Shared>);

impl BufferNeeded for Feeder {
    fn buffer_needed(&self, _voice: usize) {
        let shared = &self.0;
        if shared.signal.is_cancelled() {
            return;
        }

        let guard = shared.feed.lock();
        while let Ok(chunk) = shared.filled.try_recv() {
            // Disposal can land mid-drain; nothing more reaches the voice.
            if shared.signal.is_cancelled() {
                return;
            }
            if let Err(e) = shared.backend.submit(shared.voice, &chunk) {
                drop(guard);
                shared.fail(e.into());
                return;
            }
            let frames = chunk.len() / shared.frame_size.max(1);
            shared
                .frames_submitted
                .fetch_add(frames as u64, Ordering::Relaxed);
            // The ring is sized for every buffer; this only fails once the
            // producer is gone.
            let _ = shared.recycle.try_send(chunk);
        }
        shared.signal.notify();

        // Checked under the feed lock so a chunk taken by another callback but
        // not yet submitted still counts as pending.
        if shared.state() == SessionState::Draining
            && shared.filled.is_empty()
            && shared.backend.queued_buffers(shared.voice) == 0
        {
            shared.finish();
        }
    }
}

/// One streaming playback. Dropping it stops the producer.
pub struct StreamingSession {
    shared: Arc<Shared>,
}

impl StreamingSession {
    /// Checks the codec and starts the producer thread. An undecodable format
    /// fails here, before any thread exists.
    pub(crate) fn spawn(request: SessionRequest) -> Result<StreamingSession, EngineError> {
        let track = request.entry.index;
        request
            .decoder
            .supports(&request.entry.format)
            .map_err(|e| EngineError::UnsupportedCodec {
                track,
                reason: e.to_string(),
            })?;

        let mut settings = request.settings.clone();
        settings.chunk_frames = settings.chunk_frames.max(1);
        settings.queue_depth = settings.queue_depth.max(1);
        settings.ring_buffers = settings.ring_buffers.max(settings.queue_depth);
        let (queue_depth, ring_buffers) = (settings.queue_depth, settings.ring_buffers);
        let frame_size = request.entry.format.decoded_frame_size();

        let (filled_tx, filled_rx) = crossbeam_channel::bounded(queue_depth);
        let (recycle_tx, recycle_rx) = crossbeam_channel::bounded(ring_buffers);
        let chunk_capacity = settings.chunk_frames * frame_size;
        for _ in 0..ring_buffers {
            let _ = recycle_tx.try_send(Vec::with_capacity(chunk_capacity));
        }

        let shared = Arc::new(Shared {
            track,
            state: Mutex::new(SessionState::Initializing),
            filled: filled_rx,
            recycle: recycle_tx,
            feed: Mutex::new(()),
            backend: request.backend.clone(),
            voice: request.voice,
            frame_size,
            signal: CancelHandle::new(),
            events: request.events,
            producing: AtomicBool::new(true),
            frames_submitted: AtomicU64::new(0),
            loops_played: AtomicU32::new(0),
        });

        let producer = Producer {
            shared: shared.clone(),
            opener: request.opener,
            payload_offset: request.payload_offset,
            entry: request.entry,
            decoder: request.decoder,
            loops: request.loop_count,
            settings,
            filled: filled_tx,
            recycle: recycle_rx,
        };
        let spawned = thread::Builder::new()
            .name(format!("wavebank-stream-{}", request.voice))
            .spawn(move || producer.run());
        if let Err(e) = spawned {
            shared.producing.store(false, Ordering::Release);
            return Err(EngineError::Io(e));
        }

        Ok(StreamingSession { shared })
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// True once the session finished or failed.
    pub fn is_done(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Finished | SessionState::Failed
        )
    }

    /// True while the producer thread is alive.
    pub fn is_producing(&self) -> bool {
        self.shared.producing.load(Ordering::Acquire)
    }

    pub fn frames_submitted(&self) -> u64 {
        self.shared.frames_submitted.load(Ordering::Relaxed)
    }

    /// Times the producer restarted the track.
    pub fn loops_played(&self) -> u32 {
        self.shared.loops_played.load(Ordering::Relaxed)
    }

    /// The callback to install on the session's voice.
    pub fn feeder(&self) -> Arc<dyn BufferNeeded> {
        Arc::new(Feeder(self.shared.clone()))
    }

    pub fn watch(&self) -> SessionWatch {
        SessionWatch(self.shared.clone())
    }

    /// Tells the producer to exit and the feeder to stop submitting. Does
    /// not wait for the producer.
    pub fn cancel(&self) {
        self.shared.signal.cancel();
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("track", &self.shared.track)
            .field("voice", &self.shared.voice)
            .field("state", &self.state())
            .field("frames_submitted", &self.frames_submitted())
            .finish()
    }
}

/// Read-only view of a session. Stays usable after the session is dropped,
/// so a caller can see the producer wind down.
#[derive(Clone)]
pub struct SessionWatch(Arc<Shared>);

impl SessionWatch {
    pub fn state(&self) -> SessionState {
        self.0.state()
    }

    pub fn is_producing(&self) -> bool {
        self.0.producing.load(Ordering::Acquire)
    }

    pub fn frames_submitted(&self) -> u64 {
        self.0.frames_submitted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SessionWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWatch")
            .field("track", &self.0.track)
            .field("state", &self.state())
            .field("producing", &self.is_producing())
            .finish()
    }
}

struct Producer {
    shared: Arc<Shared>,
    opener: Arc<dyn SourceOpener>,
    payload_offset: u64,
    entry: TrackEntry,
    decoder: Arc<dyn PcmDecoder>,
    loops: LoopCount,
    settings: StreamSettings,
    filled: Sender<Vec<u8>>,
    recycle: Receiver<Vec<u8>>,
}

impl Producer {
    fn run(mut self) {
        configure_producer_thread_priority(self.settings.thread_priority);
        let span = span!(
            Level::INFO,
            "stream session",
            track = self.entry.index,
            voice = self.shared.voice
        );
        let _enter = span.enter();

        if let Err(err) = self.produce() {
            self.shared.fail(err);
        }
        self.shared.producing.store(false, Ordering::Release);
        debug!("Producer exited");
    }

    fn produce(&mut self) -> Result<(), EngineError> {
        let payload = self
            .opener
            .open()
            .and_then(|source| source.read_range(self.payload_offset, self.entry.file_length))
            .map_err(|source| EngineError::StreamRead {
                track: self.entry.index,
                source,
            })?;
        if self.shared.signal.is_cancelled() {
            return Ok(());
        }

        let mut cursor = ChunkCursor::new(
            &payload,
            self.entry.format,
            self.entry.total_samples,
            self.settings.chunk_frames,
        );
        // An empty track has nothing to loop.
        if cursor.is_empty() {
            self.loops = LoopCount::Finite(0);
        }
        self.shared.advance(SessionState::Streaming);
        debug!(
            bytes = payload.len(),
            frames = self.entry.total_samples,
            loops = %self.loops,
            "Streaming started"
        );

        let mut spare: Option<Vec<u8>> = None;
        loop {
            if self.shared.signal.is_cancelled() {
                return Ok(());
            }

            while self.filled.len() < self.settings.queue_depth {
                if self.shared.signal.is_cancelled() {
                    return Ok(());
                }
                if cursor.is_exhausted() {
                    // A pass that yielded nothing would loop without end.
                    if cursor.pass_frames() == 0 {
                        self.loops = LoopCount::Finite(0);
                    }
                    if !self.loops.take() {
                        break;
                    }
                    cursor.rewind();
                    let loops = self.shared.loops_played.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(loops, "Looping");
                }
                let Some(mut buffer) = spare.take().or_else(|| self.recycle.try_recv().ok())
                else {
                    break;
                };
                buffer.clear();
                let frames = cursor.next_chunk(self.decoder.as_ref(), &mut buffer)?;
                if frames == 0 {
                    spare = Some(buffer);
                    continue;
                }
                // Only this thread sends and the queue had room, so this
                // never blocks.
                if self.filled.send(buffer).is_err() {
                    return Ok(());
                }
            }

            if cursor.is_exhausted() && self.loops.is_exhausted() {
                self.shared.advance(SessionState::Draining);
                debug!("Draining");
                return Ok(());
            }

            if self.shared.signal.wait_timeout(self.settings.poll_interval) {
                return Ok(());
            }
        }
    }
}

/// Walks a payload chunk by chunk.
struct ChunkCursor<'a> {
    payload: &'a [u8],
    format: TrackFormat,
    total_frames: u64,
    chunk_bytes: usize,
    block_align: usize,
    frame_size: usize,
    byte_pos: usize,
    frames_done: u64,
}

impl<'a> ChunkCursor<'a> {
    fn new(payload: &'a [u8], format: TrackFormat, total_frames: u64, chunk_frames: usize) -> Self {
        let block_align = (format.block_align() as usize).max(1);
        let chunk_bytes = if format.codec.is_adpcm() {
            let frames_per_block = (format.frames_per_block() as usize).max(1);
            (chunk_frames / frames_per_block).max(1) * block_align
        } else {
            chunk_frames.max(1) * block_align
        };
        ChunkCursor {
            payload,
            format,
            total_frames,
            chunk_bytes,
            block_align,
            frame_size: format.decoded_frame_size(),
            byte_pos: 0,
            frames_done: 0,
        }
    }

    /// True when the payload cannot hold a single frame or block.
    fn is_empty(&self) -> bool {
        self.payload.len() < self.block_align || self.total_frames == 0
    }

    /// Frames produced since the last rewind.
    fn pass_frames(&self) -> u64 {
        self.frames_done
    }

    fn is_exhausted(&self) -> bool {
        self.frames_done >= self.total_frames || self.byte_pos >= self.payload.len()
    }

    fn rewind(&mut self) {
        self.byte_pos = 0;
        self.frames_done = 0;
    }

    /// Decodes the next chunk into `out`. Never yields more than the track's
    /// total frame count.
    fn next_chunk(
        &mut self,
        decoder: &dyn PcmDecoder,
        out: &mut Vec<u8>,
    ) -> Result<u64, DecodeError> {
        let end = (self.byte_pos + self.chunk_bytes).min(self.payload.len());
        let input = &self.payload[self.byte_pos..end];
        self.byte_pos = end;

        let mut frames = decoder.decode_into(input, &self.format, out)?;
        let remaining = self.total_frames.saturating_sub(self.frames_done);
        if frames > remaining {
            frames = remaining;
            out.truncate(frames as usize * self.frame_size);
        }
        self.frames_done += frames;
        Ok(frames)
    }
}
