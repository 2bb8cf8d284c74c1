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

//! Logical playback instances and what drives their voices.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bank::{BankId, DecodedAudioBuffer};
use crate::error::EngineError;
use crate::event::EventSink;
use crate::stream::{SessionWatch, StreamingSession};
use crate::voice::{BufferNeeded, VoiceBackend, VoiceHandle, VoiceParams};

mod pool;

pub use pool::InstancePool;

/// Identifies one use of a playback instance. A pooled instance gets a new
/// id every time it is handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

/// The audio an instance was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetId {
    pub bank: BankId,
    pub track: u32,
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bank, self.track)
    }
}

/// How many times playback restarts after the first pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Finite(u32),
    Infinite,
}

impl LoopCount {
    /// The byte banks use for "loop forever".
    pub const INFINITE_BYTE: u8 = 255;

    /// Uses up one restart. Returns false when none are left.
    pub fn take(&mut self) -> bool {
        match self {
            LoopCount::Infinite => true,
            LoopCount::Finite(0) => false,
            LoopCount::Finite(n) => {
                *n -= 1;
                true
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, LoopCount::Finite(0))
    }
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::Finite(0)
    }
}

impl From<u8> for LoopCount {
    fn from(value: u8) -> Self {
        if value == Self::INFINITE_BYTE {
            LoopCount::Infinite
        } else {
            LoopCount::Finite(u32::from(value))
        }
    }
}

impl fmt::Display for LoopCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopCount::Finite(n) => write!(f, "{n}"),
            LoopCount::Infinite => write!(f, "infinite"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Sitting in the pool's free list.
    Pooled,
    /// Idle and owned by a caller.
    Stopped,
    Active,
    Paused,
    Disposed,
}

/// Feeds a resident buffer to a voice, once per pass.
pub(crate) struct ResidentPlayback {
    buffer: Arc<DecodedAudioBuffer>,
    backend: Arc<dyn VoiceBackend>,
    voice: usize,
    loops: Mutex<LoopCount>,
    finished: AtomicBool,
    events: EventSink,
}

impl ResidentPlayback {
    pub(crate) fn new(
        buffer: Arc<DecodedAudioBuffer>,
        backend: Arc<dyn VoiceBackend>,
        voice: usize,
        loops: LoopCount,
        events: EventSink,
    ) -> Self {
        // Looping nothing would never end.
        let loops = if buffer.data().is_empty() {
            LoopCount::Finite(0)
        } else {
            loops
        };
        ResidentPlayback {
            buffer,
            backend,
            voice,
            loops: Mutex::new(loops),
            finished: AtomicBool::new(false),
            events,
        }
    }

    /// Queues the first pass.
    pub(crate) fn prime(&self) -> Result<(), EngineError> {
        self.backend.submit(self.voice, self.buffer.data())?;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl BufferNeeded for ResidentPlayback {
    fn buffer_needed(&self, voice: usize) {
        if self.is_finished() {
            return;
        }
        let mut loops = self.loops.lock();
        // Two passes in flight keep the voice from running dry at the seam.
        while self.backend.queued_buffers(voice) < 2 && loops.take() {
            if let Err(e) = self.backend.submit(voice, self.buffer.data()) {
                warn!(voice, err = %e, "Resident resubmit failed");
                *loops = LoopCount::Finite(0);
                if !self.finished.swap(true, Ordering::AcqRel) {
                    self.events.error(e.to_string());
                }
                return;
            }
        }
        if loops.is_exhausted()
            && self.backend.queued_buffers(voice) == 0
            && !self.finished.swap(true, Ordering::AcqRel)
        {
            debug!(voice, "Resident playback finished");
            self.events.finished();
        }
    }
}

/// What is driving an instance's voice.
pub(crate) enum Playback {
    Resident(Arc<ResidentPlayback>),
    Streaming(StreamingSession),
}

impl Playback {
    pub(crate) fn feeder(&self) -> Arc<dyn BufferNeeded> {
        match self {
            Playback::Resident(resident) => resident.clone() as Arc<dyn BufferNeeded>,
            Playback::Streaming(session) => session.feeder(),
        }
    }

    /// True once playback ended on its own, by finishing or by failing.
    pub(crate) fn is_done(&self) -> bool {
        match self {
            Playback::Resident(resident) => resident.is_finished(),
            Playback::Streaming(session) => session.is_done(),
        }
    }

    /// Tells any producer to stop.
    pub(crate) fn cancel(&self) {
        if let Playback::Streaming(session) = self {
            session.cancel();
        }
    }
}

struct InstanceInner {
    id: InstanceId,
    state: InstanceState,
    params: VoiceParams,
    loop_count: LoopCount,
    asset: Option<AssetId>,
    voice: Option<VoiceHandle>,
    playback: Option<Playback>,
    pooled: bool,
    exclusive: bool,
}

/// A reusable wrapper around one playback. Bound to at most one voice at a
/// time.
pub struct PlaybackInstance {
    inner: Mutex<InstanceInner>,
    disposed: AtomicBool,
    /// Set while the instance sits in the pool's free list. Only changed with
    /// the pool lock held.
    free: AtomicBool,
}

impl PlaybackInstance {
    pub(crate) fn new(id: InstanceId, pooled: bool) -> Self {
        PlaybackInstance {
            inner: Mutex::new(InstanceInner {
                id,
                state: InstanceState::Stopped,
                params: VoiceParams::default(),
                loop_count: LoopCount::default(),
                asset: None,
                voice: None,
                playback: None,
                pooled,
                exclusive: false,
            }),
            disposed: AtomicBool::new(false),
            free: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.inner.lock().id
    }

    pub fn state(&self) -> InstanceState {
        if self.is_disposed() {
            return InstanceState::Disposed;
        }
        if self.is_free() {
            return InstanceState::Pooled;
        }
        self.inner.lock().state
    }

    pub fn params(&self) -> VoiceParams {
        self.inner.lock().params
    }

    pub fn loop_count(&self) -> LoopCount {
        self.inner.lock().loop_count
    }

    pub fn asset(&self) -> Option<AssetId> {
        self.inner.lock().asset
    }

    pub fn voice(&self) -> Option<VoiceHandle> {
        self.inner.lock().voice
    }

    /// True for instances handed out by the pool rather than created directly.
    pub fn is_pooled(&self) -> bool {
        self.inner.lock().pooled
    }

    /// True if the instance was acquired to own a streaming session.
    pub fn is_exclusive(&self) -> bool {
        self.inner.lock().exclusive
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// True while the instance is in the pool's free list.
    pub fn is_free(&self) -> bool {
        self.free.load(Ordering::Acquire)
    }

    /// Flips free-list membership. Returns false if it already had that value.
    /// Callers hold the pool lock.
    pub(crate) fn set_free(&self, free: bool) -> bool {
        self.free.swap(free, Ordering::AcqRel) != free
    }

    /// The streaming session driving this instance, if it has one.
    pub fn session(&self) -> Option<SessionWatch> {
        match self.inner.lock().playback.as_ref()? {
            Playback::Streaming(session) => Some(session.watch()),
            Playback::Resident(_) => None,
        }
    }

    /// True once the current playback ended on its own.
    pub fn is_done(&self) -> bool {
        self.inner
            .lock()
            .playback
            .as_ref()
            .is_some_and(Playback::is_done)
    }

    /// Marks the instance disposed. Returns false if it already was.
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    /// Gives a pooled instance a new identity with default settings.
    pub(crate) fn reset_for_reuse(&self, id: InstanceId, exclusive: bool) {
        let mut inner = self.inner.lock();
        inner.id = id;
        inner.state = InstanceState::Stopped;
        inner.params = VoiceParams::default();
        inner.loop_count = LoopCount::default();
        inner.asset = None;
        inner.exclusive = exclusive;
    }

    /// Drops the asset binding ahead of a return to the free list. Returns
    /// false if the instance was handed out again under a new id since `id`.
    pub(crate) fn clear_for_pool(&self, id: InstanceId) -> bool {
        let mut inner = self.inner.lock();
        if inner.id != id {
            return false;
        }
        inner.state = InstanceState::Stopped;
        inner.asset = None;
        true
    }

    pub(crate) fn set_stopped(&self) {
        self.inner.lock().state = InstanceState::Stopped;
    }

    pub(crate) fn bind_asset(&self, asset: AssetId, params: VoiceParams, loop_count: LoopCount) {
        let mut inner = self.inner.lock();
        inner.asset = Some(asset);
        inner.params = params;
        inner.loop_count = loop_count;
    }

    pub(crate) fn attach(&self, voice: VoiceHandle, playback: Playback) {
        let mut inner = self.inner.lock();
        inner.voice = Some(voice);
        inner.playback = Some(playback);
        inner.state = InstanceState::Active;
    }

    /// Takes the voice and playback off the instance. The caller tears
    /// them down after the instance lock is gone.
    pub(crate) fn detach(&self) -> (Option<VoiceHandle>, Option<Playback>) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, InstanceState::Active | InstanceState::Paused) {
            inner.state = InstanceState::Stopped;
        }
        (inner.voice.take(), inner.playback.take())
    }

    /// Moves between Active and Paused. Returns the bound voice if the
    /// transition happened.
    pub(crate) fn set_paused(&self, paused: bool) -> Option<VoiceHandle> {
        let mut inner = self.inner.lock();
        let (from, to) = if paused {
            (InstanceState::Active, InstanceState::Paused)
        } else {
            (InstanceState::Paused, InstanceState::Active)
        };
        if inner.state != from {
            return None;
        }
        inner.state = to;
        inner.voice
    }

    /// Updates the mix parameters and returns them with the bound voice.
    pub(crate) fn update_params(
        &self,
        f: impl FnOnce(&mut VoiceParams),
    ) -> (VoiceParams, Option<VoiceHandle>) {
        let mut inner = self.inner.lock();
        f(&mut inner.params);
        (inner.params, inner.voice)
    }
}

impl fmt::Debug for PlaybackInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PlaybackInstance")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .field("asset", &inner.asset)
            .field("voice", &inner.voice)
            .field("pooled", &inner.pooled)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
