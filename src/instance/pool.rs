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
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::debug;

use super::{AssetId, InstanceId, PlaybackInstance};
use crate::error::EngineError;

#[derive(Default)]
struct PoolState {
    free: Vec<Arc<PlaybackInstance>>,
    playing: HashMap<InstanceId, Arc<PlaybackInstance>>,
}

/// Reuses playback instances and tracks which ones are playing.
///
/// The pool lock is never held while an instance's own lock is taken, and
/// never while voices are touched. Free-list membership is the instance's
/// `free` flag, which only changes under the pool lock.
pub struct InstancePool {
    state: Mutex<PoolState>,
    max_playing: usize,
    next_id: AtomicU64,
}

impl InstancePool {
    pub fn new(max_playing: usize) -> Self {
        InstancePool {
            state: Mutex::new(PoolState::default()),
            max_playing,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> InstanceId {
        InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Hands out a pooled instance with default settings, reusing a free one
    /// when there is one.
    pub fn acquire(&self, exclusive: bool) -> Arc<PlaybackInstance> {
        let id = self.next_id();
        let reused = {
            let mut state = self.state.lock();
            let reused = state.free.pop();
            if let Some(instance) = &reused {
                instance.set_free(false);
            }
            reused
        };
        match reused {
            Some(instance) => {
                instance.reset_for_reuse(id, exclusive);
                instance
            }
            None => {
                let instance = Arc::new(PlaybackInstance::new(id, true));
                instance.reset_for_reuse(id, exclusive);
                instance
            }
        }
    }

    /// Creates an instance owned by the caller. It never enters the free list.
    pub fn create(&self) -> Arc<PlaybackInstance> {
        Arc::new(PlaybackInstance::new(self.next_id(), false))
    }

    /// Takes an instance out of the playing set and, if it is pooled and
    /// still usable, puts it back on the free list.
    pub fn release(&self, instance: &Arc<PlaybackInstance>) {
        let id = instance.id();
        let candidate = instance.is_pooled() && !instance.is_disposed();
        let candidate = if candidate {
            // Handed out again since `id` was read: the new owner keeps it.
            instance.clear_for_pool(id)
        } else {
            instance.set_stopped();
            false
        };

        let mut state = self.state.lock();
        state.playing.remove(&id);
        let recycle = candidate && instance.set_free(true);
        if recycle {
            state.free.push(instance.clone());
        }
        debug!(
            instance = %id,
            recycled = recycle,
            free = state.free.len(),
            playing = state.playing.len(),
            "Released instance"
        );
    }

    /// Adds an instance to the playing set, refusing when it is full or when
    /// the instance is sitting in the free list.
    pub fn mark_playing(&self, instance: &Arc<PlaybackInstance>) -> Result<(), EngineError> {
        let id = instance.id();
        let mut state = self.state.lock();
        if instance.is_free() {
            return Err(EngineError::Released);
        }
        if state.playing.contains_key(&id) {
            return Ok(());
        }
        if state.playing.len() >= self.max_playing {
            return Err(EngineError::InstanceLimit(self.max_playing));
        }
        state.playing.insert(id, instance.clone());
        Ok(())
    }

    /// Removes an instance from the playing set. Returns false if it was not
    /// in it.
    pub fn unmark_playing(&self, id: InstanceId) -> bool {
        self.state.lock().playing.remove(&id).is_some()
    }

    pub fn find(&self, id: InstanceId) -> Option<Arc<PlaybackInstance>> {
        self.state.lock().playing.get(&id).cloned()
    }

    pub fn playing_count(&self) -> usize {
        self.state.lock().playing.len()
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    pub fn max_playing(&self) -> usize {
        self.max_playing
    }

    /// A copy of the playing set, safe to walk while instances come and go.
    pub fn playing_snapshot(&self) -> Vec<Arc<PlaybackInstance>> {
        self.state.lock().playing.values().cloned().collect()
    }

    /// Stops and releases every playing instance started from `asset`.
    /// `stop` runs without the pool lock held. Returns how many were stopped.
    pub fn stop_all_for_asset(
        &self,
        asset: AssetId,
        mut stop: impl FnMut(&Arc<PlaybackInstance>),
    ) -> usize {
        let matching: Vec<Arc<PlaybackInstance>> = self
            .playing_snapshot()
            .into_iter()
            .filter(|instance| instance.asset() == Some(asset))
            .collect();
        for instance in &matching {
            stop(instance);
            self.release(instance);
        }
        debug!(asset = %asset, stopped = matching.len(), "Stopped all instances of asset");
        matching.len()
    }
}

impl std::fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InstancePool")
            .field("free", &state.free.len())
            .field("playing", &state.playing.len())
            .field("max_playing", &self.max_playing)
            .finish()
    }
}
