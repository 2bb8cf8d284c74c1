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
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{VoiceBackend, VoiceExhaustedError, VoiceHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Reserved,
    /// Handed back, back-end reset still in progress.
    Releasing,
}

struct Slot {
    generation: u32,
    state: SlotState,
}

struct PoolState {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

/// Fixed-capacity set of hardware voices. Reservation never blocks.
pub struct HardwareVoicePool {
    backend: Arc<dyn VoiceBackend>,
    state: Mutex<PoolState>,
    capacity: usize,
}

impl HardwareVoicePool {
    /// Creates a pool with every slot pre-allocated and free.
    pub fn new(backend: Arc<dyn VoiceBackend>, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                state: SlotState::Free,
            })
            .collect();
        // Reversed so the lowest index is popped first.
        let free = (0..capacity as u32).rev().collect();
        HardwareVoicePool {
            backend,
            state: Mutex::new(PoolState { slots, free }),
            capacity,
        }
    }

    /// Takes a free voice, or fails immediately if there is none.
    pub fn reserve(&self) -> Result<VoiceHandle, VoiceExhaustedError> {
        let mut state = self.state.lock();
        let Some(index) = state.free.pop() else {
            return Err(VoiceExhaustedError);
        };
        let slot = &mut state.slots[index as usize];
        slot.state = SlotState::Reserved;
        Ok(VoiceHandle::new(index, slot.generation))
    }

    /// Returns a voice to the free set and clears its back-end binding.
    /// Releasing a stale or already released handle does nothing; the return
    /// value says whether this call did the release.
    pub fn release(&self, handle: VoiceHandle) -> bool {
        {
            let mut state = self.state.lock();
            let Some(slot) = state.slots.get_mut(handle.index()) else {
                warn!(voice = %handle, "Release of voice outside the pool");
                return false;
            };
            if slot.generation != handle.generation() || slot.state != SlotState::Reserved {
                return false;
            }
            slot.state = SlotState::Releasing;
            slot.generation = slot.generation.wrapping_add(1);
        }

        // The back-end may call into callbacks that touch this pool, so the
        // reset happens unlocked.
        self.backend.reset(handle.index());

        let mut state = self.state.lock();
        state.slots[handle.index()].state = SlotState::Free;
        state.free.push(handle.index() as u32);
        debug!(voice = %handle, free = state.free.len(), "Released voice");
        true
    }

    /// True while `handle` is the current reservation of its slot.
    pub fn is_reserved(&self, handle: VoiceHandle) -> bool {
        let state = self.state.lock();
        state
            .slots
            .get(handle.index())
            .is_some_and(|slot| {
                slot.generation == handle.generation() && slot.state == SlotState::Reserved
            })
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn backend(&self) -> &Arc<dyn VoiceBackend> {
        &self.backend
    }
}

impl std::fmt::Debug for HardwareVoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareVoicePool")
            .field("capacity", &self.capacity)
            .field("free", &self.free_count())
            .finish()
    }
}
