// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Double-buffered command queue with last-write-wins draining.
//!
//! Producers append to the front buffer under a short lock. The sync loop
//! swaps buffers under the same lock and coalesces the drained batch after
//! releasing it, so producers never wait on a flush.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use wall_proto::Command;

#[derive(Debug, Default)]
struct Buffers {
    front: Vec<Command>,
    back: Vec<Command>,
}

/// Commands waiting for the next flush.
#[derive(Debug, Default)]
pub struct CommandQueue {
    buffers: Mutex<Buffers>,
}

impl CommandQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command for the next flush.
    pub fn push(&self, command: Command) {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .front
            .push(command);
    }

    /// Number of commands queued since the last drain.
    pub fn len(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .front
            .len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes everything queued and keeps only the last command per name.
    ///
    /// Survivors are ordered by where their final instance appeared.
    pub fn drain_coalesced(&self) -> Vec<Command> {
        let mut batch = {
            let mut guard = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
            let Buffers { front, back } = &mut *guard;
            std::mem::swap(front, back);
            std::mem::take(back)
        };
        let survivors = coalesce(&mut batch);
        // Hand the emptied allocation back so the next swap reuses it.
        let mut guard = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.back.capacity() < batch.capacity() {
            guard.back = batch;
        }
        survivors
    }
}

fn coalesce(batch: &mut Vec<Command>) -> Vec<Command> {
    let mut keep = vec![false; batch.len()];
    let mut last: HashMap<&str, usize> = HashMap::with_capacity(batch.len());
    for (idx, cmd) in batch.iter().enumerate() {
        last.insert(cmd.name.as_str(), idx);
    }
    for idx in last.into_values() {
        if let Some(slot) = keep.get_mut(idx) {
            *slot = true;
        }
    }
    batch
        .drain(..)
        .zip(keep)
        .filter_map(|(cmd, kept)| kept.then_some(cmd))
        .collect()
}
