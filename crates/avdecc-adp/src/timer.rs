// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timer facility shared by every state machine of the engine.
//!
//! Timers are created up front (bounded pool, creation can fail at init),
//! armed/stopped at runtime and destroyed with the record that owns them.
//! A [`TimerId`] carries the slot generation: once destroyed, the id and any
//! deadline it had queued are dead, so a timer can never fire for a freed
//! record.
//!
//! Time is always passed in by the caller; the wheel never reads a clock.

use crate::error::{Error, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Generation-checked handle to a timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct TimerSlot<K> {
    generation: u32,
    kind: Option<K>,
    /// Sequence number of the currently queued deadline
    armed: Option<u64>,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Armed {
    deadline: Instant,
    seq: u64,
    index: u32,
    generation: u32,
}

/// Bounded pool of one-shot timers tagged with a user key `K`.
#[derive(Debug)]
pub struct TimerWheel<K> {
    slots: Vec<TimerSlot<K>>,
    free: Vec<u32>,
    queue: BinaryHeap<Reverse<Armed>>,
    next_seq: u64,
    capacity: usize,
}

impl<K: Copy> TimerWheel<K> {
    /// Create a wheel holding at most `capacity` timers
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
            capacity,
        }
    }

    /// Allocate a stopped timer reporting `kind` when it fires
    pub fn create(&mut self, kind: K) -> Result<TimerId> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.kind = Some(kind);
            slot.armed = None;
            slot.deadline = None;
            return Ok(TimerId {
                index,
                generation: slot.generation,
            });
        }

        if self.slots.len() >= self.capacity {
            log::error!("[timer] pool exhausted ({} timers)", self.capacity);
            return Err(Error::TimerExhausted);
        }

        let index = self.slots.len() as u32;
        self.slots.push(TimerSlot {
            generation: 0,
            kind: Some(kind),
            armed: None,
            deadline: None,
        });

        Ok(TimerId {
            index,
            generation: 0,
        })
    }

    /// Release a timer; the id and any pending expiry become invalid
    pub fn destroy(&mut self, id: TimerId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.generation = slot.generation.wrapping_add(1);
            slot.kind = None;
            slot.armed = None;
            slot.deadline = None;
            self.free.push(id.index);
        }
    }

    /// (Re)arm a timer to fire `after` from `now`
    pub fn start(&mut self, id: TimerId, now: Instant, after: Duration) {
        let seq = self.next_seq;
        let deadline = now + after;

        let Some(slot) = self.slot_mut(id) else {
            log::debug!("[timer] start on stale timer {:?}", id);
            return;
        };
        slot.armed = Some(seq);
        slot.deadline = Some(deadline);

        self.next_seq += 1;
        self.queue.push(Reverse(Armed {
            deadline,
            seq,
            index: id.index,
            generation: id.generation,
        }));
    }

    /// Disarm a timer (no-op if not running)
    pub fn stop(&mut self, id: TimerId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.armed = None;
            slot.deadline = None;
        }
    }

    /// Timer armed and not yet fired
    pub fn is_running(&self, id: TimerId) -> bool {
        self.slot(id).is_some_and(|slot| slot.armed.is_some())
    }

    /// Pending deadline of a running timer
    pub fn deadline(&self, id: TimerId) -> Option<Instant> {
        self.slot(id).and_then(|slot| slot.deadline)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.drop_stale();
        self.queue.peek().map(|Reverse(armed)| armed.deadline)
    }

    /// Pop one timer whose deadline is at or before `now`.
    ///
    /// Handlers may re-arm timers, so callers loop until `None`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<K> {
        self.drop_stale();

        let Reverse(armed) = *self.queue.peek()?;
        if armed.deadline > now {
            return None;
        }
        self.queue.pop();

        let slot = &mut self.slots[armed.index as usize];
        slot.armed = None;
        slot.deadline = None;
        slot.kind
    }

    /// Number of allocated timers
    pub fn allocated(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Pool capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn drop_stale(&mut self) {
        while let Some(Reverse(armed)) = self.queue.peek() {
            let slot = &self.slots[armed.index as usize];
            if slot.generation == armed.generation && slot.armed == Some(armed.seq) {
                break;
            }
            self.queue.pop();
        }
    }

    fn slot(&self, id: TimerId) -> Option<&TimerSlot<K>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.kind.is_some())
    }

    fn slot_mut(&mut self, id: TimerId) -> Option<&mut TimerSlot<K>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.kind.is_some())
    }
}
