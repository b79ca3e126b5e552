// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::core::cmp::Reverse;
use ::std::collections::BinaryHeap;

//==============================================================================
// Structures
//==============================================================================

struct TimerQueueEntry<T> {
    expiry: u64,
    // Insertion order, so that timers with the same expiry fire in the order they were armed.
    order: u64,
    item: T,
}

/// Queue of events that fire at a given slow-clock tick.
///
/// The queue does not support removal. Owners that need to cancel an event tag it with a generation number and ignore
/// stale events when they fire.
pub struct TimerQueue<T> {
    now: u64,
    next_order: u64,
    // Use a reverse to get a min heap.
    heap: BinaryHeap<Reverse<TimerQueueEntry<T>>>,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl<T> TimerQueue<T> {
    pub fn new(now: u64) -> Self {
        Self {
            now,
            next_order: 0,
            heap: BinaryHeap::new(),
        }
    }

    /// Moves the clock forward and hands back every event that expired on the way, earliest first.
    pub fn advance_clock(&mut self, now: u64) -> Vec<T> {
        let mut expired: Vec<T> = Vec::new();
        // Time never goes backwards.
        let now: u64 = now.max(self.now);
        while let Some(Reverse(entry)) = self.heap.peek() {
            if now < entry.expiry {
                break;
            }
            if let Some(Reverse(entry)) = self.heap.pop() {
                expired.push(entry.item);
            }
        }
        self.now = now;
        expired
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedules `item` to fire `timeout` ticks from now.
    pub fn schedule(&mut self, timeout: u64, item: T) {
        let expiry: u64 = self.now.saturating_add(timeout);
        self.schedule_at(expiry, item)
    }

    pub fn schedule_at(&mut self, expiry: u64, item: T) {
        let order: u64 = self.next_order;
        self.next_order = self.next_order.wrapping_add(1);
        self.heap.push(Reverse(TimerQueueEntry { expiry, order, item }));
    }

    /// Number of pending events, stale ones included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl<T> PartialEq for TimerQueueEntry<T> {
    fn eq(&self, other: &TimerQueueEntry<T>) -> bool {
        self.expiry == other.expiry && self.order == other.order
    }
}

impl<T> Eq for TimerQueueEntry<T> {}

impl<T> PartialOrd for TimerQueueEntry<T> {
    fn partial_cmp(&self, other: &TimerQueueEntry<T>) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TimerQueueEntry<T> {
    fn cmp(&self, other: &TimerQueueEntry<T>) -> core::cmp::Ordering {
        // Compare timer queue entries by expiration time, then by arming order.
        self.expiry
            .cmp(&other.expiry)
            .then_with(|| self.order.cmp(&other.order))
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
