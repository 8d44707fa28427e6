//! Injectable time source for run timers.
//!
//! The engine never sleeps. It asks the clock to schedule a token after a delay
//! and later pulls due tokens out while the host advances time. [`VirtualClock`]
//! is fully deterministic; hosts with their own frame loop can implement
//! [`Clock`] over it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::HashSet;

use crate::ids::{BranchId, RunId};

/// Milliseconds on the engine clock.
pub type Millis = u64;

/// Cancellation handle returned by [`Clock::schedule_after`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TimerHandle(pub u64);

/// What a timer wakes when it fires.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TimerToken {
    pub run: RunId,
    pub branch: BranchId,
}

pub trait Clock {
    fn now(&self) -> Millis;

    fn schedule_after(&mut self, delay: Millis, token: TimerToken) -> TimerHandle;

    /// Returns false when the handle already fired or was cancelled.
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    /// Pop the earliest timer due at or before `until`, moving `now` to its due
    /// time. Timers due at the same instant pop in scheduling order.
    fn pop_due(&mut self, until: Millis) -> Option<(TimerHandle, TimerToken)>;

    /// Move `now` forward to `t` (never backwards).
    fn advance_to(&mut self, t: Millis);

    fn pending(&self) -> usize;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
struct Entry {
    due: Millis,
    handle: TimerHandle,
    run: RunId,
    branch: BranchId,
}

/// Manually advanced clock backed by a min-heap.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Millis,
    next_handle: u64,
    heap: BinaryHeap<Reverse<Entry>>,
    live: HashSet<TimerHandle>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: Millis) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Due time of the earliest live timer.
    pub fn next_deadline(&mut self) -> Option<Millis> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse(e)| e.due)
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse(head)) = self.heap.peek() {
            if self.live.contains(&head.handle) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Millis {
        self.now
    }

    fn schedule_after(&mut self, delay: Millis, token: TimerToken) -> TimerHandle {
        // handles are allocated in order, so they double as the FIFO tiebreak
        let handle = TimerHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.heap.push(Reverse(Entry {
            due: self.now.saturating_add(delay),
            handle,
            run: token.run,
            branch: token.branch,
        }));
        self.live.insert(handle);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle)
    }

    fn pop_due(&mut self, until: Millis) -> Option<(TimerHandle, TimerToken)> {
        self.discard_cancelled();
        let Reverse(head) = self.heap.peek()?;
        if head.due > until {
            return None;
        }
        let Reverse(entry) = self.heap.pop()?;
        self.live.remove(&entry.handle);
        self.now = self.now.max(entry.due);
        Some((
            entry.handle,
            TimerToken {
                run: entry.run,
                branch: entry.branch,
            },
        ))
    }

    fn advance_to(&mut self, t: Millis) {
        self.now = self.now.max(t);
    }

    fn pending(&self) -> usize {
        self.live.len()
    }
}
