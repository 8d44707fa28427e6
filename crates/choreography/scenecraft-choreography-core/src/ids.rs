//! Identifiers and simple allocators for runtime entities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One spawned execution of a choreography.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

/// A sequential cursor inside a run (the root step list or a structural child list).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct BranchId(pub u32);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Monotonic allocator for RunId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_run: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_run(&mut self) -> RunId {
        let id = RunId(self.next_run);
        self.next_run = self.next_run.wrapping_add(1);
        id
    }
}
