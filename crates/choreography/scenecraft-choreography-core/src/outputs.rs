//! Run lifecycle events and dispatch reports.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::ids::RunId;
use crate::run::RunState;

/// Discrete lifecycle signals emitted by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[non_exhaustive]
pub enum RunEvent {
    Started {
        run: RunId,
        definition: String,
        correlation_id: Option<String>,
        at: Millis,
    },
    Completed {
        run: RunId,
        definition: String,
        at: Millis,
    },
    Interrupted {
        run: RunId,
        definition: String,
        at: Millis,
    },
    Aborted {
        run: RunId,
        definition: String,
        at: Millis,
    },
}

impl RunEvent {
    pub fn run(&self) -> RunId {
        match self {
            RunEvent::Started { run, .. }
            | RunEvent::Completed { run, .. }
            | RunEvent::Interrupted { run, .. }
            | RunEvent::Aborted { run, .. } => *run,
        }
    }

    /// Terminal state this event records, if any.
    pub fn terminal_state(&self) -> Option<RunState> {
        match self {
            RunEvent::Started { .. } => None,
            RunEvent::Completed { .. } => Some(RunState::Completed),
            RunEvent::Interrupted { .. } => Some(RunState::Interrupted),
            RunEvent::Aborted { .. } => Some(RunState::Aborted),
        }
    }
}

/// Bounded FIFO of run events.
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    events: VecDeque<RunEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, event: RunEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<RunEvent> {
        self.events.drain(..).collect()
    }
}

/// What one `dispatch` call did.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// Choreographies whose trigger matched, in registration order.
    pub matched: Vec<String>,
    pub spawned: Vec<RunId>,
    pub interrupted: Vec<RunId>,
    /// Spawned runs that finished within the dispatch itself.
    pub completed: Vec<RunId>,
    pub bindings_applied: usize,
}
