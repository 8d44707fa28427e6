//! Per-run interpreter.
//!
//! A run walks its compiled step tree as a set of branches. Each branch is a
//! sequential cursor over a slice of one step list; `parallel` forks one child
//! branch per child group and `onArrive` forks one branch over its children.
//! Branches suspend only on a pending delay/duration timer or on outstanding
//! children, so a run's whole state is `branches` plus the timers they hold.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, Millis, TimerHandle, TimerToken};
use crate::executor::{ActionCall, StageHost};
use crate::ids::{BranchId, RunId};
use crate::resolve::{resolve_entity_ref, resolve_params, AbsentParamPolicy};
use crate::signal::SignalEnvelope;
use crate::step::{LeafAction, Step, StepKind};

/// Lifecycle of a run. Runs are created already `Running`; active runs report
/// `Running` in their snapshot and terminal states arrive as [`crate::RunEvent`]s.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Running,
    Completed,
    Interrupted,
    Aborted,
}

/// Read-only view of an active run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub definition_id: String,
    pub correlation_id: Option<String>,
    pub started_at: Millis,
    pub state: RunState,
    pub active_timers: usize,
    /// Ids of the steps each live branch is parked on.
    pub cursor: Vec<String>,
}

/// Borrowed collaborators for one burst of execution.
pub(crate) struct StepContext<'a> {
    pub clock: &'a mut dyn Clock,
    pub host: &'a mut dyn StageHost,
    pub absent: AbsentParamPolicy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    /// At `index`, delay not yet considered.
    Ready,
    Delaying(TimerHandle),
    /// Delay elapsed; start the step now.
    DelayElapsed,
    /// Leaf duration running.
    Running(TimerHandle),
    /// Structural step waiting on child branches.
    Waiting { pending: usize },
    Done,
}

#[derive(Debug)]
struct Branch {
    steps: Arc<[Step]>,
    index: usize,
    end: usize,
    phase: Phase,
    parent: Option<BranchId>,
}

impl Branch {
    fn advance(&mut self) {
        self.index += 1;
        self.phase = Phase::Ready;
    }

    fn timer(&self) -> Option<TimerHandle> {
        match self.phase {
            Phase::Delaying(h) | Phase::Running(h) => Some(h),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Run {
    pub id: RunId,
    pub definition_id: String,
    pub correlation_id: Option<String>,
    pub started_at: Millis,
    signal: Arc<SignalEnvelope>,
    steps: Arc<[Step]>,
    default_entity: Option<String>,
    branches: Vec<Branch>,
}

const ROOT: BranchId = BranchId(0);

impl Run {
    pub fn new(
        id: RunId,
        definition_id: String,
        signal: Arc<SignalEnvelope>,
        steps: Arc<[Step]>,
        default_entity: Option<String>,
        started_at: Millis,
    ) -> Self {
        let root = Branch {
            end: steps.len(),
            steps: steps.clone(),
            index: 0,
            phase: Phase::Ready,
            parent: None,
        };
        Self {
            id,
            definition_id,
            correlation_id: signal.correlation_id.clone(),
            started_at,
            signal,
            steps,
            default_entity,
            branches: vec![root],
        }
    }

    pub fn is_complete(&self) -> bool {
        self.branches[ROOT.0 as usize].phase == Phase::Done
    }

    pub fn state(&self) -> RunState {
        if self.is_complete() {
            RunState::Completed
        } else {
            RunState::Running
        }
    }

    /// Run the root branch until it suspends. Returns true when the run finished.
    pub fn start(&mut self, cx: &mut StepContext<'_>) -> bool {
        self.pump(VecDeque::from([ROOT]), cx)
    }

    /// Resume the branch a fired timer belongs to. Stale timers are ignored.
    pub fn on_timer(&mut self, branch: BranchId, handle: TimerHandle, cx: &mut StepContext<'_>) -> bool {
        let Some(br) = self.branches.get_mut(branch.0 as usize) else {
            return self.is_complete();
        };
        let phase = br.phase;
        match phase {
            Phase::Delaying(h) if h == handle => br.phase = Phase::DelayElapsed,
            // duration elapsed: the step has arrived
            Phase::Running(h) if h == handle => br.advance(),
            _ => return self.is_complete(),
        }
        self.pump(VecDeque::from([branch]), cx)
    }

    /// Invoke every `onInterrupt` handler synchronously, then release timers.
    pub fn interrupt(&mut self, cx: &mut StepContext<'_>) {
        let mut handlers = Vec::new();
        collect_interrupt_handlers(&self.steps, &mut handlers);
        for step in handlers {
            self.perform_all(step, cx);
        }
        self.release(cx.clock);
    }

    /// Cancel every pending timer without running handlers.
    pub fn release(&mut self, clock: &mut dyn Clock) {
        for br in &mut self.branches {
            if let Some(h) = br.timer() {
                clock.cancel(h);
            }
            br.phase = Phase::Done;
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let mut cursor = Vec::new();
        let mut active_timers = 0;
        for br in &self.branches {
            if br.timer().is_some() {
                active_timers += 1;
            }
            if matches!(br.phase, Phase::Delaying(_) | Phase::Running(_)) {
                if let Some(step) = br.steps.get(br.index) {
                    cursor.push(step.id.clone());
                }
            }
        }
        RunSnapshot {
            run_id: self.id,
            definition_id: self.definition_id.clone(),
            correlation_id: self.correlation_id.clone(),
            started_at: self.started_at,
            state: self.state(),
            active_timers,
            cursor,
        }
    }

    fn pump(&mut self, mut ready: VecDeque<BranchId>, cx: &mut StepContext<'_>) -> bool {
        while let Some(b) = ready.pop_front() {
            self.drive(b, cx, &mut ready);
        }
        self.is_complete()
    }

    /// Advance one branch until it suspends or finishes.
    fn drive(&mut self, b: BranchId, cx: &mut StepContext<'_>, ready: &mut VecDeque<BranchId>) {
        loop {
            let br = &mut self.branches[b.0 as usize];
            if br.index >= br.end {
                let parent = br.parent;
                if br.phase != Phase::Done {
                    br.phase = Phase::Done;
                    if let Some(parent) = parent {
                        self.child_finished(parent, ready);
                    }
                }
                return;
            }
            let steps = br.steps.clone();
            let phase = br.phase;
            let step = &steps[br.index];
            // handlers are inert until teardown, delay included
            if step.is_on_interrupt() {
                self.branches[b.0 as usize].advance();
                continue;
            }
            match phase {
                Phase::Ready if step.delay > 0 => {
                    let h = cx.clock.schedule_after(step.delay, self.token(b));
                    self.branches[b.0 as usize].phase = Phase::Delaying(h);
                    return;
                }
                Phase::Ready | Phase::DelayElapsed => {}
                _ => return,
            }

            match &step.kind {
                StepKind::Leaf(leaf) => {
                    self.perform(step, leaf, false, cx);
                    let br = &mut self.branches[b.0 as usize];
                    if leaf.duration > 0 {
                        let token = TimerToken { run: self.id, branch: b };
                        br.phase = Phase::Running(cx.clock.schedule_after(leaf.duration, token));
                        return;
                    }
                    br.advance();
                }
                StepKind::Parallel(children) => {
                    let groups = parallel_groups(children);
                    if groups.is_empty() {
                        self.branches[b.0 as usize].advance();
                        continue;
                    }
                    self.branches[b.0 as usize].phase = Phase::Waiting {
                        pending: groups.len(),
                    };
                    for (start, end) in groups {
                        let child = self.fork(b, children.clone(), start, end);
                        ready.push_back(child);
                    }
                    return;
                }
                StepKind::OnArrive(children) => {
                    if children.is_empty() {
                        self.branches[b.0 as usize].advance();
                        continue;
                    }
                    self.branches[b.0 as usize].phase = Phase::Waiting { pending: 1 };
                    let child = self.fork(b, children.clone(), 0, children.len());
                    ready.push_back(child);
                    return;
                }
                StepKind::OnInterrupt(_) => self.branches[b.0 as usize].advance(),
            }
        }
    }

    fn child_finished(&mut self, parent: BranchId, ready: &mut VecDeque<BranchId>) {
        let br = &mut self.branches[parent.0 as usize];
        if let Phase::Waiting { pending } = br.phase {
            if pending <= 1 {
                br.advance();
                ready.push_back(parent);
            } else {
                br.phase = Phase::Waiting {
                    pending: pending - 1,
                };
            }
        }
    }

    fn fork(&mut self, parent: BranchId, steps: Arc<[Step]>, start: usize, end: usize) -> BranchId {
        let id = BranchId(self.branches.len() as u32);
        self.branches.push(Branch {
            steps,
            index: start,
            end,
            phase: Phase::Ready,
            parent: Some(parent),
        });
        id
    }

    fn token(&self, branch: BranchId) -> TimerToken {
        TimerToken { run: self.id, branch }
    }

    fn perform(&self, step: &Step, leaf: &LeafAction, interrupting: bool, cx: &mut StepContext<'_>) {
        let entity_ref = leaf.entity.as_deref().or(self.default_entity.as_deref());
        let call = ActionCall {
            run: self.id,
            definition_id: self.definition_id.clone(),
            step_id: step.id.clone(),
            action: leaf.action,
            entity: resolve_entity_ref(entity_ref, &self.signal),
            target: resolve_entity_ref(leaf.target.as_deref(), &self.signal),
            params: resolve_params(&leaf.params, &self.signal, cx.absent),
            duration: leaf.duration,
            easing: leaf.easing,
            interrupting,
        };
        log::trace!("{} perform {} `{}`", self.id, leaf.action.name(), step.id);
        cx.host.perform(&call);
    }

    /// Fire every leaf under `step` in declaration order, ignoring timing.
    fn perform_all(&self, step: &Step, cx: &mut StepContext<'_>) {
        match &step.kind {
            StepKind::Leaf(leaf) => self.perform(step, leaf, true, cx),
            StepKind::Parallel(children)
            | StepKind::OnArrive(children)
            | StepKind::OnInterrupt(children) => {
                for child in children.iter() {
                    self.perform_all(child, cx);
                }
            }
        }
    }
}

/// Split parallel children into independent branches. An `onArrive` child rides
/// in the branch of the sibling before it, so it fires when that sibling
/// arrives rather than when the parallel block starts. `onInterrupt` children
/// get no branch of their own.
fn parallel_groups(children: &[Step]) -> Vec<(usize, usize)> {
    let mut groups: Vec<(usize, usize)> = Vec::new();
    for (i, child) in children.iter().enumerate() {
        if child.is_on_interrupt() {
            continue;
        }
        match groups.last_mut() {
            Some(last) if child.is_on_arrive() => last.1 = i + 1,
            _ => groups.push((i, i + 1)),
        }
    }
    groups
}

/// Handler nodes anywhere in the tree, outermost first, in declaration order.
fn collect_interrupt_handlers<'a>(steps: &'a [Step], out: &mut Vec<&'a Step>) {
    for step in steps {
        match &step.kind {
            StepKind::OnInterrupt(children) => out.extend(children.iter()),
            StepKind::Parallel(children) | StepKind::OnArrive(children) => {
                collect_interrupt_handlers(children, out)
            }
            StepKind::Leaf(_) => {}
        }
    }
}
