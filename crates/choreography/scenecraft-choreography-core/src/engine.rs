//! Engine: owns the choreography and binding registries, the clock, and every
//! active run.
//!
//! Methods:
//! - register / unregister, register_binding / unregister_binding
//! - dispatch (match → interrupt → spawn → bindings), advance / advance_to (timers)
//! - interrupt / interrupt_group / shutdown (cancellation)
//!
//! The engine is single-writer: drive it from one task and feed signals in
//! arrival order. Each dispatch completes fully before it returns.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::binding::{BindingResolver, BindingUpdate, EntityBinding};
use crate::clock::{Clock, Millis, VirtualClock};
use crate::config::EngineConfig;
use crate::definition::ChoreographyDefinition;
use crate::error::{ChoreographyError, Result};
use crate::executor::StageHost;
use crate::ids::{IdAllocator, RunId};
use crate::outputs::{DispatchReport, EventLog, RunEvent};
use crate::run::{Run, RunSnapshot, StepContext};
use crate::signal::SignalEnvelope;
use crate::step::{compile_steps, Step};
use crate::when::matches_when;

/// A registered choreography: the authoring definition plus its compiled tree.
#[derive(Debug)]
pub struct Registered {
    pub definition: ChoreographyDefinition,
    pub steps: Arc<[Step]>,
}

#[derive(Debug)]
pub struct Engine<C: Clock = VirtualClock> {
    cfg: EngineConfig,
    clock: C,
    ids: IdAllocator,
    definitions: IndexMap<String, Registered>,
    bindings: BindingResolver,
    runs: IndexMap<RunId, Run>,
    events: EventLog,
}

impl Engine<VirtualClock> {
    /// Engine on a fresh virtual clock at t=0.
    pub fn new(cfg: EngineConfig) -> Self {
        Self::with_clock(cfg, VirtualClock::new())
    }
}

impl Default for Engine<VirtualClock> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<C: Clock> Engine<C> {
    pub fn with_clock(cfg: EngineConfig, clock: C) -> Self {
        Self {
            events: EventLog::with_capacity(cfg.event_capacity),
            cfg,
            clock,
            ids: IdAllocator::new(),
            definitions: IndexMap::new(),
            bindings: BindingResolver::new(),
            runs: IndexMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn now(&self) -> Millis {
        self.clock.now()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ----- registration -----

    /// Compile and register a choreography. In-flight runs are unaffected.
    pub fn register(&mut self, definition: ChoreographyDefinition) -> Result<()> {
        if definition.id.is_empty() {
            return Err(ChoreographyError::EmptyId { kind: "choreography" });
        }
        if self.definitions.contains_key(&definition.id) {
            return Err(ChoreographyError::DuplicateDefinition { id: definition.id });
        }
        let steps = compile_steps(&definition.steps, &definition.id, self.cfg.fallback_easing())?;
        log::debug!(
            "registered choreography `{}` on `{}` ({} root steps)",
            definition.id,
            definition.on,
            steps.len()
        );
        self.definitions
            .insert(definition.id.clone(), Registered { definition, steps });
        Ok(())
    }

    /// Remove a choreography. Runs already spawned from it keep going.
    pub fn unregister(&mut self, id: &str) -> Option<ChoreographyDefinition> {
        self.definitions.shift_remove(id).map(|r| r.definition)
    }

    pub fn definition(&self, id: &str) -> Option<&ChoreographyDefinition> {
        self.definitions.get(id).map(|r| &r.definition)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ChoreographyDefinition> {
        self.definitions.values().map(|r| &r.definition)
    }

    pub fn register_binding(&mut self, binding: EntityBinding) -> Result<()> {
        self.bindings.register(binding)
    }

    pub fn unregister_binding(&mut self, id: &str) -> Option<EntityBinding> {
        self.bindings.unregister(id)
    }

    pub fn bindings(&self) -> &BindingResolver {
        &self.bindings
    }

    // ----- dispatch -----

    /// Ids of registered choreographies triggered by `signal`, in registration order.
    pub fn matching(&self, signal: &SignalEnvelope) -> Vec<String> {
        self.definitions
            .values()
            .filter(|r| r.definition.on == signal.kind && matches_when(r.definition.when.as_ref(), signal))
            .map(|r| r.definition.id.clone())
            .collect()
    }

    /// Binding updates `signal` would produce, without touching runs.
    pub fn evaluate_bindings(&self, signal: &SignalEnvelope) -> Vec<BindingUpdate> {
        let matched = self.matching(signal);
        let triggered: Vec<&str> = matched.iter().map(String::as_str).collect();
        self.bindings.evaluate(signal, &triggered)
    }

    /// Process one inbound signal to completion.
    pub fn dispatch(&mut self, signal: &SignalEnvelope, host: &mut dyn StageHost) -> DispatchReport {
        let matched = self.matching(signal);
        let mut report = DispatchReport::default();
        let shared = Arc::new(signal.clone());

        for def_id in &matched {
            let Some(reg) = self.definitions.get(def_id) else {
                continue;
            };
            let steps = reg.steps.clone();
            let interrupts = reg.definition.interrupts;
            let default_entity = reg.definition.default_target_entity_id.clone();

            if interrupts {
                let group = self.group_of(def_id, signal.correlation_id.as_deref());
                for run_id in group {
                    if self.cancel_run(run_id, host) {
                        report.interrupted.push(run_id);
                    }
                }
            }

            let run_id = self.ids.alloc_run();
            let now = self.clock.now();
            let mut run = Run::new(run_id, def_id.clone(), shared.clone(), steps, default_entity, now);
            log::debug!("{} spawned for `{}` by `{}`", run_id, def_id, signal.kind);
            self.events.push(RunEvent::Started {
                run: run_id,
                definition: def_id.clone(),
                correlation_id: run.correlation_id.clone(),
                at: now,
            });
            report.spawned.push(run_id);

            let mut cx = StepContext {
                clock: &mut self.clock,
                host: &mut *host,
                absent: self.cfg.absent_params,
            };
            if run.start(&mut cx) {
                self.finish(run);
                report.completed.push(run_id);
            } else {
                self.runs.insert(run_id, run);
            }
        }

        let triggered: Vec<&str> = matched.iter().map(String::as_str).collect();
        for update in self.bindings.evaluate(signal, &triggered) {
            host.apply_binding(&update.entity_id, &update.property, &update.value);
            report.bindings_applied += 1;
        }
        report.matched = matched;
        report
    }

    // ----- time -----

    /// Advance the clock by `dt` milliseconds, firing due timers in order.
    pub fn advance(&mut self, dt: Millis, host: &mut dyn StageHost) {
        let target = self.clock.now().saturating_add(dt);
        self.advance_to(target, host);
    }

    /// Advance the clock to absolute time `t`. Timers scheduled while firing
    /// also fire if they fall due before `t`.
    pub fn advance_to(&mut self, t: Millis, host: &mut dyn StageHost) {
        while let Some((handle, token)) = self.clock.pop_due(t) {
            let Some(run) = self.runs.get_mut(&token.run) else {
                log::trace!("stale timer for {}", token.run);
                continue;
            };
            let mut cx = StepContext {
                clock: &mut self.clock,
                host: &mut *host,
                absent: self.cfg.absent_params,
            };
            if run.on_timer(token.branch, handle, &mut cx) {
                if let Some(run) = self.runs.shift_remove(&token.run) {
                    self.finish(run);
                }
            }
        }
        self.clock.advance_to(t);
    }

    /// Timers currently pending on the clock across all runs.
    pub fn pending_timers(&self) -> usize {
        self.clock.pending()
    }

    // ----- cancellation -----

    /// Interrupt one run: its `onInterrupt` children fire, then its timers are
    /// released. Unknown or finished runs are a no-op returning false.
    pub fn interrupt(&mut self, run: RunId, host: &mut dyn StageHost) -> bool {
        self.cancel_run(run, host)
    }

    /// Interrupt every active run of `definition_id` sharing `correlation_id`.
    pub fn interrupt_group(
        &mut self,
        definition_id: &str,
        correlation_id: Option<&str>,
        host: &mut dyn StageHost,
    ) -> Vec<RunId> {
        self.group_of(definition_id, correlation_id)
            .into_iter()
            .filter(|id| self.cancel_run(*id, host))
            .collect()
    }

    /// Abort every run without invoking `onInterrupt` handlers.
    pub fn shutdown(&mut self) {
        let now = self.clock.now();
        for (_, mut run) in self.runs.drain(..) {
            run.release(&mut self.clock);
            log::debug!("{} aborted", run.id);
            self.events.push(RunEvent::Aborted {
                run: run.id,
                definition: run.definition_id,
                at: now,
            });
        }
    }

    // ----- inspection -----

    pub fn runs(&self) -> impl Iterator<Item = RunSnapshot> + '_ {
        self.runs.values().map(Run::snapshot)
    }

    pub fn run(&self, id: RunId) -> Option<RunSnapshot> {
        self.runs.get(&id).map(Run::snapshot)
    }

    pub fn is_active(&self, id: RunId) -> bool {
        self.runs.contains_key(&id)
    }

    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn drain_events(&mut self) -> Vec<RunEvent> {
        self.events.drain()
    }

    // ----- internals -----

    /// Active runs forming one interrupt group. An absent correlation id is its
    /// own group.
    fn group_of(&self, definition_id: &str, correlation_id: Option<&str>) -> Vec<RunId> {
        self.runs
            .values()
            .filter(|r| r.definition_id == definition_id && r.correlation_id.as_deref() == correlation_id)
            .map(|r| r.id)
            .collect()
    }

    fn cancel_run(&mut self, id: RunId, host: &mut dyn StageHost) -> bool {
        let Some(mut run) = self.runs.shift_remove(&id) else {
            return false;
        };
        let mut cx = StepContext {
            clock: &mut self.clock,
            host,
            absent: self.cfg.absent_params,
        };
        run.interrupt(&mut cx);
        log::debug!("{} interrupted", id);
        self.events.push(RunEvent::Interrupted {
            run: id,
            definition: run.definition_id,
            at: self.clock.now(),
        });
        true
    }

    fn finish(&mut self, run: Run) {
        log::debug!("{} completed", run.id);
        self.events.push(RunEvent::Completed {
            run: run.id,
            definition: run.definition_id,
            at: self.clock.now(),
        });
    }
}
