use serde_json::{json, Value as JsonValue};

use scenecraft_choreography::{
    AbsentParamPolicy, ActionKind, ChoreographyDefinition, ChoreographyError, Easing, Engine,
    EngineConfig, RecordingHost, RunEvent, RunState, SignalEnvelope, StepDefinition,
};

fn sig(kind: &str, payload: JsonValue) -> SignalEnvelope {
    SignalEnvelope::from_json(kind, payload)
}

fn kinds(host: &RecordingHost) -> Vec<ActionKind> {
    host.actions.iter().map(|c| c.action).collect()
}

fn task_dispatch() -> ChoreographyDefinition {
    ChoreographyDefinition::new("task-dispatch", "task_dispatch")
        .step(
            StepDefinition::new("move")
                .id("walk")
                .entity("peon")
                .param("to", "signal.to")
                .duration(800)
                .easing("easeInOut"),
        )
        .step(StepDefinition::new("spawn").id("release").entity("pigeon").param("at", "signal.from"))
        .step(
            StepDefinition::new("fly")
                .id("deliver")
                .entity("pigeon")
                .param("to", "signal.to")
                .duration(1200)
                .easing("arc"),
        )
        .step(StepDefinition::structural(
            "onArrive",
            vec![
                StepDefinition::new("destroy").id("despawn").entity("pigeon"),
                StepDefinition::new("flash")
                    .id("glow")
                    .target("signal.to")
                    .param("color", "#ffd700")
                    .duration(300),
            ],
        ))
}

/// Interrupting choreography: holds for a second, resets on interrupt.
fn pulse() -> ChoreographyDefinition {
    ChoreographyDefinition::new("pulse", "tool_call")
        .interrupts(true)
        .step(StepDefinition::new("wait").id("hold").duration(1000))
        .step(StepDefinition::structural(
            "onInterrupt",
            vec![StepDefinition::new("flash").id("reset").entity("signal.agent")],
        ))
}

fn dispatch_signal() -> SignalEnvelope {
    sig("task_dispatch", json!({"from": "orchestrator", "to": "agent-solver"}))
}

#[test]
fn task_dispatch_sequences_walk_flight_and_landing() {
    let mut engine = Engine::default();
    engine.register(task_dispatch()).expect("register");
    let mut host = RecordingHost::new();

    let report = engine.dispatch(&dispatch_signal(), &mut host);
    assert_eq!(report.matched, vec!["task-dispatch".to_string()]);
    assert_eq!(report.spawned.len(), 1);
    let run = report.spawned[0];

    assert_eq!(kinds(&host), vec![ActionKind::Move]);
    let walk = &host.actions[0];
    assert_eq!(walk.entity, "peon");
    assert_eq!(walk.params["to"], json!("agent-solver"));
    assert_eq!(walk.duration, 800);
    assert_eq!(walk.easing, Easing::EaseInOut);
    assert!(!walk.interrupting);

    let snap = engine.run(run).expect("run active");
    assert_eq!(snap.cursor, vec!["walk".to_string()]);
    assert_eq!(snap.state, RunState::Running);
    assert_eq!(snap.active_timers, 1);

    engine.advance(799, &mut host);
    assert_eq!(host.actions.len(), 1);

    engine.advance(1, &mut host);
    assert_eq!(kinds(&host), vec![ActionKind::Move, ActionKind::Spawn, ActionKind::Fly]);
    assert_eq!(host.actions[1].entity, "pigeon");
    assert_eq!(host.actions[1].params["at"], json!("orchestrator"));
    assert_eq!(host.actions[2].easing, Easing::Arc);

    engine.advance(1200, &mut host);
    assert_eq!(
        host.action_summary()[3..].to_vec(),
        vec![
            (ActionKind::Destroy, "pigeon".to_string(), String::new()),
            (ActionKind::Flash, String::new(), "agent-solver".to_string()),
        ]
    );
    assert_eq!(host.actions[4].params["color"], json!("#ffd700"));
    assert!(engine.is_active(run), "landing flash still running");

    engine.advance(300, &mut host);
    assert!(!engine.is_active(run));
    assert_eq!(engine.pending_timers(), 0);

    let events = engine.drain_events();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], RunEvent::Started { at: 0, .. }));
    assert!(matches!(events[1], RunEvent::Completed { at: 2300, .. }));
}

#[test]
fn runs_capture_their_own_signal() {
    let mut engine = Engine::default();
    engine.register(task_dispatch()).expect("register");
    let mut host = RecordingHost::new();

    engine.dispatch(&sig("task_dispatch", json!({"from": "hq", "to": "a"})), &mut host);
    engine.advance(100, &mut host);
    engine.dispatch(&sig("task_dispatch", json!({"from": "hq", "to": "b"})), &mut host);
    assert_eq!(engine.active_runs(), 2, "non-interrupting runs coexist");

    engine.advance(5000, &mut host);
    let flights: Vec<JsonValue> = host
        .actions
        .iter()
        .filter(|c| c.action == ActionKind::Fly)
        .map(|c| c.params["to"].clone())
        .collect();
    assert_eq!(flights, vec![json!("a"), json!("b")]);
}

#[test]
fn interrupt_is_idempotent() {
    let mut engine = Engine::default();
    engine.register(pulse()).expect("register");
    let mut host = RecordingHost::new();

    let run = engine.dispatch(&sig("tool_call", json!({"agent": "solver"})), &mut host).spawned[0];
    host.clear();

    assert!(engine.interrupt(run, &mut host));
    assert_eq!(kinds(&host), vec![ActionKind::Flash]);
    assert!(host.actions[0].interrupting);
    assert_eq!(host.actions[0].entity, "solver");

    assert!(!engine.interrupt(run, &mut host));
    assert_eq!(host.actions.len(), 1);

    let events = engine.drain_events();
    let interrupted = events
        .iter()
        .filter(|e| e.terminal_state() == Some(RunState::Interrupted))
        .count();
    assert_eq!(interrupted, 1);

    // stale timer from the interrupted run must not resume it
    engine.advance(2000, &mut host);
    assert_eq!(host.actions.len(), 1);
}

#[test]
fn interrupt_is_scoped_by_correlation_id() {
    let mut engine = Engine::default();
    engine.register(pulse()).expect("register");
    let mut host = RecordingHost::new();

    let a = engine
        .dispatch(&sig("tool_call", json!({"agent": "x"})).with_correlation("a"), &mut host)
        .spawned[0];
    let b = engine
        .dispatch(&sig("tool_call", json!({"agent": "y"})).with_correlation("b"), &mut host)
        .spawned[0];
    assert!(engine.is_active(a) && engine.is_active(b));
    host.clear();

    let report = engine.dispatch(&sig("tool_call", json!({"agent": "x"})).with_correlation("a"), &mut host);
    assert_eq!(report.interrupted, vec![a]);
    assert!(!engine.is_active(a));
    assert!(engine.is_active(b));
    assert!(engine.is_active(report.spawned[0]));

    // handler fires before the replacement run starts
    assert_eq!(kinds(&host), vec![ActionKind::Flash, ActionKind::Wait]);
    assert!(host.actions[0].interrupting);
    assert_eq!(host.actions[0].run, a);
    assert_eq!(host.actions[1].run, report.spawned[0]);
}

#[test]
fn absent_correlation_forms_one_group() {
    let mut engine = Engine::default();
    engine.register(pulse()).expect("register");
    let mut host = RecordingHost::new();

    let first = engine.dispatch(&sig("tool_call", json!({})), &mut host).spawned[0];
    let tagged = engine
        .dispatch(&sig("tool_call", json!({})).with_correlation("c"), &mut host)
        .spawned[0];
    let report = engine.dispatch(&sig("tool_call", json!({})), &mut host);
    assert_eq!(report.interrupted, vec![first]);
    assert!(engine.is_active(tagged));
}

#[test]
fn interrupt_group_targets_definition_and_correlation() {
    let mut engine = Engine::default();
    engine.register(pulse()).expect("register");
    let mut host = RecordingHost::new();

    let a = engine
        .dispatch(&sig("tool_call", json!({})).with_correlation("a"), &mut host)
        .spawned[0];
    engine.dispatch(&sig("tool_call", json!({})).with_correlation("b"), &mut host);

    assert_eq!(engine.interrupt_group("pulse", Some("a"), &mut host), vec![a]);
    assert!(engine.interrupt_group("pulse", Some("a"), &mut host).is_empty());
    assert!(engine.interrupt_group("other", Some("b"), &mut host).is_empty());
    assert_eq!(engine.active_runs(), 1);
}

#[test]
fn parallel_waits_for_slowest_child() {
    let mut engine = Engine::default();
    engine
        .register(
            ChoreographyDefinition::new("burst", "go")
                .step(StepDefinition::structural(
                    "parallel",
                    vec![
                        StepDefinition::new("wait").id("short").duration(100),
                        StepDefinition::new("flash").id("long").duration(300),
                    ],
                ))
                .step(StepDefinition::new("spawn").id("after")),
        )
        .expect("register");
    let mut host = RecordingHost::new();

    let run = engine.dispatch(&sig("go", json!({})), &mut host).spawned[0];
    assert_eq!(kinds(&host), vec![ActionKind::Wait, ActionKind::Flash]);
    assert_eq!(engine.run(run).expect("active").active_timers, 2);

    engine.advance(100, &mut host);
    assert_eq!(host.actions.len(), 2);
    engine.advance(199, &mut host);
    assert_eq!(host.actions.len(), 2);
    engine.advance(1, &mut host);
    assert_eq!(kinds(&host)[2], ActionKind::Spawn);
    assert!(!engine.is_active(run));
}

#[test]
fn on_arrive_inside_parallel_follows_its_sibling() {
    let mut engine = Engine::default();
    engine
        .register(ChoreographyDefinition::new("hop", "go").step(StepDefinition::structural(
            "parallel",
            vec![
                StepDefinition::new("fly").target("nest").duration(100),
                StepDefinition::structural("onArrive", vec![StepDefinition::new("destroy")]),
                StepDefinition::new("flash"),
            ],
        )))
        .expect("register");
    let mut host = RecordingHost::new();

    let run = engine.dispatch(&sig("go", json!({})), &mut host).spawned[0];
    assert_eq!(kinds(&host), vec![ActionKind::Fly, ActionKind::Flash]);
    engine.advance(100, &mut host);
    assert_eq!(kinds(&host), vec![ActionKind::Fly, ActionKind::Flash, ActionKind::Destroy]);
    assert!(!engine.is_active(run));
}

#[test]
fn delays_hold_steps_back() {
    let mut engine = Engine::default();
    engine
        .register(
            ChoreographyDefinition::new("slow", "go")
                .step(StepDefinition::new("flash").delay(50))
                .step(StepDefinition::new("destroy").delay(25)),
        )
        .expect("register");
    let mut host = RecordingHost::new();

    let run = engine.dispatch(&sig("go", json!({})), &mut host).spawned[0];
    assert!(host.actions.is_empty());
    engine.advance(49, &mut host);
    assert!(host.actions.is_empty());
    engine.advance(1, &mut host);
    assert_eq!(kinds(&host), vec![ActionKind::Flash]);
    engine.advance(24, &mut host);
    assert_eq!(host.actions.len(), 1);
    engine.advance(1, &mut host);
    assert_eq!(kinds(&host), vec![ActionKind::Flash, ActionKind::Destroy]);
    assert!(!engine.is_active(run));
}

#[test]
fn on_interrupt_is_skipped_on_normal_completion() {
    let mut engine = Engine::default();
    engine
        .register(
            ChoreographyDefinition::new("tidy", "go")
                .step(StepDefinition::new("wait").duration(10))
                .step(StepDefinition::structural("onInterrupt", vec![StepDefinition::new("flash")])),
        )
        .expect("register");
    let mut host = RecordingHost::new();

    engine.dispatch(&sig("go", json!({})), &mut host);
    engine.advance(10, &mut host);
    assert_eq!(kinds(&host), vec![ActionKind::Wait]);
    assert_eq!(engine.active_runs(), 0);
}

#[test]
fn instant_choreography_completes_within_dispatch() {
    let mut engine = Engine::default();
    engine
        .register(
            ChoreographyDefinition::new("blink", "go")
                .step(StepDefinition::new("flash"))
                .step(StepDefinition::new("destroy")),
        )
        .expect("register");
    let mut host = RecordingHost::new();

    let report = engine.dispatch(&sig("go", json!({})), &mut host);
    assert_eq!(report.completed, report.spawned);
    assert_eq!(engine.active_runs(), 0);
    assert_eq!(kinds(&host), vec![ActionKind::Flash, ActionKind::Destroy]);
}

#[test]
fn empty_choreography_completes_immediately() {
    let mut engine = Engine::default();
    engine.register(ChoreographyDefinition::new("noop", "go")).expect("register");
    let mut host = RecordingHost::new();

    let report = engine.dispatch(&sig("go", json!({})), &mut host);
    assert_eq!(report.completed.len(), 1);
    assert!(host.actions.is_empty());
}

#[test]
fn shutdown_aborts_without_handlers() {
    let mut engine = Engine::default();
    engine.register(pulse()).expect("register");
    let mut host = RecordingHost::new();

    engine.dispatch(&sig("tool_call", json!({})).with_correlation("a"), &mut host);
    engine.dispatch(&sig("tool_call", json!({})).with_correlation("b"), &mut host);
    host.clear();
    engine.drain_events();

    engine.shutdown();
    assert_eq!(engine.active_runs(), 0);
    assert_eq!(engine.pending_timers(), 0);
    assert!(host.actions.is_empty());
    let events = engine.drain_events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.terminal_state() == Some(RunState::Aborted)));
}

#[test]
fn unregister_leaves_inflight_runs_alone() {
    let mut engine = Engine::default();
    engine.register(task_dispatch()).expect("register");
    let mut host = RecordingHost::new();

    let run = engine.dispatch(&dispatch_signal(), &mut host).spawned[0];
    assert!(engine.unregister("task-dispatch").is_some());
    assert!(engine.dispatch(&dispatch_signal(), &mut host).matched.is_empty());

    engine.advance(2300, &mut host);
    assert!(!engine.is_active(run));
    assert_eq!(host.actions.len(), 5);
}

#[test]
fn when_clause_and_type_gate_dispatch() {
    let mut engine = Engine::default();
    let when = serde_json::from_value(json!({"signal.tool": {"not": {"equals": "noop"}}})).expect("when");
    engine.register(pulse().when(when)).expect("register");
    let mut host = RecordingHost::new();

    assert!(engine.dispatch(&sig("tool_call", json!({"tool": "noop"})), &mut host).matched.is_empty());
    assert!(engine.dispatch(&sig("tool_result", json!({"tool": "grep"})), &mut host).matched.is_empty());
    assert_eq!(engine.dispatch(&sig("tool_call", json!({"tool": "grep"})), &mut host).spawned.len(), 1);
}

#[test]
fn registration_errors() {
    let mut engine = Engine::default();
    engine.register(pulse()).expect("first register");
    assert_eq!(
        engine.register(pulse()),
        Err(ChoreographyError::DuplicateDefinition { id: "pulse".into() })
    );
    assert_eq!(
        engine.register(ChoreographyDefinition::new("", "go")),
        Err(ChoreographyError::EmptyId { kind: "choreography" })
    );
    let unknown = ChoreographyDefinition::new("bad", "go").step(StepDefinition::new("teleport"));
    assert!(matches!(
        engine.register(unknown),
        Err(ChoreographyError::UnknownAction { .. })
    ));
    let no_dest = ChoreographyDefinition::new("lost", "go").step(StepDefinition::new("move"));
    assert!(matches!(
        engine.register(no_dest),
        Err(ChoreographyError::MissingParam { param: "to", .. })
    ));
}

#[test]
fn config_controls_fallback_easing_and_absent_params() {
    let cfg = EngineConfig {
        default_easing: "ease_out".into(),
        absent_params: AbsentParamPolicy::Null,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(cfg);
    engine
        .register(
            ChoreographyDefinition::new("c", "go")
                .step(StepDefinition::new("flash").param("color", "signal.color")),
        )
        .expect("register");
    let mut host = RecordingHost::new();

    engine.dispatch(&sig("go", json!({})), &mut host);
    let call = &host.actions[0];
    assert_eq!(call.easing, Easing::EaseOut);
    assert_eq!(call.params.get("color"), Some(&JsonValue::Null));
    assert_eq!(call.entity, "");
}

#[test]
fn default_entity_applies_when_step_names_none() {
    let mut engine = Engine::default();
    engine
        .register(
            ChoreographyDefinition::new("c", "go")
                .default_entity("signal.agent")
                .step(StepDefinition::new("flash"))
                .step(StepDefinition::new("destroy").entity("crate")),
        )
        .expect("register");
    let mut host = RecordingHost::new();

    engine.dispatch(&sig("go", json!({"agent": "solver"})), &mut host);
    assert_eq!(host.actions[0].entity, "solver");
    assert_eq!(host.actions[1].entity, "crate");
}

#[test]
fn delayed_interrupt_handler_does_not_hold_up_siblings() {
    let mut engine = Engine::default();
    engine
        .register(
            ChoreographyDefinition::new("inert", "go")
                .step(StepDefinition::new("flash"))
                .step(StepDefinition::structural("onInterrupt", vec![StepDefinition::new("destroy")]).delay(500))
                .step(StepDefinition::new("spawn")),
        )
        .expect("register");
    let mut host = RecordingHost::new();

    let report = engine.dispatch(&sig("go", json!({})), &mut host);
    assert_eq!(kinds(&host), vec![ActionKind::Flash, ActionKind::Spawn]);
    assert_eq!(report.completed, report.spawned);
    assert_eq!(engine.pending_timers(), 0);
}

#[test]
fn delayed_interrupt_handler_fires_at_once_on_interrupt() {
    let mut engine = Engine::default();
    engine
        .register(
            ChoreographyDefinition::new("guarded", "go")
                .step(StepDefinition::new("wait").duration(100))
                .step(StepDefinition::structural("onInterrupt", vec![StepDefinition::new("destroy")]).delay(500)),
        )
        .expect("register");
    let mut host = RecordingHost::new();

    let run = engine.dispatch(&sig("go", json!({})), &mut host).spawned[0];
    assert!(engine.interrupt(run, &mut host));
    assert_eq!(kinds(&host), vec![ActionKind::Wait, ActionKind::Destroy]);
    assert!(host.actions[1].interrupting);
}

#[test]
fn interrupt_mid_parallel_cancels_running_children() {
    let mut engine = Engine::default();
    engine
        .register(
            ChoreographyDefinition::new("spread", "tool_call")
                .interrupts(true)
                .step(StepDefinition::structural(
                    "parallel",
                    vec![
                        StepDefinition::new("wait").duration(100),
                        StepDefinition::new("flash").delay(50).duration(300),
                    ],
                ))
                .step(StepDefinition::new("spawn"))
                .step(StepDefinition::structural("onInterrupt", vec![StepDefinition::new("destroy")])),
        )
        .expect("register");
    let mut host = RecordingHost::new();

    let old = engine
        .dispatch(&sig("tool_call", json!({})).with_correlation("a"), &mut host)
        .spawned[0];
    engine.advance(120, &mut host);
    assert_eq!(kinds(&host), vec![ActionKind::Wait, ActionKind::Flash]);
    assert_eq!(engine.run(old).expect("active").active_timers, 1);

    let report = engine.dispatch(&sig("tool_call", json!({})).with_correlation("a"), &mut host);
    assert_eq!(report.interrupted, vec![old]);
    // only the replacement run's wait and flash delay remain
    assert_eq!(engine.pending_timers(), 2);

    engine.advance(1000, &mut host);
    let from_old: Vec<(ActionKind, bool)> = host
        .actions
        .iter()
        .filter(|c| c.run == old)
        .map(|c| (c.action, c.interrupting))
        .collect();
    assert_eq!(
        from_old,
        vec![
            (ActionKind::Wait, false),
            (ActionKind::Flash, false),
            (ActionKind::Destroy, true),
        ]
    );
    assert_eq!(engine.active_runs(), 0);
}

#[test]
fn interrupt_during_delay_skips_the_step() {
    let mut engine = Engine::default();
    engine
        .register(ChoreographyDefinition::new("later", "go").step(StepDefinition::new("flash").delay(200)))
        .expect("register");
    let mut host = RecordingHost::new();

    let run = engine.dispatch(&sig("go", json!({})), &mut host).spawned[0];
    engine.advance(100, &mut host);
    assert!(engine.interrupt(run, &mut host));
    assert_eq!(engine.pending_timers(), 0);

    engine.advance(500, &mut host);
    assert!(host.actions.is_empty());
}

#[test]
fn interrupting_a_completed_run_is_a_no_op() {
    let mut engine = Engine::default();
    engine.register(pulse()).expect("register");
    let mut host = RecordingHost::new();

    let run = engine.dispatch(&sig("tool_call", json!({})), &mut host).spawned[0];
    engine.advance(1000, &mut host);
    assert!(!engine.is_active(run));
    let events = engine.drain_events();
    assert_eq!(events.last().and_then(RunEvent::terminal_state), Some(RunState::Completed));
    host.clear();

    assert!(!engine.interrupt(run, &mut host));
    assert!(host.actions.is_empty());
    assert!(engine.drain_events().is_empty());
}
