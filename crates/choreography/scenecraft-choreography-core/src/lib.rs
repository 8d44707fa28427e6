//! Scenecraft choreography core (host-agnostic).
//!
//! Reactively drives stage entities from declarative choreographies: a signal of
//! type T arrives, matching choreographies spawn runs, and each run walks its step
//! tree against an injectable clock, calling the host's action executor with
//! resolved arguments. Continuous bindings map live signal fields straight onto
//! entity properties alongside.
//!
//! Rendering, transports and persistence live in adapters; this crate only
//! decides when to act and with which arguments.

pub mod binding;
pub mod clock;
pub mod config;
pub mod definition;
pub mod easing;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ids;
pub mod outputs;
pub mod resolve;
pub mod run;
pub mod signal;
pub mod step;
pub mod when;

// Re-exports for consumers (adapters)
pub use binding::{BindingResolver, BindingSource, BindingUpdate, EntityBinding, ValueMapping};
pub use clock::{Clock, Millis, TimerHandle, TimerToken, VirtualClock};
pub use config::EngineConfig;
pub use definition::{ChoreographyDefinition, StepDefinition};
pub use easing::{get_easing, Easing, EasingFn};
pub use engine::Engine;
pub use error::ChoreographyError;
pub use executor::{ActionCall, ActionExecutor, BindingSink, RecordingHost, StageHost};
pub use ids::RunId;
pub use outputs::{DispatchReport, RunEvent};
pub use resolve::{
    is_signal_ref, resolve_entity_ref, resolve_params, resolve_signal_ref, AbsentParamPolicy, Params,
};
pub use run::{RunSnapshot, RunState};
pub use signal::SignalEnvelope;
pub use step::{ActionKind, Step, StepKind};
pub use when::{matches_when, OperatorSet, Pattern, WhenClause};
