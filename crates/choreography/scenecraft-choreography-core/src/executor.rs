//! Host-side contracts: the action executor performs visual effects, the binding
//! sink receives continuous property updates. The engine only decides when and
//! with which arguments to call them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::binding::BindingUpdate;
use crate::clock::Millis;
use crate::easing::{Easing, EasingFn};
use crate::ids::RunId;
use crate::resolve::Params;
use crate::step::ActionKind;

/// One leaf step activation with fully resolved arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCall {
    pub run: RunId,
    pub definition_id: String,
    pub step_id: String,
    pub action: ActionKind,
    pub entity: String,
    pub target: String,
    pub params: Params,
    pub duration: Millis,
    pub easing: Easing,
    /// Set when the call comes from an `onInterrupt` handler during teardown.
    pub interrupting: bool,
}

impl ActionCall {
    #[inline]
    pub fn easing_fn(&self) -> EasingFn {
        self.easing.function()
    }
}

/// Fire-and-forget receiver of leaf actions.
pub trait ActionExecutor {
    fn perform(&mut self, call: &ActionCall);
}

/// Receiver of binding updates.
pub trait BindingSink {
    fn apply_binding(&mut self, entity_id: &str, property: &str, value: &JsonValue);
}

/// Everything the engine talks to while dispatching and advancing.
pub trait StageHost: ActionExecutor + BindingSink {}

impl<T: ActionExecutor + BindingSink + ?Sized> StageHost for T {}

/// Host that records every call in order.
#[derive(Clone, Debug, Default)]
pub struct RecordingHost {
    pub actions: Vec<ActionCall>,
    pub bindings: Vec<BindingUpdate>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(action, entity, target)` triples, handy for ordering assertions.
    pub fn action_summary(&self) -> Vec<(ActionKind, String, String)> {
        self.actions
            .iter()
            .map(|c| (c.action, c.entity.clone(), c.target.clone()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
        self.bindings.clear();
    }
}

impl ActionExecutor for RecordingHost {
    fn perform(&mut self, call: &ActionCall) {
        self.actions.push(call.clone());
    }
}

impl BindingSink for RecordingHost {
    fn apply_binding(&mut self, entity_id: &str, property: &str, value: &JsonValue) {
        self.bindings.push(BindingUpdate {
            binding_id: None,
            entity_id: entity_id.to_string(),
            property: property.to_string(),
            value: value.clone(),
        });
    }
}
