//! Authoring-side choreography types.
//!
//! These mirror the JSON produced by the authoring layer (camelCase keys). The
//! engine compiles them into [`crate::step::Step`] trees at registration.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::clock::Millis;
use crate::error::{ChoreographyError, Result};
use crate::resolve::Params;
use crate::when::WhenClause;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoreographyDefinition {
    pub id: String,
    /// Signal type that triggers this choreography.
    pub on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenClause>,
    #[serde(default)]
    pub interrupts: bool,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target_entity_id: Option<String>,
}

impl ChoreographyDefinition {
    pub fn new(id: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            on: on.into(),
            when: None,
            interrupts: false,
            steps: Vec::new(),
            default_target_entity_id: None,
        }
    }

    pub fn from_json(value: JsonValue) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ChoreographyError::Malformed {
            kind: "choreography",
            reason: e.to_string(),
        })
    }

    pub fn when(mut self, when: WhenClause) -> Self {
        self.when = Some(when);
        self
    }

    pub fn interrupts(mut self, interrupts: bool) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn default_entity(mut self, entity: impl Into<String>) -> Self {
        self.default_target_entity_id = Some(entity.into());
        self
    }

    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    #[serde(default)]
    pub id: String,
    pub action: String,
    /// Literal entity id or `signal.*` ref.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, deserialize_with = "opt_millis", skip_serializing_if = "Option::is_none")]
    pub delay: Option<Millis>,
    #[serde(default, deserialize_with = "opt_millis", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub easing: Option<String>,
    #[serde(default)]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<StepDefinition>>,
}

/// Millisecond fields arrive as JSON numbers, possibly fractional; round to whole
/// milliseconds and floor negatives at zero.
fn opt_millis<'de, D>(de: D) -> std::result::Result<Option<Millis>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(de)?;
    Ok(raw.map(|ms| if ms.is_finite() && ms > 0.0 { ms.round() as Millis } else { 0 }))
}

impl StepDefinition {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Structural step owning `children`.
    pub fn structural(action: impl Into<String>, children: Vec<StepDefinition>) -> Self {
        Self {
            action: action.into(),
            children: Some(children),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn delay(mut self, ms: Millis) -> Self {
        self.delay = Some(ms);
        self
    }

    pub fn duration(mut self, ms: Millis) -> Self {
        self.duration = Some(ms);
        self
    }

    pub fn easing(mut self, name: impl Into<String>) -> Self {
        self.easing = Some(name.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}
