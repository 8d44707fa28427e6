//! Continuous entity bindings.
//!
//! A binding maps one signal field onto one entity property every time a signal
//! from its source arrives. Bindings keep no state between signals and have no
//! run lifecycle.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};

use crate::error::{ChoreographyError, Result};
use crate::resolve::resolve_signal_ref;
use crate::signal::SignalEnvelope;

/// Which signals feed a binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingSource {
    /// Every signal of this type.
    #[serde(rename = "sourceType")]
    SignalType(String),
    /// Every signal that triggers this choreography (type and `when` both match).
    #[serde(rename = "sourceChoreographyId")]
    Choreography(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueMapping {
    #[serde(rename = "fn")]
    pub function: String,
    #[serde(default = "unit_range")]
    pub input_range: [f64; 2],
    #[serde(default = "unit_range")]
    pub output_range: [f64; 2],
}

fn unit_range() -> [f64; 2] {
    [0.0, 1.0]
}

impl ValueMapping {
    pub fn lerp(input_range: [f64; 2], output_range: [f64; 2]) -> Self {
        Self {
            function: "lerp".to_string(),
            input_range,
            output_range,
        }
    }

    /// Apply the mapping. Non-numeric input and unknown functions pass through.
    pub fn apply(&self, raw: &JsonValue) -> JsonValue {
        match (self.function.as_str(), raw.as_f64()) {
            ("lerp", Some(v)) => {
                let [in0, in1] = self.input_range;
                let [out0, out1] = self.output_range;
                let span = in1 - in0;
                let mapped = if span == 0.0 {
                    out0
                } else {
                    out0 + (v - in0) / span * (out1 - out0)
                };
                Number::from_f64(mapped).map_or_else(|| raw.clone(), JsonValue::Number)
            }
            _ => raw.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBinding {
    pub id: String,
    pub target_entity_id: String,
    pub property: String,
    #[serde(flatten)]
    pub source: BindingSource,
    /// `signal.*` path of the bound field.
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<ValueMapping>,
}

impl EntityBinding {
    pub fn from_json(value: JsonValue) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ChoreographyError::Malformed {
            kind: "binding",
            reason: e.to_string(),
        })
    }

    fn accepts(&self, signal: &SignalEnvelope, triggered: &[&str]) -> bool {
        match &self.source {
            BindingSource::SignalType(kind) => *kind == signal.kind,
            BindingSource::Choreography(id) => triggered.contains(&id.as_str()),
        }
    }
}

/// One property write produced by a binding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_id: Option<String>,
    pub entity_id: String,
    pub property: String,
    pub value: JsonValue,
}

/// Registry of bindings, evaluated in registration order.
#[derive(Debug, Default)]
pub struct BindingResolver {
    bindings: IndexMap<String, EntityBinding>,
}

impl BindingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, binding: EntityBinding) -> Result<()> {
        if binding.id.is_empty() {
            return Err(ChoreographyError::EmptyId { kind: "binding" });
        }
        if self.bindings.contains_key(&binding.id) {
            return Err(ChoreographyError::DuplicateBinding { id: binding.id });
        }
        self.bindings.insert(binding.id.clone(), binding);
        Ok(())
    }

    pub fn unregister(&mut self, id: &str) -> Option<EntityBinding> {
        self.bindings.shift_remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&EntityBinding> {
        self.bindings.get(id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Updates for `signal`. `triggered` lists the choreography ids the signal
    /// matched, for choreography-sourced bindings.
    pub fn evaluate(&self, signal: &SignalEnvelope, triggered: &[&str]) -> Vec<BindingUpdate> {
        let mut updates = Vec::new();
        for binding in self.bindings.values() {
            if !binding.accepts(signal, triggered) {
                continue;
            }
            let Some(raw) = resolve_signal_ref(&binding.field, signal) else {
                log::trace!("binding `{}`: field {} absent", binding.id, binding.field);
                continue;
            };
            let value = match &binding.mapping {
                Some(mapping) => mapping.apply(&raw),
                None => raw.into_owned(),
            };
            updates.push(BindingUpdate {
                binding_id: Some(binding.id.clone()),
                entity_id: binding.target_entity_id.clone(),
                property: binding.property.clone(),
                value,
            });
        }
        updates
    }
}
