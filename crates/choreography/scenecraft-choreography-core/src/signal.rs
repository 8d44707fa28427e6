//! Inbound signal envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One inbound domain event. Transports produce these already typed; the engine
/// only reads them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl SignalEnvelope {
    pub fn new(kind: impl Into<String>, payload: Map<String, JsonValue>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            correlation_id: None,
        }
    }

    /// Build a signal from a JSON object payload. Non-object payloads yield an
    /// empty payload map.
    pub fn from_json(kind: impl Into<String>, payload: JsonValue) -> Self {
        let payload = match payload {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(kind, payload)
    }

    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}
