//! Signal reference resolution.
//!
//! A signal ref is any string starting with `signal.`. `signal.type` names the
//! envelope type; every other path walks the payload one `.`-separated segment at
//! a time (numeric segments index into arrays). Missing keys resolve to `None`;
//! nothing here fails.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::signal::SignalEnvelope;

pub const SIGNAL_PREFIX: &str = "signal.";

/// Resolved parameter map handed to the action executor.
pub type Params = Map<String, JsonValue>;

/// What `resolve_params` does with a ref that resolves to nothing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbsentParamPolicy {
    /// Drop the key from the resolved map.
    #[default]
    Omit,
    /// Keep the key with a JSON `null`.
    Null,
}

#[inline]
pub fn is_signal_ref(value: &JsonValue) -> bool {
    matches!(value, JsonValue::String(s) if is_signal_ref_str(s))
}

#[inline]
pub fn is_signal_ref_str(s: &str) -> bool {
    s.starts_with(SIGNAL_PREFIX)
}

/// Resolve a `signal.*` path against a signal.
///
/// Accepts the path with or without the `signal.` prefix.
pub fn resolve_signal_ref<'a>(path: &str, signal: &'a SignalEnvelope) -> Option<Cow<'a, JsonValue>> {
    let rest = path.strip_prefix(SIGNAL_PREFIX).unwrap_or(path);
    if rest == "type" {
        return Some(Cow::Owned(JsonValue::String(signal.kind.clone())));
    }
    let mut segments = rest.split('.');
    let first = segments.next()?;
    let mut current = signal.payload.get(first)?;
    for seg in segments {
        current = step_into(current, seg)?;
    }
    Some(Cow::Borrowed(current))
}

fn step_into<'a>(value: &'a JsonValue, seg: &str) -> Option<&'a JsonValue> {
    match value {
        JsonValue::Object(map) => map.get(seg),
        JsonValue::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Replace every signal ref in `params` with its resolved value; literals pass
/// through unchanged.
pub fn resolve_params(params: &Params, signal: &SignalEnvelope, policy: AbsentParamPolicy) -> Params {
    let mut out = Map::with_capacity(params.len());
    for (key, value) in params {
        match value {
            JsonValue::String(s) if is_signal_ref_str(s) => {
                match (resolve_signal_ref(s, signal), policy) {
                    (Some(v), _) => {
                        out.insert(key.clone(), v.into_owned());
                    }
                    (None, AbsentParamPolicy::Null) => {
                        out.insert(key.clone(), JsonValue::Null);
                    }
                    (None, AbsentParamPolicy::Omit) => {}
                }
            }
            other => {
                out.insert(key.clone(), other.clone());
            }
        }
    }
    out
}

/// Resolve an entity reference to a semantic id. Literal ids pass through;
/// signal refs are resolved and coerced to text; absent input yields `""`.
pub fn resolve_entity_ref(reference: Option<&str>, signal: &SignalEnvelope) -> String {
    match reference {
        None => String::new(),
        Some(r) if is_signal_ref_str(r) => resolve_signal_ref(r, signal)
            .map(|v| value_to_text(&v))
            .unwrap_or_default(),
        Some(r) => r.to_string(),
    }
}

/// Text form of a JSON value as used for entity ids.
pub fn value_to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => match n.as_f64() {
            // 5.0 prints as "5", like the authoring layer does
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
