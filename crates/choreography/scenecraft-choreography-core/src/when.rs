//! Condition sublanguage gating choreography triggers.
//!
//! JSON shapes accepted:
//!   { "signal.tokens": { "gt": 10, "lt": 100 } }            AND-map
//!   [ { "signal.a": {...} }, { "signal.b": {...} } ]         OR-list of AND-maps
//!
//! Evaluation is total: bad patterns and missing fields degrade to "no match".

use std::fmt;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::resolve::resolve_signal_ref;
use crate::signal::SignalEnvelope;

/// Field path -> comparisons that must all hold for that field.
pub type FieldConditions = IndexMap<String, OperatorSet>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhenClause {
    /// Every field must match.
    All(FieldConditions),
    /// At least one clause must match.
    Any(Vec<FieldConditions>),
}

impl WhenClause {
    pub fn matches(&self, signal: &SignalEnvelope) -> bool {
        match self {
            WhenClause::All(fields) => fields_match(fields, signal),
            WhenClause::Any(clauses) => {
                clauses.is_empty() || clauses.iter().any(|c| fields_match(c, signal))
            }
        }
    }
}

/// `None` places no constraint on the signal.
pub fn matches_when(when: Option<&WhenClause>, signal: &SignalEnvelope) -> bool {
    when.map_or(true, |w| w.matches(signal))
}

fn fields_match(fields: &FieldConditions, signal: &SignalEnvelope) -> bool {
    fields.iter().all(|(path, ops)| {
        let value = resolve_signal_ref(path, signal);
        ops.matches(value.as_deref())
    })
}

/// Named comparisons against one field value. Multiple operators are ANDed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperatorSet {
    /// `Some(Null)` asserts the field is exactly `null`.
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub equals: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<OperatorSet>>,
}

fn present<'de, D>(de: D) -> Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(de).map(Some)
}

impl OperatorSet {
    /// Evaluate against a resolved field value (`None` = absent).
    pub fn matches(&self, value: Option<&JsonValue>) -> bool {
        if let Some(expected) = &self.equals {
            if !value.is_some_and(|v| strict_equals(v, expected)) {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !matches!(value, Some(JsonValue::String(s)) if s.contains(needle.as_str())) {
                return false;
            }
        }
        if let Some(pattern) = &self.matches {
            if !matches!(value, Some(JsonValue::String(s)) if pattern.is_match(s)) {
                return false;
            }
        }
        if let Some(bound) = self.gt {
            if !value.and_then(JsonValue::as_f64).is_some_and(|v| v > bound) {
                return false;
            }
        }
        if let Some(bound) = self.lt {
            if !value.and_then(JsonValue::as_f64).is_some_and(|v| v < bound) {
                return false;
            }
        }
        if let Some(expect_present) = self.exists {
            let is_present = value.is_some_and(|v| !v.is_null());
            if is_present != expect_present {
                return false;
            }
        }
        if let Some(inner) = &self.not {
            if inner.matches(value) {
                return false;
            }
        }
        true
    }
}

/// Equality without cross-type coercion. Numbers compare by value so `5` and
/// `5.0` are equal; containers compare structurally.
pub fn strict_equals(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx == fy,
            _ => x == y,
        },
        (JsonValue::Array(xs), JsonValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| strict_equals(x, y))
        }
        (JsonValue::Object(xm), JsonValue::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| strict_equals(x, y)))
        }
        _ => a == b,
    }
}

/// Regular expression source, compiled on first use. An invalid source never
/// matches.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    compiled: OnceCell<Option<Regex>>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            compiled: OnceCell::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.regex().is_some()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex().is_some_and(|re| re.is_match(haystack))
    }

    fn regex(&self) -> Option<&Regex> {
        self.compiled
            .get_or_init(|| match Regex::new(&self.source) {
                Ok(re) => Some(re),
                Err(err) => {
                    log::warn!("invalid `matches` pattern {:?}: {}", self.source, err);
                    None
                }
            })
            .as_ref()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Pattern::new)
    }
}
