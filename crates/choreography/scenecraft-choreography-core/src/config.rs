//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::easing::Easing;
use crate::resolve::AbsentParamPolicy;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Easing applied to steps that name none, or name an unknown curve.
    pub default_easing: String,
    /// Treatment of `signal.*` params that resolve to nothing.
    pub absent_params: AbsentParamPolicy,
    /// Maximum buffered run events between drains; oldest are dropped first.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_easing: Easing::Linear.name().to_string(),
            absent_params: AbsentParamPolicy::Omit,
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub(crate) fn fallback_easing(&self) -> Easing {
        Easing::from_name(&self.default_easing).unwrap_or_default()
    }
}
