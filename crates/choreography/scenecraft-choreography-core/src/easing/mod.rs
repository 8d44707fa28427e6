//! Easing library and name lookup.
//!
//! Steps name their easing in authoring JSON (`"easeInOut"`); the runtime resolves
//! the name once at registration and hands an [`Easing`] to the action executor.

pub mod functions;

use serde::{Deserialize, Serialize};

/// Plain easing function pointer.
pub type EasingFn = fn(f64) -> f64;

/// Built-in easing curves.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Arc,
}

impl Easing {
    pub const ALL: [Easing; 5] = [
        Easing::Linear,
        Easing::EaseIn,
        Easing::EaseOut,
        Easing::EaseInOut,
        Easing::Arc,
    ];

    /// Resolve a curve by name. Accepts camelCase, snake_case and kebab-case.
    pub fn from_name(name: &str) -> Option<Self> {
        let folded: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "linear" => Some(Easing::Linear),
            "easein" => Some(Easing::EaseIn),
            "easeout" => Some(Easing::EaseOut),
            "easeinout" => Some(Easing::EaseInOut),
            "arc" => Some(Easing::Arc),
            _ => None,
        }
    }

    /// Canonical authoring name.
    pub fn name(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::EaseIn => "easeIn",
            Easing::EaseOut => "easeOut",
            Easing::EaseInOut => "easeInOut",
            Easing::Arc => "arc",
        }
    }

    #[inline]
    pub fn function(self) -> EasingFn {
        match self {
            Easing::Linear => functions::linear,
            Easing::EaseIn => functions::ease_in,
            Easing::EaseOut => functions::ease_out,
            Easing::EaseInOut => functions::ease_in_out,
            Easing::Arc => functions::arc,
        }
    }

    #[inline]
    pub fn apply(self, t: f64) -> f64 {
        (self.function())(t)
    }
}

/// Look up an easing function by name. Unknown names yield `None`.
pub fn get_easing(name: &str) -> Option<EasingFn> {
    Easing::from_name(name).map(Easing::function)
}
