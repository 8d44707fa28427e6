//! Compiled step tree.
//!
//! Registration turns authoring [`StepDefinition`]s into this sum type once, so
//! the runtime never re-checks action names, required params or easing names.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::definition::StepDefinition;
use crate::easing::Easing;
use crate::error::{ChoreographyError, Result};
use crate::resolve::Params;

/// Leaf actions understood by the action executor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Move,
    Spawn,
    Destroy,
    Fly,
    Flash,
    Wait,
    PlaySound,
    SetAnimation,
    FollowRoute,
}

impl ActionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "move" => ActionKind::Move,
            "spawn" => ActionKind::Spawn,
            "destroy" => ActionKind::Destroy,
            "fly" => ActionKind::Fly,
            "flash" => ActionKind::Flash,
            "wait" => ActionKind::Wait,
            "playSound" => ActionKind::PlaySound,
            "setAnimation" => ActionKind::SetAnimation,
            "followRoute" => ActionKind::FollowRoute,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Move => "move",
            ActionKind::Spawn => "spawn",
            ActionKind::Destroy => "destroy",
            ActionKind::Fly => "fly",
            ActionKind::Flash => "flash",
            ActionKind::Wait => "wait",
            ActionKind::PlaySound => "playSound",
            ActionKind::SetAnimation => "setAnimation",
            ActionKind::FollowRoute => "followRoute",
        }
    }

    /// Check the parameters this action cannot run without.
    fn validate(self, id: &str, step: &StepDefinition) -> Result<()> {
        let missing = |param: &'static str| ChoreographyError::MissingParam {
            step: id.to_string(),
            action: self.name(),
            param,
        };
        match self {
            // the destination may come from either place
            ActionKind::Move | ActionKind::Fly => {
                if step.target.is_none() && !step.params.contains_key("to") {
                    return Err(missing("to"));
                }
            }
            ActionKind::PlaySound if !step.params.contains_key("sound") => {
                return Err(missing("sound"))
            }
            ActionKind::SetAnimation if !step.params.contains_key("animation") => {
                return Err(missing("animation"))
            }
            ActionKind::FollowRoute if !step.params.contains_key("route") => {
                return Err(missing("route"))
            }
            _ => {}
        }
        Ok(())
    }
}

/// A leaf step ready for execution.
#[derive(Clone, Debug)]
pub struct LeafAction {
    pub action: ActionKind,
    pub entity: Option<String>,
    pub target: Option<String>,
    /// Zero means fire-and-forget.
    pub duration: Millis,
    pub easing: Easing,
    pub params: Params,
}

#[derive(Clone, Debug)]
pub enum StepKind {
    Leaf(LeafAction),
    /// Children start together; completes with the slowest.
    Parallel(Arc<[Step]>),
    /// Children run in order once the preceding sibling has arrived.
    OnArrive(Arc<[Step]>),
    /// Children run only while tearing down an interrupted run.
    OnInterrupt(Arc<[Step]>),
}

#[derive(Clone, Debug)]
pub struct Step {
    pub id: String,
    /// Pause before the step starts, measured from the previous step's completion.
    pub delay: Millis,
    pub kind: StepKind,
}

impl Step {
    pub fn is_on_arrive(&self) -> bool {
        matches!(self.kind, StepKind::OnArrive(_))
    }

    pub fn is_on_interrupt(&self) -> bool {
        matches!(self.kind, StepKind::OnInterrupt(_))
    }
}

/// Compile a step list. `scope` prefixes synthesized ids for steps authored
/// without one.
pub fn compile_steps(
    defs: &[StepDefinition],
    scope: &str,
    fallback_easing: Easing,
) -> Result<Arc<[Step]>> {
    defs.iter()
        .enumerate()
        .map(|(idx, def)| compile_step(def, &format!("{scope}.{idx}"), fallback_easing))
        .collect::<Result<Vec<_>>>()
        .map(Arc::from)
}

fn compile_step(def: &StepDefinition, path: &str, fallback_easing: Easing) -> Result<Step> {
    let id = if def.id.is_empty() {
        path.to_string()
    } else {
        def.id.clone()
    };
    let delay = def.delay.unwrap_or(0);

    let structural = |make: fn(Arc<[Step]>) -> StepKind| -> Result<StepKind> {
        let children = def.children.as_deref().unwrap_or_default();
        if children.is_empty() {
            log::warn!("structural step `{}` ({}) has no children", id, def.action);
        }
        Ok(make(compile_steps(children, path, fallback_easing)?))
    };

    let kind = match def.action.as_str() {
        "parallel" => structural(StepKind::Parallel)?,
        "onArrive" => structural(StepKind::OnArrive)?,
        "onInterrupt" => structural(StepKind::OnInterrupt)?,
        name => {
            let action = ActionKind::from_name(name).ok_or_else(|| ChoreographyError::UnknownAction {
                step: id.clone(),
                action: name.to_string(),
            })?;
            action.validate(&id, def)?;
            if def.children.as_ref().is_some_and(|c| !c.is_empty()) {
                log::warn!("leaf step `{}` ({}) carries children; ignoring them", id, name);
            }
            let easing = match def.easing.as_deref() {
                None => fallback_easing,
                Some(e) => Easing::from_name(e).unwrap_or_else(|| {
                    log::warn!("step `{}`: unknown easing `{}`, using {}", id, e, fallback_easing.name());
                    fallback_easing
                }),
            };
            StepKind::Leaf(LeafAction {
                action,
                entity: def.entity.clone(),
                target: def.target.clone(),
                duration: def.duration.unwrap_or(0),
                easing,
                params: def.params.clone(),
            })
        }
    };

    Ok(Step { id, delay, kind })
}
