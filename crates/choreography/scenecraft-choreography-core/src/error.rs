//! Registration errors.
//!
//! Dispatch, timer advancement, matching and resolution never fail; only the
//! registration API reports programmer errors.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ChoreographyError {
    #[error("choreography `{id}` is already registered")]
    DuplicateDefinition { id: String },

    #[error("binding `{id}` is already registered")]
    DuplicateBinding { id: String },

    #[error("{kind} id must not be empty")]
    EmptyId { kind: &'static str },

    #[error("unknown action `{action}` in step `{step}`")]
    UnknownAction { step: String, action: String },

    #[error("step `{step}` ({action}) requires parameter `{param}`")]
    MissingParam {
        step: String,
        action: &'static str,
        param: &'static str,
    },

    #[error("malformed {kind} json: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ChoreographyError>;
