//! Session error types
//!
//! Only configuration and invariant errors live here. Failures inside a
//! turn (tool errors, responder errors, memory sink errors) are recorded or
//! logged and never surface as a `SessionError`.

use super::actor::{ActorId, ActorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot start a session with no participants")]
    NoParticipants,
    #[error("Main assistant must be an assistant actor, got {kind}")]
    InvalidMainAssistant { kind: ActorKind },
    #[error("Actor already registered: {0}")]
    DuplicateActor(ActorId),
    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),
    #[error("{kind} actors have no persistent pool")]
    UnpooledKind { kind: ActorKind },
    #[error("Round {round} closed with {count} unprocessed queue entries")]
    UnprocessedAtClose { round: u64, count: usize },
    #[error("Round hook failed: {0}")]
    Hook(String),
}

impl SessionError {
    /// Errors that indicate a scheduler bug rather than bad input
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            SessionError::DuplicateActor(_)
                | SessionError::UnknownActor(_)
                | SessionError::UnprocessedAtClose { .. }
        )
    }
}
