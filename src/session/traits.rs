//! Trait abstractions for the collaborators a session talks to
//!
//! These traits enable testing the scheduler with mock implementations.

use super::error::SessionError;
use super::message::{AssistantReply, ToolEnvelope, ToolInvocation, Transcript};
use super::state::SessionState;
use crate::llm::{LlmError, ToolDefinition};
use crate::memory::{MemoryError, TranscriptKey};
use async_trait::async_trait;
use std::sync::Arc;

/// Produces the assistant's message for the current round transcript
#[async_trait]
pub trait AssistantResponder: Send + Sync {
    async fn respond(&self, transcript: &Transcript) -> Result<AssistantReply, LlmError>;
}

/// Executes tool invocations requested by an assistant
///
/// Implementations must not panic or fail past this boundary: every
/// failure is reported through the returned envelope.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> ToolEnvelope;

    /// Tool definitions for the model
    fn definitions(&self) -> Vec<ToolDefinition>;
}

/// Fire-and-forget persistence for in-progress transcripts
#[async_trait]
pub trait MemorySink: Send + Sync {
    async fn persist(
        &self,
        key: &TranscriptKey,
        transcript: &Transcript,
    ) -> Result<(), MemoryError>;
}

/// What the driver should do after a round-start hook ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundDirective {
    Continue,
    Stop,
}

/// Called right after enrollment, before the first turn of every round
#[async_trait]
pub trait RoundHook: Send + Sync {
    async fn on_round_start(
        &mut self,
        state: &mut SessionState,
    ) -> Result<RoundDirective, SessionError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: AssistantResponder + ?Sized> AssistantResponder for Arc<T> {
    async fn respond(&self, transcript: &Transcript) -> Result<AssistantReply, LlmError> {
        (**self).respond(transcript).await
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, invocation: &ToolInvocation) -> ToolEnvelope {
        (**self).execute(invocation).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}

#[async_trait]
impl<T: MemorySink + ?Sized> MemorySink for Arc<T> {
    async fn persist(
        &self,
        key: &TranscriptKey,
        transcript: &Transcript,
    ) -> Result<(), MemoryError> {
        (**self).persist(key, transcript).await
    }
}
