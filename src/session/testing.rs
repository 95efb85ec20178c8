//! Mock collaborators for testing
//!
//! These mocks let the scheduler run without a model backend, real tools or
//! a database.

use super::message::{AssistantReply, ToolEnvelope, ToolInvocation, Transcript};
use super::traits::{AssistantResponder, MemorySink, ToolExecutor};
use crate::llm::{LlmError, ToolDefinition};
use crate::memory::{MemoryError, TranscriptKey};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// Scripted responder
// ============================================================================

/// Assistant responder that returns queued replies in order
pub struct ScriptedResponder {
    replies: Mutex<VecDeque<Result<AssistantReply, LlmError>>>,
    /// Every transcript the responder was shown
    seen: Mutex<Vec<Transcript>>,
}

impl ScriptedResponder {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_reply(&self, reply: AssistantReply) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn seen_transcripts(&self) -> Vec<Transcript> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssistantResponder for ScriptedResponder {
    async fn respond(&self, transcript: &Transcript) -> Result<AssistantReply, LlmError> {
        self.seen.lock().unwrap().push(transcript.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

// ============================================================================
// Mock tool executor
// ============================================================================

/// Tool executor with predefined envelopes per tool name
pub struct MockToolExecutor {
    outputs: HashMap<String, ToolEnvelope>,
    definitions: Vec<ToolDefinition>,
    executions: Mutex<Vec<ToolInvocation>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            definitions: Vec::new(),
            executions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>, output: ToolEnvelope) -> Self {
        let name = name.into();
        self.definitions.push(ToolDefinition {
            name: name.clone(),
            description: format!("Mock {name}"),
            input_schema: json!({"type": "object"}),
        });
        self.outputs.insert(name, output);
        self
    }

    pub fn recorded_executions(&self) -> Vec<ToolInvocation> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, invocation: &ToolInvocation) -> ToolEnvelope {
        self.executions.lock().unwrap().push(invocation.clone());
        self.outputs
            .get(&invocation.name)
            .cloned()
            .unwrap_or_else(|| ToolEnvelope::failure("Tool does not exist in registry"))
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }
}

// ============================================================================
// Memory sinks
// ============================================================================

/// Sink that keeps a copy of every persisted snapshot
pub struct RecordingSink {
    records: Mutex<Vec<(TranscriptKey, Transcript)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn persisted(&self) -> Vec<(TranscriptKey, Transcript)> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemorySink for RecordingSink {
    async fn persist(
        &self,
        key: &TranscriptKey,
        transcript: &Transcript,
    ) -> Result<(), MemoryError> {
        self.records
            .lock()
            .unwrap()
            .push((key.clone(), transcript.clone()));
        Ok(())
    }
}

/// Sink that rejects every write
pub struct FailingSink;

#[async_trait]
impl MemorySink for FailingSink {
    async fn persist(
        &self,
        _key: &TranscriptKey,
        _transcript: &Transcript,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::Poisoned)
    }
}
