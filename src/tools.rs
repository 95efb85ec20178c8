//! Tool implementations and the registry that executes them
//!
//! The registry is the production [`ToolExecutor`]: every failure mode
//! (unknown tool, refused approval, bad input, panic) comes back as a
//! failed [`ToolEnvelope`].

mod categorize;
mod summarize;
mod think;

pub use categorize::{CategorizeTool, CATEGORIZE_TOOL};
pub use summarize::{SummarizeError, SummarizeTool};
pub use think::ThinkTool;

use crate::llm::ToolDefinition;
use crate::session::{AssistantResponder, ToolEnvelope, ToolExecutor, ToolInvocation};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Trait for tools the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Whether a human must approve each call before it runs
    fn requires_approval(&self) -> bool {
        false
    }

    async fn run(&self, input: Value) -> ToolEnvelope;
}

/// Decision on an approval-gated tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval {
    Granted,
    /// Refused, with an optional explanation for the model
    Refused(Option<String>),
}

/// Human-in-the-loop gate for tools that require approval
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, invocation: &ToolInvocation) -> Approval;
}

/// Approves every call
pub struct AutoApprove;

#[async_trait]
impl Approver for AutoApprove {
    async fn approve(&self, _invocation: &ToolInvocation) -> Approval {
        Approval::Granted
    }
}

/// Tools available to a session, looked up by name
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    approver: Arc<dyn Approver>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            approver: Arc::new(AutoApprove),
        }
    }

    /// Built-in tools: `think`, `categorize_prompt` and `summarize`, the
    /// last one answering through `summarizer`
    pub fn standard(summarizer: Arc<dyn AssistantResponder>) -> Self {
        Self::new()
            .with_tool(ThinkTool)
            .with_tool(CategorizeTool)
            .with_tool(SummarizeTool::new(summarizer))
    }

    /// Register a tool, replacing any tool with the same name
    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(Arc::new(tool));
        self
    }

    #[must_use]
    pub fn with_approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approver = approver;
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Definitions for the named subset of tools, in registry order
    pub fn definitions_for(&self, names: &[&str]) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|t| names.contains(&t.name()))
            .map(|t| definition(t.as_ref()))
            .collect()
    }

    async fn run_tool(tool: &dyn Tool, invocation: &ToolInvocation) -> ToolEnvelope {
        let input = Value::Object(invocation.arguments.clone());
        match AssertUnwindSafe(tool.run(input)).catch_unwind().await {
            Ok(envelope) => envelope,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    tool = %invocation.name,
                    call_id = %invocation.id,
                    panic = %detail,
                    "Tool panicked"
                );
                ToolEnvelope::failure(format!("Tool panicked: {detail}"))
            }
        }
    }
}

fn definition(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description(),
        input_schema: tool.input_schema(),
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, invocation: &ToolInvocation) -> ToolEnvelope {
        let Some(tool) = self.get(&invocation.name) else {
            tracing::warn!(tool = %invocation.name, "Model requested an unknown tool");
            return ToolEnvelope::failure("Tool does not exist in registry");
        };

        if tool.requires_approval() {
            if let Approval::Refused(reason) = self.approver.approve(invocation).await {
                tracing::info!(
                    tool = %invocation.name,
                    call_id = %invocation.id,
                    "Tool call refused"
                );
                let reason = reason
                    .unwrap_or_else(|| "I cannot allow you to proceed with this".to_string());
                return ToolEnvelope::failure(format!("[REFUSAL FROM USER] {reason}"));
            }
        }

        let envelope = Self::run_tool(tool.as_ref(), invocation).await;
        tracing::debug!(
            tool = %invocation.name,
            call_id = %invocation.id,
            success = envelope.success,
            "Tool executed"
        );
        envelope
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| definition(t.as_ref())).collect()
    }
}
