//! Assistant responder backed by an [`LlmService`]

use super::types::{ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, ToolDefinition};
use super::{LlmError, LlmService};
use crate::session::{AssistantReply, AssistantResponder, Message, ToolInvocation, Transcript};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Retry schedule for transient provider failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each following retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Wait before retry number `retry` (1-based), honouring the
    /// provider's `retry_after` when it gave one
    pub fn delay(&self, retry: u32, error: &LlmError) -> Duration {
        error
            .retry_after
            .unwrap_or_else(|| self.base_delay * (1u32 << retry.saturating_sub(1).min(16)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Turns round transcripts into completion requests and completions into
/// assistant replies
pub struct LlmResponder {
    service: Arc<dyn LlmService>,
    tools: Vec<ToolDefinition>,
    /// Appended to the transcript's system prompt
    instructions: Option<String>,
    max_tokens: Option<u32>,
    retry: RetryPolicy,
}

impl LlmResponder {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self {
            service,
            tools: Vec::new(),
            instructions: None,
            max_tokens: None,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Responder-specific instructions, e.g. for a classifier that shares
    /// the transcript with the main assistant
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build_request(&self, transcript: &Transcript) -> LlmRequest {
        let mut request = render_transcript(transcript);
        request.tools.clone_from(&self.tools);
        if let Some(instructions) = &self.instructions {
            request.system = Some(match request.system.take() {
                Some(system) => format!("{system}\n\n{instructions}"),
                None => instructions.clone(),
            });
        }
        request.max_tokens = self.max_tokens;
        request
    }
}

#[async_trait]
impl AssistantResponder for LlmResponder {
    async fn respond(&self, transcript: &Transcript) -> Result<AssistantReply, LlmError> {
        let request = self.build_request(transcript);
        let mut retry = 0;
        loop {
            match self.service.complete(&request).await {
                Ok(response) => return Ok(reply_from_response(response)),
                Err(error) if error.is_retryable() && retry < self.retry.max_retries => {
                    retry += 1;
                    let delay = self.retry.delay(retry, &error);
                    tracing::warn!(
                        model = %self.service.model_id(),
                        retry,
                        max_retries = self.retry.max_retries,
                        delay_ms = %delay.as_millis(),
                        error = %error,
                        "Retrying LLM request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Render a round transcript as a provider request.
///
/// System messages form the system prompt. Consecutive entries of the same
/// role are merged into one message. Tool results answering an earlier
/// `tool_use` become `tool_result` blocks placed ahead of any text in their
/// message; other tool output (injected context) is rendered as text.
pub fn render_transcript(transcript: &Transcript) -> LlmRequest {
    let mut system: Vec<&str> = Vec::new();
    let mut messages: Vec<LlmMessage> = Vec::new();
    let mut requested: HashSet<&str> = HashSet::new();

    for message in transcript {
        match message {
            Message::System { content } => system.push(content.as_str()),
            Message::User { content } => {
                push_block(&mut messages, MessageRole::User, ContentBlock::text(content));
            }
            Message::Assistant { content, tool_calls } => {
                if !content.is_empty() {
                    push_block(&mut messages, MessageRole::Assistant, ContentBlock::text(content));
                }
                for call in tool_calls {
                    requested.insert(call.id.as_str());
                    push_block(
                        &mut messages,
                        MessageRole::Assistant,
                        ContentBlock::tool_use(
                            &call.id,
                            &call.name,
                            Value::Object(call.arguments.clone()),
                        ),
                    );
                }
            }
            Message::Tool {
                tool_call_id,
                tool,
                result,
            } => {
                let block = if requested.contains(tool_call_id.as_str()) {
                    ContentBlock::tool_result(tool_call_id, result.serialized(), !result.success)
                } else {
                    ContentBlock::text(format!("[{tool}] {}", result.serialized()))
                };
                push_block(&mut messages, MessageRole::User, block);
            }
        }
    }

    LlmRequest {
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages,
        tools: Vec::new(),
        max_tokens: None,
    }
}

fn push_block(messages: &mut Vec<LlmMessage>, role: MessageRole, block: ContentBlock) {
    match messages.last_mut() {
        Some(last) if last.role == role => {
            if matches!(block, ContentBlock::ToolResult { .. }) {
                let at = last
                    .content
                    .iter()
                    .position(|b| !matches!(b, ContentBlock::ToolResult { .. }))
                    .unwrap_or(last.content.len());
                last.content.insert(at, block);
            } else {
                last.content.push(block);
            }
        }
        _ => messages.push(LlmMessage {
            role,
            content: vec![block],
        }),
    }
}

fn reply_from_response(response: LlmResponse) -> AssistantReply {
    let tool_calls = response
        .tool_uses()
        .map(|(id, name, input)| {
            let arguments = match input {
                Value::Object(map) => map.clone(),
                other => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other.clone());
                    map
                }
            };
            ToolInvocation::new(id, name, arguments)
        })
        .collect();
    AssistantReply {
        content: response.text(),
        tool_calls,
    }
}
