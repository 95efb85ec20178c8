//! Summarization tool
//!
//! Each call dispatches a single-shot sub-session: a summarizer system
//! prompt, the text as the user message, and the summarizer as main
//! assistant. The last assistant message of that round is the summary.

use super::Tool;
use crate::prompts::SUMMARIZER_PROMPT;
use crate::session::{
    Actor, AssistantResponder, Session, SessionConfig, SessionError, ToolEnvelope,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("Summarization failed: {0}")]
    Session(#[from] SessionError),
    /// The summarizer's round closed without an assistant message
    #[error("Summarization produced no answer")]
    NoAnswer,
}

pub struct SummarizeTool {
    summarizer: Arc<dyn AssistantResponder>,
}

impl SummarizeTool {
    pub fn new(summarizer: Arc<dyn AssistantResponder>) -> Self {
        Self { summarizer }
    }

    pub async fn summarize(&self, text: String) -> Result<String, SummarizeError> {
        let mut session = Session::new(
            SessionConfig::single_shot(),
            vec![Actor::system(SUMMARIZER_PROMPT), Actor::user(text)],
            Actor::assistant(self.summarizer.clone()),
        )?;
        let history = session.run().await?;
        history
            .last()
            .and_then(|transcript| transcript.last_assistant_text())
            .map(str::to_string)
            .ok_or(SummarizeError::NoAnswer)
    }
}

#[derive(Debug, Deserialize)]
struct SummarizeInput {
    text: String,
}

#[async_trait]
impl Tool for SummarizeTool {
    fn name(&self) -> &'static str {
        "summarize"
    }

    fn description(&self) -> String {
        "Summarize a piece of text into a shorter piece of text.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["text"],
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to summarize"
                }
            }
        })
    }

    async fn run(&self, input: Value) -> ToolEnvelope {
        let input = match serde_json::from_value::<SummarizeInput>(input) {
            Ok(input) => input,
            Err(e) => return ToolEnvelope::failure(format!("Invalid input: {e}")),
        };
        match self.summarize(input.text).await {
            Ok(summary) => ToolEnvelope::success(summary),
            Err(e) => ToolEnvelope::failure(e.to_string()),
        }
    }
}
