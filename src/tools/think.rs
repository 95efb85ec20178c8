//! Think tool - lets the model reason out loud without side effects

use super::Tool;
use crate::session::ToolEnvelope;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct ThinkTool;

#[derive(Debug, Deserialize)]
struct ThinkInput {
    thoughts: String,
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &'static str {
        "think"
    }

    fn description(&self) -> String {
        "Reason through a problem before answering: plan multi-step work, weigh options, or reconcile conflicting information. Nothing is shown to the user and nothing changes.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["thoughts"],
            "properties": {
                "thoughts": {
                    "type": "string",
                    "description": "The thoughts, notes, or plans to record"
                }
            }
        })
    }

    async fn run(&self, input: Value) -> ToolEnvelope {
        match serde_json::from_value::<ThinkInput>(input) {
            Ok(input) => {
                tracing::debug!(chars = input.thoughts.len(), "Thought recorded");
                ToolEnvelope::success("recorded")
            }
            Err(e) => ToolEnvelope::failure(format!("Invalid input: {e}")),
        }
    }
}
