//! Prompt categorization tool used by the semantic router

use super::Tool;
use crate::router::Category;
use crate::session::ToolEnvelope;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Name the router subscribes to
pub const CATEGORIZE_TOOL: &str = "categorize_prompt";

pub struct CategorizeTool;

#[derive(Debug, Deserialize)]
struct CategorizeInput {
    category: String,
}

#[async_trait]
impl Tool for CategorizeTool {
    fn name(&self) -> &'static str {
        CATEGORIZE_TOOL
    }

    fn description(&self) -> String {
        "Categorize the user's prompt. Use \"conversational\" for chatty behaviour such as greetings and general conversation, \"search\" for requests to look up information on the web or in what you already know, and \"agentic\" for requests to carry out tasks.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["category"],
            "properties": {
                "category": {
                    "type": "string",
                    "enum": Category::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                    "description": "The category that matches the prompt"
                }
            }
        })
    }

    async fn run(&self, input: Value) -> ToolEnvelope {
        let input = match serde_json::from_value::<CategorizeInput>(input) {
            Ok(input) => input,
            Err(e) => return ToolEnvelope::failure(format!("Invalid input: {e}")),
        };
        match input.category.parse::<Category>() {
            Ok(category) => ToolEnvelope::success(category.as_str()),
            Err(e) => ToolEnvelope::failure(e.to_string()),
        }
    }
}
