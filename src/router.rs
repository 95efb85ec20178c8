//! Semantic routing on top of tool subscriptions
//!
//! A classifier assistant is asked to call `categorize_prompt` once per
//! round. The subscription on that tool swaps in the assistant configured
//! for the chosen category, together with its system prompt and reminder.
//! The scheduler itself knows nothing about categories.

use crate::session::{
    Actor, ActorId, AssistantResponder, InjectionMode, SessionError, SessionState, ToolEnvelope,
    TurnBudget,
};
use crate::tools::CATEGORIZE_TOOL;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Conversational,
    Search,
    Agentic,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Conversational, Category::Search, Category::Agentic];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Conversational => "conversational",
            Category::Search => "search",
            Category::Agentic => "agentic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown category '{0}', expected one of: conversational, search, agentic")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// What a category switches the session to
#[derive(Clone)]
pub struct Route {
    responder: Arc<dyn AssistantResponder>,
    system_prompt: Option<String>,
    reminder: Option<String>,
    budget: TurnBudget,
}

impl Route {
    pub fn new(responder: Arc<dyn AssistantResponder>) -> Self {
        Self {
            responder,
            system_prompt: None,
            reminder: None,
            budget: TurnBudget::Unlimited,
        }
    }

    /// System prompt that replaces the current one when the route is taken
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Extra context delivered as an injected tool result
    #[must_use]
    pub fn with_reminder(mut self, reminder: impl Into<String>) -> Self {
        self.reminder = Some(reminder.into());
        self
    }

    /// Per-round turn budget of the routed assistant
    #[must_use]
    pub fn with_budget(mut self, budget: TurnBudget) -> Self {
        self.budget = budget;
        self
    }

    fn apply(&self, state: &mut SessionState) -> Result<ActorId, SessionError> {
        if let Some(prompt) = &self.system_prompt {
            state.inject_system_prompt(prompt.clone(), InjectionMode::Deferred)?;
        }
        if let Some(reminder) = &self.reminder {
            state.inject(
                Actor::injected_tool("reminder", json!(reminder)),
                InjectionMode::Deferred,
            )?;
        }
        state.inject_main_assistant(
            Actor::assistant(self.responder.clone()).with_budget(self.budget),
        )
    }
}

pub struct SemanticRouter {
    classifier: Arc<dyn AssistantResponder>,
    routes: HashMap<Category, Route>,
}

impl SemanticRouter {
    /// `classifier` should only be offered the `categorize_prompt` tool
    pub fn new(classifier: Arc<dyn AssistantResponder>) -> Self {
        Self {
            classifier,
            routes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn route(mut self, category: Category, route: Route) -> Self {
        self.routes.insert(category, route);
        self
    }

    /// Register the classifier and subscribe to categorization results
    pub fn install(self, state: &mut SessionState) -> Result<RouterHandle, SessionError> {
        let classifier =
            state.register(Actor::assistant(self.classifier).with_budget(TurnBudget::ONCE))?;
        let routes = self.routes;

        state.subscribe(CATEGORIZE_TOOL, move |envelope, state| {
            let Some(category) = parse_category(envelope) else {
                return Ok(());
            };
            match routes.get(&category) {
                Some(route) => {
                    let main = route.apply(state)?;
                    tracing::info!(
                        %category,
                        main_assistant = %main,
                        round = state.round(),
                        "Prompt routed"
                    );
                }
                None => tracing::warn!(%category, "No route configured for category"),
            }
            Ok(())
        });

        tracing::debug!(classifier = %classifier, "Semantic router installed");
        Ok(RouterHandle { classifier })
    }
}

fn parse_category(envelope: &ToolEnvelope) -> Option<Category> {
    if !envelope.success {
        tracing::warn!(error = ?envelope.error, "Categorization failed");
        return None;
    }
    let Some(raw) = envelope.result.as_str() else {
        tracing::warn!(result = %envelope.result, "Categorization returned a non-string result");
        return None;
    };
    match raw.parse() {
        Ok(category) => Some(category),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring categorization result");
            None
        }
    }
}

/// Schedules the installed classifier
#[derive(Debug, Clone, Copy)]
pub struct RouterHandle {
    classifier: ActorId,
}

impl RouterHandle {
    pub fn classifier(&self) -> ActorId {
        self.classifier
    }

    /// Queue the classifier behind everything already scheduled, normally
    /// right after the user's prompt was injected
    pub fn classify(&self, state: &mut SessionState) -> Result<(), SessionError> {
        state.reenroll(self.classifier, InjectionMode::Deferred)
    }
}
