//! Conversation participants
//!
//! An actor is one participant in the round queue. Constructing an actor
//! never performs side effects; all work happens in [`Actor::invoke`].

use super::message::{AssistantReply, Message, ToolEnvelope, ToolInvocation, Transcript};
use super::traits::{AssistantResponder, ToolExecutor};
use crate::llm::LlmError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use uuid::Uuid;

/// Stable identity of an actor for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(Uuid);

impl ActorId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for ActorId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Maximum number of turns an actor may take in one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnBudget {
    #[default]
    Unlimited,
    Limited(NonZeroU32),
}

impl TurnBudget {
    pub const ONCE: TurnBudget = TurnBudget::Limited(NonZeroU32::MIN);

    pub fn limited(turns: NonZeroU32) -> Self {
        TurnBudget::Limited(turns)
    }

    pub fn is_exhausted(self, turns_taken: u32) -> bool {
        match self {
            TurnBudget::Unlimited => false,
            TurnBudget::Limited(max) => turns_taken >= max.get(),
        }
    }
}

/// Actor variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    System,
    User,
    Assistant,
    Tool,
}

impl ActorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorKind::System => "system",
            ActorKind::User => "user",
            ActorKind::Assistant => "assistant",
            ActorKind::Tool => "tool",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback that produces a tool result each time it is invoked
pub type ToolCallback = Arc<dyn Fn() -> ToolEnvelope + Send + Sync>;

enum ToolSource {
    Ready(ToolEnvelope),
    Callback(ToolCallback),
    /// Bound to an executor; runs once, then replays the cached envelope
    Call {
        executor: Arc<dyn ToolExecutor>,
        invocation: ToolInvocation,
    },
}

enum Role {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        responder: Arc<dyn AssistantResponder>,
    },
    Tool {
        call_id: String,
        name: String,
        source: ToolSource,
    },
}

/// Output of a single actor turn
#[derive(Debug, Clone, PartialEq)]
pub enum Utterance {
    System(String),
    User(String),
    Assistant(AssistantReply),
    Tool {
        call_id: String,
        name: String,
        result: ToolEnvelope,
    },
}

impl Utterance {
    pub fn into_message(self) -> Message {
        match self {
            Utterance::System(content) => Message::System { content },
            Utterance::User(content) => Message::User { content },
            Utterance::Assistant(reply) => Message::Assistant {
                content: reply.content,
                tool_calls: reply.tool_calls,
            },
            Utterance::Tool {
                call_id,
                name,
                result,
            } => Message::Tool {
                tool_call_id: call_id,
                tool: name,
                result,
            },
        }
    }
}

/// Tool name marking a result the model must not try to call itself
fn injected_tool_name(tool: &str) -> String {
    format!("injected-{tool}-DO-NOT-CALL-YOURSELF-THIS-IS-AUTOMATED")
}

/// One participant in the scheduling queue
pub struct Actor {
    id: ActorId,
    budget: TurnBudget,
    pub(super) turns_taken: u32,
    role: Role,
}

impl Actor {
    fn new(role: Role) -> Self {
        Self {
            id: ActorId::random(),
            budget: TurnBudget::Unlimited,
            turns_taken: 0,
            role,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System {
            content: content.into(),
        })
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User {
            content: content.into(),
        })
    }

    pub fn assistant(responder: Arc<dyn AssistantResponder>) -> Self {
        Self::new(Role::Assistant { responder })
    }

    /// Tool actor carrying a precomputed result
    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: ToolEnvelope,
    ) -> Self {
        Self::new(Role::Tool {
            call_id: call_id.into(),
            name: name.into(),
            source: ToolSource::Ready(result),
        })
    }

    /// Tool actor whose callback is evaluated on every turn it takes
    pub fn tool_callback(
        name: impl Into<String>,
        callback: impl Fn() -> ToolEnvelope + Send + Sync + 'static,
    ) -> Self {
        Self::new(Role::Tool {
            call_id: Uuid::new_v4().to_string(),
            name: name.into(),
            source: ToolSource::Callback(Arc::new(callback)),
        })
    }

    /// Context injected as if a tool had produced it
    pub fn injected_tool(tool: &str, result: Value) -> Self {
        Self::tool_result(
            Uuid::new_v4().to_string(),
            injected_tool_name(tool),
            ToolEnvelope::success(result),
        )
    }

    /// Like [`Actor::injected_tool`], but recomputed every turn
    pub fn injected_tool_callback(
        tool: &str,
        callback: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        Self::tool_callback(injected_tool_name(tool), move || {
            ToolEnvelope::success(callback())
        })
    }

    /// Fresh single-turn actor for an invocation requested by an assistant
    pub(crate) fn spawned_tool(
        invocation: ToolInvocation,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self::new(Role::Tool {
            call_id: invocation.id.clone(),
            name: invocation.name.clone(),
            source: ToolSource::Call {
                executor,
                invocation,
            },
        })
        .with_budget(TurnBudget::ONCE)
    }

    #[must_use]
    pub fn with_budget(mut self, budget: TurnBudget) -> Self {
        self.budget = budget;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: ActorId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn budget(&self) -> TurnBudget {
        self.budget
    }

    pub fn turns_taken(&self) -> u32 {
        self.turns_taken
    }

    pub fn kind(&self) -> ActorKind {
        match self.role {
            Role::System { .. } => ActorKind::System,
            Role::User { .. } => ActorKind::User,
            Role::Assistant { .. } => ActorKind::Assistant,
            Role::Tool { .. } => ActorKind::Tool,
        }
    }

    /// Name of the tool this actor represents
    pub fn tool_name(&self) -> Option<&str> {
        match &self.role {
            Role::Tool { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Run this actor's turn.
    ///
    /// Static actors return their content verbatim, assistants consult their
    /// responder with `transcript`, and tool actors produce a result
    /// envelope. Only assistant turns can fail.
    pub async fn invoke(&mut self, transcript: &Transcript) -> Result<Utterance, LlmError> {
        match &mut self.role {
            Role::System { content } => Ok(Utterance::System(content.clone())),
            Role::User { content } => Ok(Utterance::User(content.clone())),
            Role::Assistant { responder } => {
                responder.respond(transcript).await.map(Utterance::Assistant)
            }
            Role::Tool {
                call_id,
                name,
                source,
            } => {
                let result = match source {
                    ToolSource::Ready(envelope) => envelope.clone(),
                    ToolSource::Callback(callback) => (**callback)(),
                    ToolSource::Call {
                        executor,
                        invocation,
                    } => executor.execute(invocation).await,
                };
                if matches!(source, ToolSource::Call { .. }) {
                    *source = ToolSource::Ready(result.clone());
                }
                Ok(Utterance::Tool {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    result,
                })
            }
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Actor");
        s.field("id", &self.id)
            .field("kind", &self.kind())
            .field("budget", &self.budget)
            .field("turns_taken", &self.turns_taken);
        if let Some(name) = self.tool_name() {
            s.field("tool", &name);
        }
        s.finish()
    }
}
