//! Turn and round scheduling engine
//!
//! A [`Session`] owns the [`SessionState`] and repeats rounds. Each round
//! enrolls the static actors and the persistent pools, runs actors one at a
//! time in queue order, lets assistants spawn tool actors at the tail of the
//! live queue, and closes when the end-of-round sentinel is reached.

mod actor;
mod error;
mod message;
mod round;
mod state;
mod traits;
mod turn;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use actor::{Actor, ActorId, ActorKind, ToolCallback, TurnBudget, Utterance};
pub use error::SessionError;
pub use message::{AssistantReply, Message, ToolEnvelope, ToolInvocation, Transcript};
pub use round::RoundOutcome;
pub use state::{InjectionMode, QueueEntry, SessionState, SubscriptionHandler};
pub use traits::{AssistantResponder, MemorySink, RoundDirective, RoundHook, ToolExecutor};
pub use turn::TurnOutcome;

use crate::memory::NullSink;
use std::sync::Arc;

/// Immutable per-session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Keep starting rounds after one closes
    pub looped: bool,
    /// Upper bound on closed rounds for looped sessions
    pub max_rounds: Option<u64>,
}

impl SessionConfig {
    /// One round, then terminate (programmatic sub-task dispatch)
    pub fn single_shot() -> Self {
        Self {
            looped: false,
            max_rounds: None,
        }
    }

    /// Rounds repeat until the round hook stops the session
    pub fn looped() -> Self {
        Self {
            looped: true,
            max_rounds: None,
        }
    }

    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: u64) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::single_shot()
    }
}

/// Round lifecycle as seen by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    RoundActive,
    RoundClosed,
    Terminated,
}

pub struct Session {
    config: SessionConfig,
    state: SessionState,
    static_actors: Vec<ActorId>,
    tool_executor: Option<Arc<dyn ToolExecutor>>,
    memory: Arc<dyn MemorySink>,
    hook: Option<Box<dyn RoundHook>>,
    lifecycle: Lifecycle,
}

impl Session {
    /// Create a session from its initial participants.
    ///
    /// Fails when there are no static actors, when `main_assistant` is not
    /// an assistant, or when two actors share an id.
    pub fn new(
        config: SessionConfig,
        static_actors: Vec<Actor>,
        main_assistant: Actor,
    ) -> Result<Self, SessionError> {
        if static_actors.is_empty() {
            return Err(SessionError::NoParticipants);
        }
        let kind = main_assistant.kind();
        if kind != ActorKind::Assistant {
            return Err(SessionError::InvalidMainAssistant { kind });
        }

        let mut state = SessionState::new(main_assistant);
        let static_actors = static_actors
            .into_iter()
            .map(|actor| state.register(actor))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            session_id = %state.session_id(),
            looped = config.looped,
            participants = static_actors.len(),
            "Session created"
        );

        Ok(Self {
            config,
            state,
            static_actors,
            tool_executor: None,
            memory: Arc::new(NullSink),
            hook: None,
            lifecycle: Lifecycle::Idle,
        })
    }

    /// Executor for tools requested by assistants. Without one, any
    /// assistant turn ends the round.
    #[must_use]
    pub fn with_tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tool_executor = Some(executor);
        self
    }

    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn MemorySink>) -> Self {
        self.memory = memory;
        self
    }

    #[must_use]
    pub fn with_round_hook(mut self, hook: impl RoundHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Mutable access for injection and subscriptions between rounds
    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn static_actors(&self) -> &[ActorId] {
        &self.static_actors
    }

    pub fn history(&self) -> &[Transcript] {
        self.state.history()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn into_history(self) -> Vec<Transcript> {
        self.state.into_history()
    }

    fn set_lifecycle(&mut self, next: Lifecycle) {
        tracing::trace!(from = ?self.lifecycle, to = ?next, "Lifecycle transition");
        self.lifecycle = next;
    }

    /// Run rounds until the session terminates and return the history.
    ///
    /// A single-shot session runs exactly one round. A looped session runs
    /// until its round hook returns [`RoundDirective::Stop`] or
    /// `max_rounds` rounds have closed. Configuration and invariant errors
    /// terminate the session.
    pub async fn run(&mut self) -> Result<&[Transcript], SessionError> {
        let mut closed: u64 = 0;
        while self.lifecycle != Lifecycle::Terminated {
            match self.run_round().await {
                Ok(RoundOutcome::Stopped) => self.set_lifecycle(Lifecycle::Terminated),
                Ok(RoundOutcome::Closed { .. }) => {
                    closed += 1;
                    let limit_reached = self.config.max_rounds.is_some_and(|max| closed >= max);
                    if !self.config.looped || limit_reached {
                        self.set_lifecycle(Lifecycle::Terminated);
                    }
                }
                Err(error) => {
                    tracing::error!(
                        session_id = %self.state.session_id(),
                        round = self.state.round(),
                        error = %error,
                        "Session terminated"
                    );
                    self.set_lifecycle(Lifecycle::Terminated);
                    return Err(error);
                }
            }
        }
        tracing::info!(
            session_id = %self.state.session_id(),
            rounds = self.state.history().len(),
            "Session finished"
        );
        Ok(self.state.history())
    }
}
