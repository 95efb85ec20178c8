//! Turn executor
//!
//! Dispatches one actor's turn by kind and applies the budget policy.

use super::actor::{Actor, ActorId, Utterance};
use super::error::SessionError;
use super::message::{AssistantReply, Message};
use super::Session;
use crate::memory::TranscriptKey;

/// How a dispatch attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The actor ran and its message was recorded
    Completed,
    /// The actor had exhausted its budget and was evicted without running
    Evicted,
    /// The actor was already evicted this round
    Skipped,
}

impl Session {
    /// Run a single actor's turn against the current round transcript.
    ///
    /// Responder failures end the round; they never surface as errors.
    /// Only invariant violations and subscriber errors are returned.
    pub(super) async fn take_turn(&mut self, id: ActorId) -> Result<TurnOutcome, SessionError> {
        if self.state.is_evicted(id) {
            tracing::debug!(actor_id = %id, "Skipping evicted actor");
            return Ok(TurnOutcome::Skipped);
        }

        let actor = self.state.actor(id).ok_or(SessionError::UnknownActor(id))?;
        let kind = actor.kind();
        if actor.budget().is_exhausted(actor.turns_taken()) {
            self.state.evict(id);
            return Ok(TurnOutcome::Evicted);
        }

        tracing::debug!(actor_id = %id, %kind, round = self.state.round(), "Turn started");
        let actor = self
            .state
            .actors
            .get_mut(&id)
            .ok_or(SessionError::UnknownActor(id))?;
        let utterance = actor.invoke(&self.state.transcript).await;

        match utterance {
            Ok(Utterance::System(content)) => self.state.transcript.upsert_system(content),
            Ok(utterance @ Utterance::User(_)) => {
                self.state.transcript.push(utterance.into_message());
            }
            Ok(Utterance::Assistant(reply)) => self.record_assistant(reply)?,
            Ok(Utterance::Tool {
                call_id,
                name,
                result,
            }) => {
                tracing::info!(
                    actor_id = %id,
                    tool = %name,
                    success = result.success,
                    "Tool result"
                );
                self.state.transcript.push(Message::Tool {
                    tool_call_id: call_id,
                    tool: name.clone(),
                    result: result.clone(),
                });
                self.state.notify_subscribers(&name, &result)?;
            }
            Err(error) => {
                tracing::error!(
                    actor_id = %id,
                    %kind,
                    error = %error,
                    "Assistant turn failed, ending round"
                );
                self.state.end_round();
            }
        }

        if let Some(actor) = self.state.actors.get_mut(&id) {
            actor.turns_taken += 1;
        }
        self.persist_transcript().await;
        tracing::debug!(actor_id = %id, %kind, "Turn ended");
        Ok(TurnOutcome::Completed)
    }

    /// Append the assistant message and schedule the tools it requested.
    ///
    /// Without requested tools, or without an executor to run them, the
    /// round ends after this turn.
    fn record_assistant(&mut self, reply: AssistantReply) -> Result<(), SessionError> {
        let spawned: Vec<Actor> = match &self.tool_executor {
            Some(executor) => reply
                .tool_calls
                .iter()
                .cloned()
                .map(|invocation| Actor::spawned_tool(invocation, executor.clone()))
                .collect(),
            None => Vec::new(),
        };
        self.state.transcript.push(Message::Assistant {
            content: reply.content,
            tool_calls: reply.tool_calls,
        });

        if spawned.is_empty() {
            self.state.end_round();
            return Ok(());
        }
        for actor in spawned {
            let id = self.state.admit(actor)?;
            self.state.enqueue(id);
        }
        Ok(())
    }

    async fn persist_transcript(&mut self) {
        let key = TranscriptKey {
            session_id: self.state.session_id(),
            created_at: self.state.created_at(),
            round: self.state.round(),
        };
        if let Err(error) = self.memory.persist(&key, &self.state.transcript).await {
            tracing::warn!(
                session_id = %key.session_id,
                round = key.round,
                error = %error,
                "Failed to persist transcript"
            );
        }
    }
}
