//! Round controller
//!
//! Enrolls participants, walks the live queue until the end-of-round
//! sentinel, and finalizes the transcript into history.

use super::actor::ActorId;
use super::error::SessionError;
use super::state::QueueEntry;
use super::traits::RoundDirective;
use super::turn::TurnOutcome;
use super::{Lifecycle, Session};
use std::collections::HashSet;

/// How a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The round reached its sentinel and was moved into history
    Closed { transcript_len: usize },
    /// The round-start hook asked the session to stop
    Stopped,
}

impl Session {
    /// Run one complete round
    pub async fn run_round(&mut self) -> Result<RoundOutcome, SessionError> {
        self.state.enroll_for_round(&self.static_actors)?;
        self.set_lifecycle(Lifecycle::RoundActive);

        if let Some(hook) = self.hook.as_mut() {
            let directive = hook.on_round_start(&mut self.state).await;
            match directive {
                Ok(RoundDirective::Continue) => {}
                Ok(RoundDirective::Stop) => {
                    self.state.discard_round(&self.static_actors);
                    self.set_lifecycle(Lifecycle::Idle);
                    tracing::info!(
                        session_id = %self.state.session_id(),
                        "Round hook stopped the session"
                    );
                    return Ok(RoundOutcome::Stopped);
                }
                Err(error) => {
                    self.state.discard_round(&self.static_actors);
                    return Err(error);
                }
            }
        }

        let mut processed: HashSet<ActorId> = HashSet::new();
        loop {
            match self.state.next_entry(&processed) {
                Some(QueueEntry::EndOfRound) => break,
                Some(QueueEntry::Actor(id)) => {
                    self.take_turn(id).await?;
                    processed.insert(id);
                }
                None => self.fallback_turn().await?,
            }
        }

        let transcript_len = self.state.close_round(&processed, &self.static_actors)?;
        self.set_lifecycle(Lifecycle::RoundClosed);
        tracing::info!(
            session_id = %self.state.session_id(),
            round = self.state.round(),
            transcript_len,
            "Round closed"
        );
        self.set_lifecycle(Lifecycle::Idle);
        Ok(RoundOutcome::Closed { transcript_len })
    }

    /// Every queued actor has been processed and nothing closed the round:
    /// give the main assistant a turn. If it can no longer act, close.
    async fn fallback_turn(&mut self) -> Result<(), SessionError> {
        let main = self.state.main_assistant();
        tracing::debug!(
            actor_id = %main,
            round = self.state.round(),
            "Queue drained, invoking main assistant"
        );
        match self.take_turn(main).await? {
            TurnOutcome::Completed => {}
            TurnOutcome::Evicted | TurnOutcome::Skipped => {
                tracing::warn!(
                    actor_id = %main,
                    round = self.state.round(),
                    "Main assistant exhausted its turn budget, ending round"
                );
                self.state.end_round();
            }
        }
        Ok(())
    }
}
