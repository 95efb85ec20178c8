//! Short-term memory of the conversation
//!
//! Before a round starts, the last few closed rounds are condensed by the
//! summarizer and offered to the assistant as an injected tool result. The
//! injection is persistent: it joins every later round and always reports
//! the most recent summary.

use crate::session::{
    Actor, ActorId, AssistantResponder, InjectionMode, Message, RoundDirective, RoundHook,
    SessionError, SessionState, Transcript,
};
use crate::tools::SummarizeTool;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub const SUMMARY_TOOL: &str = "summary_of_ongoing_conversation";

/// Closed rounds condensed into the summary
pub const DEFAULT_SUMMARY_WINDOW: usize = 5;

pub struct ShortTermMemory {
    summarizer: SummarizeTool,
    window: usize,
    latest: Arc<Mutex<Option<String>>>,
    actor: Option<ActorId>,
    summarized_rounds: usize,
}

impl ShortTermMemory {
    pub fn new(summarizer: Arc<dyn AssistantResponder>) -> Self {
        Self {
            summarizer: SummarizeTool::new(summarizer),
            window: DEFAULT_SUMMARY_WINDOW,
            latest: Arc::new(Mutex::new(None)),
            actor: None,
            summarized_rounds: 0,
        }
    }

    #[must_use]
    pub fn with_window(mut self, rounds: usize) -> Self {
        self.window = rounds.max(1);
        self
    }

    /// Summarize rounds closed since the last call and make sure the summary
    /// actor is pooled. A failed summary keeps the previous one.
    pub async fn refresh(&mut self, state: &mut SessionState) -> Result<(), SessionError> {
        let history = state.history();
        if history.is_empty() || history.len() == self.summarized_rounds {
            return Ok(());
        }
        let rounds = history.len();
        let text = conversation_text(&history[rounds.saturating_sub(self.window)..]);
        if text.is_empty() {
            self.summarized_rounds = rounds;
            return Ok(());
        }

        let summary = match self.summarizer.summarize(text).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, rounds, "Conversation summary failed");
                return Ok(());
            }
        };
        tracing::debug!(rounds, window = self.window, "Conversation summary refreshed");
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(summary);
        }
        self.summarized_rounds = rounds;

        if self.actor.is_none() {
            let latest = Arc::clone(&self.latest);
            let actor = Actor::injected_tool_callback(SUMMARY_TOOL, move || {
                let summary = latest.lock().ok().and_then(|summary| summary.clone());
                Value::String(summary.unwrap_or_default())
            });
            self.actor = Some(state.inject(actor, InjectionMode::Persistent)?);
        }
        Ok(())
    }
}

#[async_trait]
impl RoundHook for ShortTermMemory {
    async fn on_round_start(
        &mut self,
        state: &mut SessionState,
    ) -> Result<RoundDirective, SessionError> {
        self.refresh(state).await?;
        Ok(RoundDirective::Continue)
    }
}

/// `"<role> said: <text>"` per line, leaving out system prompts and the
/// summary injected earlier
fn conversation_text(rounds: &[Transcript]) -> String {
    rounds
        .iter()
        .flat_map(Transcript::iter)
        .filter(|message| match message {
            Message::System { .. } => false,
            Message::Tool { tool, .. } => !tool.contains(SUMMARY_TOOL),
            _ => true,
        })
        .filter_map(|message| {
            let text = message.text();
            (!text.is_empty()).then(|| format!("{} said: {text}", message.role()))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::session::testing::ScriptedResponder;
    use crate::session::{AssistantReply, Session, SessionConfig};
    use serde_json::json;

    /// Refreshes the summary, then asks the next question
    struct Conversation {
        memory: ShortTermMemory,
        prompts: Vec<&'static str>,
    }

    #[async_trait]
    impl RoundHook for Conversation {
        async fn on_round_start(
            &mut self,
            state: &mut SessionState,
        ) -> Result<RoundDirective, SessionError> {
            self.memory.refresh(state).await?;
            if self.prompts.is_empty() {
                return Ok(RoundDirective::Stop);
            }
            let prompt = self.prompts.remove(0);
            state.inject(Actor::user(prompt), InjectionMode::Deferred)?;
            Ok(RoundDirective::Continue)
        }
    }

    fn summary_messages(transcript: &Transcript) -> Vec<&Message> {
        transcript
            .iter()
            .filter(|m| matches!(m, Message::Tool { tool, .. } if tool.contains(SUMMARY_TOOL)))
            .collect()
    }

    #[tokio::test]
    async fn test_later_rounds_see_summary_of_earlier_ones() {
        let assistant = Arc::new(ScriptedResponder::new());
        assistant.queue_reply(AssistantReply::text("Paris"));
        assistant.queue_reply(AssistantReply::text("About two million"));
        let summarizer = Arc::new(ScriptedResponder::new());
        summarizer.queue_reply(AssistantReply::text("They asked about the capital of France"));

        let mut session = Session::new(
            SessionConfig::looped(),
            vec![Actor::system("rules")],
            Actor::assistant(assistant.clone()),
        )
        .unwrap()
        .with_round_hook(Conversation {
            memory: ShortTermMemory::new(summarizer.clone()),
            prompts: vec!["What is the capital of France?", "How many people live there?"],
        });

        let history = session.run().await.unwrap();

        assert_eq!(history.len(), 2);
        assert!(summary_messages(&history[0]).is_empty());
        let injected = summary_messages(&history[1]);
        assert_eq!(injected.len(), 1);
        assert!(matches!(
            injected[0],
            Message::Tool { result, .. }
                if result.success && result.result == "They asked about the capital of France"
        ));

        // The summarizer saw the first round without its system prompt
        let seen = summarizer.seen_transcripts();
        assert_eq!(
            seen[0].messages()[1].text(),
            "user said: What is the capital of France?\nassistant said: Paris"
        );
    }

    fn summary_results(transcript: &Transcript) -> Vec<Value> {
        summary_messages(transcript)
            .into_iter()
            .filter_map(|m| match m {
                Message::Tool { result, .. } => Some(result.result.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_summary_follows_window_and_survives_failures() {
        let assistant = Arc::new(ScriptedResponder::new());
        for answer in ["1", "2", "3", "4"] {
            assistant.queue_reply(AssistantReply::text(answer));
        }
        let summarizer = Arc::new(ScriptedResponder::new());
        summarizer.queue_reply(AssistantReply::text("first summary"));
        summarizer.queue_reply(AssistantReply::text("second summary"));
        summarizer.queue_error(LlmError::server_error("upstream down"));

        let mut session = Session::new(
            SessionConfig::looped(),
            vec![Actor::system("rules")],
            Actor::assistant(assistant),
        )
        .unwrap()
        .with_round_hook(Conversation {
            memory: ShortTermMemory::new(summarizer.clone()).with_window(1),
            prompts: vec!["one", "two", "three", "four"],
        });

        let history = session.run().await.unwrap();

        assert_eq!(history.len(), 4);
        assert!(summary_results(&history[0]).is_empty());
        assert_eq!(summary_results(&history[1]), vec![json!("first summary")]);
        assert_eq!(summary_results(&history[2]), vec![json!("second summary")]);
        // The third summary failed; the previous one is still offered
        assert_eq!(summary_results(&history[3]), vec![json!("second summary")]);

        // A window of one round, without the summary injected into it
        let seen = summarizer.seen_transcripts();
        assert_eq!(seen[1].messages()[1].text(), "user said: two\nassistant said: 2");
        assert_eq!(seen[2].messages()[1].text(), "user said: three\nassistant said: 3");
    }

    #[test]
    fn test_conversation_text_skips_system_and_empty_messages() {
        let mut transcript = exchange("hi", "hello");
        transcript.push(Message::System {
            content: "rules".to_string(),
        });
        transcript.push(Message::Assistant {
            content: String::new(),
            tool_calls: vec![],
        });
        assert_eq!(conversation_text(&[transcript]), "user said: hi\nassistant said: hello");
    }

    fn exchange(question: &str, answer: &str) -> Transcript {
        let mut transcript = Transcript::new();
        transcript.push(Message::System {
            content: "rules".to_string(),
        });
        transcript.push(Message::User {
            content: question.to_string(),
        });
        transcript.push(Message::Assistant {
            content: answer.to_string(),
            tool_calls: vec![],
        });
        transcript
    }
}
