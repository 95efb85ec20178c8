//! Property-based tests for the scheduler
//!
//! These tests verify key scheduling invariants across generated session
//! shapes.

use super::testing::{MockToolExecutor, ScriptedResponder};
use super::*;
use proptest::prelude::*;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Test Helpers
// ============================================================================

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn text_responder(replies: usize) -> Arc<ScriptedResponder> {
    let responder = Arc::new(ScriptedResponder::new());
    for i in 0..replies {
        responder.queue_reply(AssistantReply::text(format!("reply {i}")));
    }
    responder
}

fn arb_prompts() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,12}", 1..6)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Each closed round appends exactly one transcript to history
    #[test]
    fn prop_history_grows_once_per_round(rounds in 1u64..6) {
        let history = block_on(async {
            let mut session = Session::new(
                SessionConfig::looped().with_max_rounds(rounds),
                vec![Actor::system("rules"), Actor::user("hello")],
                Actor::assistant(text_responder(usize::try_from(rounds).unwrap())),
            )
            .unwrap();
            session.run().await.unwrap();
            session.into_history()
        });

        prop_assert_eq!(history.len() as u64, rounds);
        for (i, transcript) in history.iter().enumerate() {
            prop_assert_eq!(transcript.len(), 3);
            let expected = format!("reply {i}");
            prop_assert_eq!(transcript.last_assistant_text(), Some(expected.as_str()));
        }
    }

    /// An identity enrolled from several sources takes one turn per round
    #[test]
    fn prop_enrollment_deduplicates_identity(copies in 1usize..6, rounds in 1u64..4) {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let reminder = Actor::injected_tool_callback("reminder", move || {
            c.fetch_add(1, Ordering::SeqCst);
            serde_json::Value::from("think first")
        });
        let reminder_id = reminder.id();

        block_on(async {
            let mut session = Session::new(
                SessionConfig::looped().with_max_rounds(rounds),
                vec![Actor::user("hi"), reminder],
                Actor::assistant(text_responder(usize::try_from(rounds).unwrap())),
            )
            .unwrap();
            for _ in 0..copies {
                session
                    .state_mut()
                    .reenroll(reminder_id, InjectionMode::Persistent)
                    .unwrap();
            }
            session.run().await.unwrap();
        });

        prop_assert_eq!(counter.load(Ordering::SeqCst) as u64, rounds);
    }

    /// Deferred injections run after enrolled actors, in injection order
    #[test]
    fn prop_deferred_injections_keep_order(prompts in arb_prompts()) {
        let history = block_on(async {
            let mut session = Session::new(
                SessionConfig::single_shot(),
                vec![Actor::system("rules")],
                Actor::assistant(text_responder(1)),
            )
            .unwrap();
            for prompt in &prompts {
                session
                    .state_mut()
                    .inject(Actor::user(prompt.clone()), InjectionMode::Deferred)
                    .unwrap();
            }
            session.run().await.unwrap();
            session.into_history()
        });

        let transcript = &history[0];
        prop_assert_eq!(transcript.len(), prompts.len() + 2);
        prop_assert_eq!(transcript.messages()[0].role(), "system");
        for (message, prompt) in transcript.messages()[1..].iter().zip(&prompts) {
            prop_assert_eq!(message.role(), "user");
            prop_assert_eq!(&message.text(), prompt);
        }
    }

    /// A finite main-assistant budget caps assistant turns per round
    #[test]
    fn prop_main_budget_bounds_assistant_turns(budget in 1u32..5) {
        let responder = Arc::new(ScriptedResponder::new());
        for i in 0..8 {
            responder.queue_reply(
                AssistantReply::text("more").with_tool_call(ToolInvocation::new(
                    format!("call_{i}"),
                    "think",
                    serde_json::Map::new(),
                )),
            );
        }
        let history = block_on(async {
            let mut session = Session::new(
                SessionConfig::single_shot(),
                vec![Actor::user("loop forever")],
                Actor::assistant(responder)
                    .with_budget(TurnBudget::limited(NonZeroU32::new(budget).unwrap())),
            )
            .unwrap()
            .with_tool_executor(Arc::new(
                MockToolExecutor::new().with_tool("think", ToolEnvelope::success("ok")),
            ));
            session.run().await.unwrap();
            session.into_history()
        });

        let assistant_turns = history[0].iter().filter(|m| m.role() == "assistant").count();
        prop_assert_eq!(assistant_turns, budget as usize);
    }
}
