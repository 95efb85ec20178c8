//! Roundtable - interactive chat on top of the round scheduler
//!
//! Every line typed at the prompt starts a round. Transcripts are stored in
//! SQLite as they grow.

use async_trait::async_trait;
use roundtable::config::AppConfig;
use roundtable::context::ShortTermMemory;
use roundtable::llm::{AnthropicService, LlmResponder, LlmService, LoggingService};
use roundtable::memory::SqliteMemorySink;
use roundtable::prompts::{
    AGENTIC_PROMPT, CLASSIFIER_PROMPT, CONVERSATIONAL_PROMPT, SEARCH_PROMPT, THINKING_REMINDER,
};
use roundtable::router::{Category, Route, RouterHandle, SemanticRouter};
use roundtable::session::{
    Actor, InjectionMode, RoundDirective, RoundHook, Session, SessionConfig, SessionError,
    SessionState, ToolInvocation, Transcript, TurnBudget,
};
use roundtable::tools::{Approval, Approver, ToolRegistry, CATEGORIZE_TOOL};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tools offered to answering assistants; `categorize_prompt` is reserved
/// for the classifier
const ASSISTANT_TOOLS: &[&str] = &["think", "summarize"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roundtable=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(io::stderr),
        )
        .init();

    let config = AppConfig::from_env()?;

    tracing::info!(path = %config.db_path.display(), "Opening transcript database");
    let memory = Arc::new(SqliteMemorySink::open(&config.db_path)?);

    let service: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(
        AnthropicService::new(&config.api_key, &config.model, config.gateway.as_deref())?,
    )));
    tracing::info!(model = %config.model, gateway = ?config.gateway, "LLM service initialized");

    let registry = ToolRegistry::standard(Arc::new(LlmResponder::new(service.clone())))
        .with_approver(Arc::new(StdinApprover));
    let assistant_tools = registry.definitions_for(ASSISTANT_TOOLS);
    let classifier_tools = registry.definitions_for(&[CATEGORIZE_TOOL]);

    let budget = config
        .max_assistant_turns
        .map_or(TurnBudget::Unlimited, TurnBudget::limited);
    let assistant =
        || Arc::new(LlmResponder::new(service.clone()).with_tools(assistant_tools.clone()));

    let mut session_config = SessionConfig::looped();
    if let Some(max_rounds) = config.max_rounds {
        session_config = session_config.with_max_rounds(max_rounds);
    }
    let mut session = Session::new(
        session_config,
        vec![Actor::system(config.system_prompt.clone())],
        Actor::assistant(assistant()).with_budget(budget),
    )?
    .with_tool_executor(Arc::new(registry))
    .with_memory(memory);

    let router = if config.semantic_router {
        let route = |prompt: &str| {
            Route::new(assistant())
                .with_system_prompt(prompt)
                .with_budget(budget)
        };
        let classifier = LlmResponder::new(service.clone())
            .with_tools(classifier_tools)
            .with_instructions(CLASSIFIER_PROMPT);
        let handle = SemanticRouter::new(Arc::new(classifier))
            .route(Category::Conversational, route(CONVERSATIONAL_PROMPT))
            .route(Category::Search, route(SEARCH_PROMPT))
            .route(
                Category::Agentic,
                route(AGENTIC_PROMPT).with_reminder(THINKING_REMINDER),
            )
            .install(session.state_mut())?;
        Some(handle)
    } else {
        None
    };

    println!("Roundtable with {} (/exit or Ctrl+D to quit)", config.model);
    println!();

    let short_term = config.summary_window.map(|rounds| {
        ShortTermMemory::new(Arc::new(LlmResponder::new(service.clone()))).with_window(rounds)
    });

    let mut session = session.with_round_hook(StdinPrompt {
        router,
        short_term,
    });
    let history = session.run().await?;

    // The limit ends the session before the hook could show the last answer
    if u64::try_from(history.len()).is_ok_and(|rounds| Some(rounds) == config.max_rounds) {
        show_answer(history.last());
    }
    tracing::info!(rounds = history.len(), "Session ended");
    Ok(())
}

/// Shows the previous answer, then reads the next prompt from stdin
struct StdinPrompt {
    router: Option<RouterHandle>,
    short_term: Option<ShortTermMemory>,
}

#[async_trait]
impl RoundHook for StdinPrompt {
    async fn on_round_start(
        &mut self,
        state: &mut SessionState,
    ) -> Result<RoundDirective, SessionError> {
        show_answer(state.history().last());
        if let Some(short_term) = self.short_term.as_mut() {
            short_term.refresh(state).await?;
        }

        loop {
            let line = read_line("> ".to_string())
                .await
                .map_err(|e| SessionError::Hook(format!("Failed to read prompt: {e}")))?;
            let Some(line) = line else {
                println!();
                return Ok(RoundDirective::Stop);
            };
            let prompt = line.trim();
            if prompt.is_empty() {
                continue;
            }
            if prompt == "/exit" {
                return Ok(RoundDirective::Stop);
            }

            state.inject(Actor::user(prompt), InjectionMode::Deferred)?;
            if let Some(router) = &self.router {
                router.classify(state)?;
            }
            return Ok(RoundDirective::Continue);
        }
    }
}

fn show_answer(transcript: Option<&Transcript>) {
    let Some(transcript) = transcript else {
        return;
    };
    match transcript.last_assistant_text() {
        Some(answer) => println!("\n{answer}\n"),
        None => println!("\n(no answer this round, see logs)\n"),
    }
}

/// Asks on the terminal before running approval-gated tools
struct StdinApprover;

#[async_trait]
impl Approver for StdinApprover {
    async fn approve(&self, invocation: &ToolInvocation) -> Approval {
        let arguments = serde_json::Value::Object(invocation.arguments.clone());
        let question = format!(
            "Allow tool `{}` with {arguments}? [y/N or a reason to refuse] ",
            invocation.name
        );
        match read_line(question).await {
            Ok(Some(answer)) => {
                let answer = answer.trim();
                match answer {
                    "y" | "Y" | "yes" => Approval::Granted,
                    "" | "n" | "N" | "no" => Approval::Refused(None),
                    reason => Approval::Refused(Some(reason.to_string())),
                }
            }
            Ok(None) => Approval::Refused(None),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read approval, refusing");
                Approval::Refused(None)
            }
        }
    }
}

/// Print `prompt` and read one line without blocking the runtime;
/// `None` on EOF
async fn read_line(prompt: String) -> io::Result<Option<String>> {
    tokio::task::spawn_blocking(move || {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    })
    .await
    .map_err(io::Error::other)?
}
