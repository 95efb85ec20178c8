//! Environment-driven configuration for the `roundtable` binary

use crate::prompts::MASTER_SYSTEM_PROMPT;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `"implicit"` in gateway mode; the gateway authenticates
    pub api_key: String,
    /// LLM gateway base URL
    pub gateway: Option<String>,
    pub model: String,
    pub db_path: PathBuf,
    pub system_prompt: String,
    /// Stop after this many rounds
    pub max_rounds: Option<u64>,
    pub semantic_router: bool,
    /// Per-round turn budget of the main assistant, bounding tool iterations
    pub max_assistant_turns: Option<NonZeroU32>,
    /// Closed rounds condensed into the injected conversation summary;
    /// `None` disables the summary
    pub summary_window: Option<usize>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let gateway = get("LLM_GATEWAY");
        let api_key = match (&gateway, get("ANTHROPIC_API_KEY")) {
            (Some(_), _) => "implicit".to_string(),
            (None, Some(key)) => key,
            (None, None) => {
                return Err(ConfigError::Missing("set ANTHROPIC_API_KEY or LLM_GATEWAY"))
            }
        };

        let db_path = get("ROUNDTABLE_DB_PATH").map_or_else(
            || {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".roundtable").join("transcripts.db")
            },
            PathBuf::from,
        );

        Ok(Self {
            api_key,
            gateway,
            model: get("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            db_path,
            system_prompt: get("ROUNDTABLE_SYSTEM_PROMPT")
                .unwrap_or_else(|| MASTER_SYSTEM_PROMPT.to_string()),
            max_rounds: parse_var("ROUNDTABLE_MAX_ROUNDS", get("ROUNDTABLE_MAX_ROUNDS"))?,
            semantic_router: parse_flag(
                "ROUNDTABLE_SEMANTIC_ROUTER",
                get("ROUNDTABLE_SEMANTIC_ROUTER"),
            )?,
            max_assistant_turns: parse_var(
                "ROUNDTABLE_MAX_ASSISTANT_TURNS",
                get("ROUNDTABLE_MAX_ASSISTANT_TURNS"),
            )?,
            summary_window: parse_var(
                "ROUNDTABLE_SUMMARY_WINDOW",
                get("ROUNDTABLE_SUMMARY_WINDOW"),
            )?
            .filter(|&rounds: &usize| rounds > 0),
        })
    }
}

fn parse_var<T>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn parse_flag(var: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}
