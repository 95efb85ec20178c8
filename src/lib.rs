//! Roundtable - a turn-and-round scheduler for LLM conversations
//!
//! Participants (system prompts, users, assistants, tools) take turns in a
//! queue. Assistants may spawn tool actors mid-round; a round closes when
//! the assistant answers without requesting tools, and its transcript is
//! appended to the session history.

pub mod config;
pub mod context;
pub mod llm;
pub mod memory;
pub mod prompts;
pub mod router;
pub mod session;
pub mod tools;
