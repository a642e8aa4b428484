//! `LlmProvider` implementations.
//!
//! - [`OpenRouterProvider`] talks to any OpenAI-compatible endpoint
//! - [`ScriptedProvider`] replays scripted replies for tests and dry runs

pub mod openrouter;
pub mod scripted;

pub use openrouter::OpenRouterProvider;
pub use scripted::{ScriptedProvider, ScriptedReply};
