//! Service layer modules for external integrations.
//!
//! Contains the AI provider implementations, the Redis cache, and the
//! speech-to-text pass-through.

pub mod cache;
pub mod llm;
pub mod provider;
pub mod rules;
pub mod transcribe;

pub use cache::RedisCache;
pub use llm::LlmProvider;
pub use provider::{build_provider, AiProvider};
pub use rules::RulesProvider;
pub use transcribe::Transcriber;
