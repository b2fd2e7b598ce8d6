//! AI provider seam.
//!
//! Classification and risk Q&A run behind a trait object so the rule engine
//! and the remote LLM are interchangeable. The implementation is chosen once
//! at startup from configuration, never per request.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{AiProviderKind, Settings};
use crate::domain::classify::{AskResponse, Enrichment};
use crate::domain::risk::RiskOverview;
use crate::services::{LlmProvider, RulesProvider};

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Classify a free-text description. Never fails: remote errors degrade
    /// to the rule engine and the outcome is annotated with its mode.
    async fn classify(&self, description: &str, address: Option<&str>) -> Enrichment;

    /// Answer a natural-language question about the risk overview.
    async fn ask(&self, question: &str, overview: &RiskOverview) -> AskResponse;

    /// Provider identifier recorded on stored suggestions.
    fn name(&self) -> &str;
}

/// Build the configured provider.
pub fn build_provider(settings: &Settings) -> Result<Arc<dyn AiProvider>> {
    match settings.ai_provider {
        AiProviderKind::Rules => Ok(Arc::new(RulesProvider)),
        AiProviderKind::Llm => Ok(Arc::new(LlmProvider::new(settings)?)),
    }
}
