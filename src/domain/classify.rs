//! Classification domain models shared by the rule engine and the LLM
//! provider. The wire shape of `Classification` is also what gets persisted
//! verbatim on `ai_suggestions.payload`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::incident::{Category, Severity};

/// Version tag recorded on every stored suggestion so payloads produced by
/// older prompts remain distinguishable.
pub const PROMPT_VERSION: &str = "v2";

/// A classification result: what the provider suggests for an incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub severity: Severity,
    pub summary: String,
    pub next_steps: Vec<String>,
    pub customer_message: String,
}

/// Which path produced a provider response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMode {
    Llm,
    Rules,
    /// The remote provider failed and the rule engine answered instead.
    RulesFallback,
}

/// Classification plus the mode annotation the UI uses to tell the user a
/// fallback happened without failing the request.
#[derive(Debug, Clone, Serialize)]
pub struct Enrichment {
    #[serde(flatten)]
    pub classification: Classification,
    pub mode: ProviderMode,
}

/// Request body for `POST /enrich`
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichRequest {
    pub description: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Request body for `POST /riskmap/ask`
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Answer to a risk-map question, annotated with the producing path.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub mode: ProviderMode,
}

/// A stored provider suggestion, immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct AiSuggestion {
    pub id: i64,
    pub incident_id: i64,
    pub payload: serde_json::Value,
    pub provider: String,
    pub prompt_version: String,
    pub created_at: DateTime<Utc>,
}
