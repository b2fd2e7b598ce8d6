//! Remote LLM provider.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint with a fixed
//! system prompt that constrains the model to strict JSON. Any failure along
//! the way (network, non-2xx, malformed JSON, schema mismatch) degrades to
//! the rule engine; the caller never sees an error.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Settings;
use crate::domain::classify::{AskResponse, Classification, Enrichment, ProviderMode};
use crate::domain::incident::TEXT_SOFT_CAP;
use crate::domain::risk::{self, RiskOverview};
use crate::services::provider::AiProvider;
use crate::services::rules;

const CLASSIFY_SYSTEM_PROMPT: &str = "You are an incident triage assistant for a utility company. \
Classify the reported incident and respond with a single JSON object and nothing else. \
The object must have exactly these fields: \
\"category\" (one of \"Leak\", \"Odor\", \"Outage\", \"Billing\", \"Meter\", \"Other\"), \
\"severity\" (one of \"Low\", \"Medium\", \"High\"), \
\"summary\" (at most 120 words), \
\"next_steps\" (an array of short action strings for the responding agent), \
\"customer_message\" (at most 120 words, addressed to the customer).";

const ASK_SYSTEM_PROMPT: &str = "You are a risk analyst for a utility company. \
Answer the operator's question about the risk map in one or two plain sentences, \
using only the JSON context provided. Do not invent numbers.";

pub struct LlmProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

impl LlmProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.llm_timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(model = %settings.llm_model, "LLM provider initialized");

        Ok(Self {
            client,
            base_url: settings.llm_api_url.trim_end_matches('/').to_string(),
            api_key: settings.llm_api_key.clone(),
            model: settings.llm_model.clone(),
        })
    }

    async fn chat(&self, system: &str, user: &str, strict_json: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.0,
            response_format: strict_json.then_some(ResponseFormat { kind: "json_object" }),
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("LLM request failed")?
            .error_for_status()
            .context("LLM returned an error status")?;

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Invalid LLM response body")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .context("LLM response had no choices")?
            .message
            .content;

        Ok(content)
    }

    async fn classify_remote(
        &self,
        description: &str,
        address: Option<&str>,
    ) -> Result<Classification> {
        let mut user = format!("Description: {}", description);
        if let Some(address) = address {
            user.push_str(&format!("\nAddress: {}", address));
        }

        let content = self.chat(CLASSIFY_SYSTEM_PROMPT, &user, true).await?;
        let classification: Classification = serde_json::from_str(content.trim())
            .context("LLM returned malformed classification JSON")?;
        validate_classification(&classification)?;
        Ok(classification)
    }

    async fn ask_remote(&self, question: &str, overview: &RiskOverview) -> Result<String> {
        let context = serde_json::to_string(overview).context("Failed to serialize risk context")?;
        let user = format!("Context: {}\n\nQuestion: {}", context, question);

        let answer = self.chat(ASK_SYSTEM_PROMPT, &user, false).await?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            bail!("LLM returned an empty answer");
        }
        Ok(answer)
    }
}

/// Schema gate on top of the typed parse: enum membership is enforced by
/// serde, field substance is enforced here.
fn validate_classification(c: &Classification) -> Result<()> {
    if c.summary.trim().is_empty() {
        bail!("classification summary is empty");
    }
    if c.customer_message.trim().is_empty() {
        bail!("classification customer_message is empty");
    }
    if c.next_steps.is_empty() || c.next_steps.iter().any(|s| s.trim().is_empty()) {
        bail!("classification next_steps is empty or has blank entries");
    }
    if c.summary.chars().count() > TEXT_SOFT_CAP || c.customer_message.chars().count() > TEXT_SOFT_CAP
    {
        bail!("classification text exceeds the length cap");
    }
    Ok(())
}

#[async_trait]
impl AiProvider for LlmProvider {
    async fn classify(&self, description: &str, address: Option<&str>) -> Enrichment {
        match self.classify_remote(description, address).await {
            Ok(classification) => Enrichment {
                classification,
                mode: ProviderMode::Llm,
            },
            Err(e) => {
                warn!(error = %e, "LLM classification failed, falling back to rule engine");
                Enrichment {
                    classification: rules::classify_text(description),
                    mode: ProviderMode::RulesFallback,
                }
            }
        }
    }

    async fn ask(&self, question: &str, overview: &RiskOverview) -> AskResponse {
        match self.ask_remote(question, overview).await {
            Ok(answer) => AskResponse {
                answer,
                mode: ProviderMode::Llm,
            },
            Err(e) => {
                warn!(error = %e, "LLM answer failed, falling back to rule-based summary");
                AskResponse {
                    answer: risk::summarize(question, overview),
                    mode: ProviderMode::RulesFallback,
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::incident::{Category, Severity};

    fn classification() -> Classification {
        Classification {
            category: Category::Leak,
            severity: Severity::High,
            summary: "Leak reported near the curb.".to_string(),
            next_steps: vec!["Dispatch crew".to_string()],
            customer_message: "Please evacuate the area.".to_string(),
        }
    }

    #[test]
    fn typed_parse_accepts_strict_json_and_rejects_bad_enums() {
        let good = r#"{
            "category": "Leak",
            "severity": "High",
            "summary": "Gas leak at 12 Main St.",
            "next_steps": ["Dispatch crew"],
            "customer_message": "Please evacuate."
        }"#;
        let parsed: Classification = serde_json::from_str(good).unwrap();
        assert_eq!(parsed.category, Category::Leak);

        let bad_enum = good.replace("\"High\"", "\"Catastrophic\"");
        assert!(serde_json::from_str::<Classification>(&bad_enum).is_err());

        let missing_field = r#"{"category": "Leak", "severity": "High"}"#;
        assert!(serde_json::from_str::<Classification>(missing_field).is_err());
    }

    #[test]
    fn validation_rejects_hollow_payloads() {
        assert!(validate_classification(&classification()).is_ok());

        let mut empty_summary = classification();
        empty_summary.summary = "  ".to_string();
        assert!(validate_classification(&empty_summary).is_err());

        let mut no_steps = classification();
        no_steps.next_steps.clear();
        assert!(validate_classification(&no_steps).is_err());

        let mut oversized = classification();
        oversized.customer_message = "x".repeat(TEXT_SOFT_CAP + 1);
        assert!(validate_classification(&oversized).is_err());
    }
}
