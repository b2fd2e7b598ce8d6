use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    #[allow(dead_code)]
    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Which classification provider to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProviderKind {
    Rules,
    Llm,
}

impl AiProviderKind {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "llm" | "openai" | "remote" => Self::Llm,
            _ => Self::Rules,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // AI provider
    pub ai_provider: AiProviderKind,
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_timeout_seconds: u64,

    // Speech-to-text (optional; canned fallback when unset)
    pub stt_api_url: Option<String>,
    pub stt_api_key: Option<String>,

    // Enrichment rate ceiling, per client IP
    pub enrich_rate_limit_per_minute: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/0".to_string());
        let redis_cache_ttl_seconds = env::var("REDIS_CACHE_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300); // 5 minutes default

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // AI provider
        let ai_provider = AiProviderKind::from_str(
            &env::var("AI_PROVIDER").unwrap_or_else(|_| "rules".to_string()),
        );
        let llm_api_url =
            env::var("LLM_API_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let llm_api_key = match ai_provider {
            AiProviderKind::Llm => {
                env::var("LLM_API_KEY").context("LLM_API_KEY must be set when AI_PROVIDER=llm")?
            }
            AiProviderKind::Rules => env::var("LLM_API_KEY").unwrap_or_default(),
        };
        let llm_model = env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let llm_timeout_seconds = env::var("LLM_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        // Speech-to-text
        let stt_api_url = env::var("STT_API_URL").ok().filter(|s| !s.is_empty());
        let stt_api_key = env::var("STT_API_KEY").ok().filter(|s| !s.is_empty());

        let enrich_rate_limit_per_minute = env::var("ENRICH_RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            ai_provider,
            llm_api_url,
            llm_api_key,
            llm_model,
            llm_timeout_seconds,
            stt_api_url,
            stt_api_key,
            enrich_rate_limit_per_minute,
        })
    }
}
