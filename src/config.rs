use std::time::Duration;

use crate::error::{AppError, Result};

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";
pub const DATA_API_URL: &str = "https://data-api.polymarket.com";
pub const TAVILY_API_URL: &str = "https://api.tavily.com";
pub const EXA_API_URL: &str = "https://api.exa.ai";
pub const FIRECRAWL_API_URL: &str = "https://api.firecrawl.dev/v1";
pub const XTRACKER_API_URL: &str = "https://xtracker.polymarket.com/api";
pub const LLM_DEFAULT_ENDPOINT: &str = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1";

/// Producer-side event queue capacity. Emission is try_send; a full queue
/// drops the event rather than stalling the sync pass.
pub const EVENT_QUEUE_CAPACITY: usize = 1000;

/// Per-subscriber channel capacity. A slow subscriber loses events.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;

/// How often the snapshot cleanup loop runs (seconds).
pub const CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Per-job execution deadline for scheduled jobs.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Page size for the event fetch each sync pass.
pub const SYNC_EVENT_PAGE: usize = 100;

/// New markets below this 24h volume never produce a new-market article.
pub const NEW_MARKET_ARTICLE_MIN_VOLUME: f64 = 50_000.0;

#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI-compatible chat endpoint credentials (DASHSCOPE_API_KEY).
    /// Empty = no LLM; briefing-style articles fall back to templated copy.
    pub llm_api_key: String,
    pub llm_endpoint: String,
    pub llm_model: String,

    /// Enrichment provider keys. An empty key disables that provider.
    pub tavily_api_key: String,
    pub exa_api_key: String,
    pub firecrawl_api_key: String,
    pub enable_enrichment: bool,

    /// Social signal tracker base URL (XTRACKER_BASE_URL).
    pub xtracker_base_url: String,

    pub database_path: String,

    /// Price delta that qualifies as a breaking move (MIN_PROBABILITY_CHANGE).
    pub min_probability_change: f64,
    /// Markets below this 24h volume are skipped entirely (MIN_VOLUME_24H).
    pub min_volume_24h: f64,
    /// Sync loop interval in seconds (POLL_INTERVAL_SECS).
    pub poll_interval: Duration,

    pub http_addr: String,
    pub log_level: String,
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let poll_secs = env_or("POLL_INTERVAL_SECS", "30")
            .parse::<u64>()
            .map_err(|_| AppError::Config("POLL_INTERVAL_SECS must be an integer".to_string()))?;
        if poll_secs == 0 {
            return Err(AppError::Config("POLL_INTERVAL_SECS must be positive".to_string()));
        }

        Ok(Self {
            llm_api_key: env_or("DASHSCOPE_API_KEY", ""),
            llm_endpoint: env_or("DASHSCOPE_ENDPOINT", LLM_DEFAULT_ENDPOINT),
            llm_model: env_or("QWEN_MODEL", "qwen-plus"),
            tavily_api_key: env_or("TAVILY_API_KEY", ""),
            exa_api_key: env_or("EXA_API_KEY", ""),
            firecrawl_api_key: env_or("FIRECRAWL_API_KEY", ""),
            enable_enrichment: env_or("ENABLE_ENRICHMENT", "true")
                .parse::<bool>()
                .unwrap_or(true),
            xtracker_base_url: env_or("XTRACKER_BASE_URL", XTRACKER_API_URL),
            database_path: env_or("DATABASE_PATH", "marketwire.db"),
            min_probability_change: env_or("MIN_PROBABILITY_CHANGE", "0.07")
                .parse::<f64>()
                .unwrap_or(0.07),
            min_volume_24h: env_or("MIN_VOLUME_24H", "50000")
                .parse::<f64>()
                .unwrap_or(50_000.0),
            poll_interval: Duration::from_secs(poll_secs),
            http_addr: env_or("HTTP_ADDR", "0.0.0.0:8080"),
            log_level: env_or("LOG_LEVEL", "info"),
            debug: env_or("DEBUG", "false").parse::<bool>().unwrap_or(false),
        })
    }

    pub fn llm_configured(&self) -> bool {
        !self.llm_api_key.is_empty()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
