//! OpenAI-compatible chat-completions client used for article generation.
//!
//! Every generation request runs in strict JSON mode: the request carries a
//! `json_object` response-format constraint and the response body is parsed
//! exactly once. Anything unparseable fails the call; there is no lenient
//! repair.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::article::{Sentiment, Significance};
use crate::config::LLM_DEFAULT_ENDPOINT;
use crate::error::{AppError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: LLM_DEFAULT_ENDPOINT.to_string(),
            model: "qwen-plus".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Choice {
    message: ResponseMessage,
    finish_reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
}

/// One chat call's inputs.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_mode: bool,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub finish_reason: String,
    pub total_tokens: i64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let mut messages = Vec::new();
        if !req.system_prompt.is_empty() {
            messages.push(Message { role: "system", content: &req.system_prompt });
        }
        messages.push(Message { role: "user", content: &req.user_prompt });

        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: req.temperature,
            max_tokens: (req.max_tokens > 0).then_some(req.max_tokens),
            response_format: req
                .json_mode
                .then_some(ResponseFormat { format_type: "json_object" }),
        };

        debug!(
            model = %self.config.model,
            json_mode = req.json_mode,
            "Sending chat request"
        );

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = resp.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LlmResponseMalformed("no choices in response".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content,
            finish_reason: choice.finish_reason,
            total_tokens: completion.usage.total_tokens,
        })
    }

    /// JSON-mode chat whose response must deserialize into `T`. Fails
    /// closed on the first malformed byte; no article is written from a
    /// response that does not match the schema.
    pub async fn chat_json<T: DeserializeOwned>(&self, mut req: ChatRequest) -> Result<T> {
        req.json_mode = true;
        let resp = self.chat(&req).await?;
        parse_json_response(&resp.content)
    }

    /// Wire-service narrative for a single market signal.
    pub async fn generate_narrative(&self, signal: &SignalData) -> Result<Narrative> {
        self.chat_json(ChatRequest {
            system_prompt: NARRATIVE_SYSTEM_PROMPT.to_string(),
            user_prompt: narrative_user_prompt(signal),
            temperature: 0.4,
            max_tokens: 1200,
            json_mode: true,
        })
        .await
    }
}

pub(crate) fn parse_json_response<T: DeserializeOwned>(content: &str) -> Result<T> {
    serde_json::from_str(content).map_err(|e| AppError::LlmResponseMalformed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Narrative generation
// ---------------------------------------------------------------------------

/// Market data embedded into a narrative prompt.
#[derive(Debug, Clone, Default)]
pub struct SignalData {
    pub market_title: String,
    pub event_title: String,
    pub category: String,
    pub previous_prob: f64,
    pub current_prob: f64,
    pub time_frame: String,
    pub volume_24h: f64,
    pub total_volume: f64,
    pub external_context: String,
    pub social_signals_context: String,
}

/// Fixed output schema for breaking narratives. Parsing is the contract:
/// a response missing any field fails the generate call.
#[derive(Debug, Clone, Deserialize)]
pub struct Narrative {
    pub headline: String,
    pub subheadline: String,
    pub what_changed: String,
    pub why_it_matters: String,
    pub market_context: String,
    pub what_to_watch: String,
    pub tags: Vec<String>,
    pub sentiment: Sentiment,
    pub significance: Significance,
}

const NARRATIVE_SYSTEM_PROMPT: &str = "\
You are a senior financial journalist at a major news wire service.

EDITORIAL STANDARDS:
1. ACCURACY FIRST: Every fact must be precise. Use exact numbers, not approximations.
2. INTEGRATE DATA: Weave statistics into prose naturally.
3. EXPLAIN THE STAKES: Always answer 'so what?' for sophisticated readers.
4. SHORT & DIRECT: Prefer short sentences. One idea per sentence.
5. SPECIFIC OVER VAGUE: Name names, cite figures, be concrete.
6. FORWARD-LOOKING: What happens next? What are the implications?

VOICE: authoritative, objective, professional wire-service tone. No financial advice.

Respond ONLY with valid JSON.";

fn narrative_user_prompt(signal: &SignalData) -> String {
    let change = signal.current_prob - signal.previous_prob;
    let verb = movement_verb(change);
    let context = if signal.external_context.is_empty() {
        "No additional context available. Focus on the market data and its implications."
    } else {
        &signal.external_context
    };

    let social_section = if signal.social_signals_context.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nSocial Signals (Tracked Influencer Posts):\n{}\n",
            signal.social_signals_context
        )
    };

    format!(
        "Generate a wire-service news article for this prediction market signal.\n\
         \n\
         MARKET DATA\n\
         Question: {}\n\
         Event: {}\n\
         Category: {}\n\
         \n\
         Price Movement:\n\
         - Previous: {:.1}% -> Current: {:.1}% ({} {:+.1} points)\n\
         - 24h Volume: ${}\n\
         - Total Volume: ${}\n\
         - Timeframe: {}\n\
         \n\
         External Context:\n\
         {}{}\n\
         \n\
         Generate JSON with this structure:\n\
         {{\n\
           \"headline\": \"Sharp, active-voice headline. Max 90 chars.\",\n\
           \"subheadline\": \"One sentence capturing the key takeaway with specific data.\",\n\
           \"what_changed\": \"The lead: 2-3 punchy sentences with exact figures, what happened and when.\",\n\
           \"why_it_matters\": \"The stakes: 2-3 sentences answering 'so what?'.\",\n\
           \"market_context\": \"Broader context: 2 sentences connecting to markets, policy, or industry.\",\n\
           \"what_to_watch\": \"Forward outlook: 2 sentences on catalysts, dates, and triggers.\",\n\
           \"tags\": [\"3-5 relevant tags\"],\n\
           \"sentiment\": \"bullish|bearish|neutral\",\n\
           \"significance\": \"low|medium|high|breaking\"\n\
         }}",
        signal.market_title,
        signal.event_title,
        signal.category,
        signal.previous_prob * 100.0,
        signal.current_prob * 100.0,
        verb,
        change * 100.0,
        format_volume(signal.volume_24h),
        format_volume(signal.total_volume),
        signal.time_frame,
        context,
        social_section,
    )
}

/// Movement verb keyed to the magnitude and sign of the change.
fn movement_verb(change: f64) -> &'static str {
    if change > 0.10 {
        "surged"
    } else if change > 0.05 {
        "jumped"
    } else if change > 0.02 {
        "rose"
    } else if change < -0.10 {
        "plunged"
    } else if change < -0.05 {
        "tumbled"
    } else if change < -0.02 {
        "fell"
    } else if change > 0.0 {
        "edged higher"
    } else if change < 0.0 {
        "slipped"
    } else {
        "moved"
    }
}

pub(crate) fn format_volume(v: f64) -> String {
    if v >= 1_000_000.0 {
        format!("{:.1}M", v / 1_000_000.0)
    } else if v >= 1_000.0 {
        format!("{:.1}K", v / 1_000.0)
    } else {
        format!("{v:.0}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_verb_tracks_magnitude_and_sign() {
        assert_eq!(movement_verb(0.15), "surged");
        assert_eq!(movement_verb(0.08), "jumped");
        assert_eq!(movement_verb(0.03), "rose");
        assert_eq!(movement_verb(0.01), "edged higher");
        assert_eq!(movement_verb(-0.15), "plunged");
        assert_eq!(movement_verb(-0.08), "tumbled");
        assert_eq!(movement_verb(-0.03), "fell");
        assert_eq!(movement_verb(-0.01), "slipped");
        assert_eq!(movement_verb(0.0), "moved");
    }

    #[test]
    fn volume_formats_with_suffixes() {
        assert_eq!(format_volume(2_500_000.0), "2.5M");
        assert_eq!(format_volume(60_000.0), "60.0K");
        assert_eq!(format_volume(850.0), "850");
    }

    #[test]
    fn narrative_parses_from_schema_compliant_json() {
        let raw = r#"{
            "headline": "Bitcoin Odds Surge Past 70%",
            "subheadline": "Markets price in a 15-point swing",
            "what_changed": "The market jumped.",
            "why_it_matters": "Stakes are high.",
            "market_context": "Crypto is moving.",
            "what_to_watch": "Watch the ETF flows.",
            "tags": ["bitcoin", "crypto"],
            "sentiment": "bullish",
            "significance": "high"
        }"#;
        let n: Narrative = parse_json_response(raw).unwrap();
        assert_eq!(n.headline, "Bitcoin Odds Surge Past 70%");
        assert_eq!(n.sentiment, Sentiment::Bullish);
        assert_eq!(n.significance, Significance::High);
    }

    #[test]
    fn malformed_response_is_a_typed_error() {
        let err = parse_json_response::<Narrative>("oops").unwrap_err();
        assert!(matches!(err, AppError::LlmResponseMalformed(_)));

        // Valid JSON missing required fields also fails closed.
        let err = parse_json_response::<Narrative>(r#"{"headline": "only"}"#).unwrap_err();
        assert!(matches!(err, AppError::LlmResponseMalformed(_)));

        // Out-of-enum sentiment fails closed.
        let raw = r#"{
            "headline": "h", "subheadline": "s", "what_changed": "w",
            "why_it_matters": "w", "market_context": "m", "what_to_watch": "w",
            "tags": [], "sentiment": "sideways", "significance": "high"
        }"#;
        let err = parse_json_response::<Narrative>(raw).unwrap_err();
        assert!(matches!(err, AppError::LlmResponseMalformed(_)));
    }

    #[test]
    fn prompt_embeds_exact_figures_and_units() {
        let prompt = narrative_user_prompt(&SignalData {
            market_title: "Will BTC hit 100k?".to_string(),
            event_title: "Bitcoin 2026".to_string(),
            category: "crypto".to_string(),
            previous_prob: 0.42,
            current_prob: 0.50,
            time_frame: "24h".to_string(),
            volume_24h: 60_000.0,
            total_volume: 2_500_000.0,
            ..Default::default()
        });
        assert!(prompt.contains("Previous: 42.0% -> Current: 50.0%"));
        assert!(prompt.contains("jumped +8.0 points"));
        assert!(prompt.contains("24h Volume: $60.0K"));
        assert!(prompt.contains("Total Volume: $2.5M"));
        assert!(prompt.contains("No additional context available"));
        assert!(!prompt.contains("Social Signals"));
    }
}
