//! Client for Polymarket's public read APIs (Gamma + Data).
//!
//! Gamma encodes some nested arrays as JSON strings inside JSON
//! (`outcomes`, `outcomePrices`, `clobTokenIds`); [`JsonStringArray`]
//! normalizes both encodings so callers always see a real list.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::config::{DATA_API_URL, GAMMA_API_URL};
use crate::error::{AppError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// A list that may arrive either as a JSON array or as a JSON-encoded string
/// containing an array.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JsonStringArray(pub Vec<String>);

impl<'de> Deserialize<'de> for JsonStringArray {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(JsonStringArray(Vec::new())),
            serde_json::Value::Array(items) => {
                let strings = items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                Ok(JsonStringArray(strings))
            }
            serde_json::Value::String(s) if s.is_empty() => Ok(JsonStringArray(Vec::new())),
            serde_json::Value::String(s) => serde_json::from_str::<Vec<String>>(&s)
                .map(JsonStringArray)
                .map_err(serde::de::Error::custom),
            other => Err(serde::de::Error::custom(format!(
                "expected array or JSON-encoded string array, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GammaMarket {
    pub id: String,
    pub question: String,
    pub condition_id: String,
    pub slug: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
    pub outcomes: JsonStringArray,
    pub outcome_prices: JsonStringArray,
    pub clob_token_ids: JsonStringArray,
    pub image: String,
    pub icon: String,
    pub volume: String,
    pub volume24hr: f64,
    pub volume1wk: f64,
    pub volume1hr: f64,
    pub volume_num: f64,
    pub liquidity_num: f64,
    pub last_trade_price: f64,
    pub one_day_price_change: f64,
    pub one_week_price_change: f64,
    pub active: bool,
    pub closed: bool,
    pub accepting_orders: bool,
    pub group_item_title: String,
    pub resolution_source: String,
    pub competitor_count: i64,
}

impl GammaMarket {
    /// Outcome prices parsed string -> float. A price that fails to parse
    /// drops that outcome; the call itself never fails on it.
    pub fn outcome_prices_f64(&self) -> Vec<f64> {
        self.outcome_prices
            .0
            .iter()
            .filter_map(|p| p.parse::<f64>().ok())
            .collect()
    }

    /// The yes-outcome price, interpreted as P(Yes).
    pub fn yes_price(&self) -> f64 {
        self.outcome_prices_f64().first().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GammaEvent {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub start_date: String,
    pub end_date: String,
    pub image: String,
    pub icon: String,
    pub active: bool,
    pub closed: bool,
    pub archived: bool,
    pub liquidity: f64,
    pub volume: f64,
    pub volume24hr: f64,
    pub markets: Vec<GammaMarket>,
    pub competitor_count: i64,
    pub comment_count: i64,
    pub series_slug: String,
    pub tags: Vec<GammaTag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GammaTag {
    pub id: String,
    pub label: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Trade {
    pub id: String,
    #[serde(rename = "taker_order_id")]
    pub taker_order_id: String,
    #[serde(rename = "market")]
    pub market_id: String,
    #[serde(rename = "asset_id")]
    pub asset_id: String,
    pub side: String,
    pub size: String,
    pub price: String,
    pub outcome: String,
    pub timestamp: i64,
    #[serde(rename = "transaction_hash")]
    pub transaction_id: String,
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct EventFilters {
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub archived: Option<bool>,
    pub limit: usize,
    pub offset: usize,
    pub order: String,
    pub ascending: bool,
    pub tag_slug: String,
    pub query: String,
}

#[derive(Debug, Clone, Default)]
pub struct MarketFilters {
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub limit: usize,
    pub offset: usize,
    pub order: String,
    pub ascending: bool,
    pub tag_slug: String,
    pub query: String,
}

impl EventFilters {
    fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(active) = self.active {
            params.push(("active", active.to_string()));
        }
        if let Some(closed) = self.closed {
            params.push(("closed", closed.to_string()));
        }
        if let Some(archived) = self.archived {
            params.push(("archived", archived.to_string()));
        }
        if self.limit > 0 {
            params.push(("limit", self.limit.to_string()));
        }
        if self.offset > 0 {
            params.push(("offset", self.offset.to_string()));
        }
        if !self.order.is_empty() {
            params.push(("order", self.order.clone()));
            // Gamma defaults to ascending=true; always pin it when ordering.
            params.push(("ascending", self.ascending.to_string()));
        }
        if !self.tag_slug.is_empty() {
            params.push(("tag_slug", self.tag_slug.clone()));
        }
        if !self.query.is_empty() {
            params.push(("_q", self.query.clone()));
        }
        params
    }
}

impl MarketFilters {
    fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(active) = self.active {
            params.push(("active", active.to_string()));
        }
        if let Some(closed) = self.closed {
            params.push(("closed", closed.to_string()));
        }
        if self.limit > 0 {
            params.push(("limit", self.limit.to_string()));
        }
        if self.offset > 0 {
            params.push(("offset", self.offset.to_string()));
        }
        if !self.order.is_empty() {
            params.push(("order", self.order.clone()));
            params.push(("ascending", self.ascending.to_string()));
        }
        if !self.tag_slug.is_empty() {
            params.push(("tag_slug", self.tag_slug.clone()));
        }
        if !self.query.is_empty() {
            params.push(("_q", self.query.clone()));
        }
        params
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Stateless client for the Gamma (events/markets) and Data (trades) APIs.
/// Transport errors retry with linear backoff; non-2xx fails with the
/// upstream status and body.
pub struct PolymarketClient {
    http: reqwest::Client,
    gamma_base: String,
    data_base: String,
}

impl PolymarketClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            gamma_base: GAMMA_API_URL.to_string(),
            data_base: DATA_API_URL.to_string(),
        })
    }

    pub fn with_base_urls(gamma_base: String, data_base: String) -> Result<Self> {
        let mut client = Self::new()?;
        client.gamma_base = gamma_base;
        client.data_base = data_base;
        Ok(client)
    }

    pub async fn get_events(&self, filters: &EventFilters) -> Result<Vec<GammaEvent>> {
        let url = format!("{}/events", self.gamma_base);
        let events: Vec<GammaEvent> = self.get_json(&url, &filters.query_params()).await?;
        debug!(count = events.len(), "Fetched events from Gamma");
        Ok(events)
    }

    pub async fn get_event_by_slug(&self, slug: &str) -> Result<GammaEvent> {
        let url = format!("{}/events/slug/{slug}", self.gamma_base);
        self.get_json(&url, &[]).await
    }

    pub async fn get_markets(&self, filters: &MarketFilters) -> Result<Vec<GammaMarket>> {
        let url = format!("{}/markets", self.gamma_base);
        let markets: Vec<GammaMarket> = self.get_json(&url, &filters.query_params()).await?;
        debug!(count = markets.len(), "Fetched markets from Gamma");
        Ok(markets)
    }

    pub async fn get_market(&self, market_id: &str) -> Result<GammaMarket> {
        let url = format!("{}/markets/{market_id}", self.gamma_base);
        self.get_json(&url, &[]).await
    }

    pub async fn get_trades(&self, market_id: &str, limit: usize) -> Result<Vec<Trade>> {
        let url = format!("{}/trades", self.data_base);
        let mut params = vec![("market", market_id.to_string())];
        if limit > 0 {
            params.push(("limit", limit.to_string()));
        }
        self.get_json(&url, &params).await
    }

    /// Top events by 24h volume. The sync pass runs on events, not markets,
    /// because market URLs need the parent event slug.
    pub async fn top_events_by_volume(&self, limit: usize) -> Result<Vec<GammaEvent>> {
        self.get_events(&EventFilters {
            active: Some(true),
            closed: Some(false),
            limit,
            order: "volume24hr".to_string(),
            ascending: false,
            ..Default::default()
        })
        .await
    }

    pub async fn top_markets_by_volume(&self, limit: usize) -> Result<Vec<GammaMarket>> {
        self.get_markets(&MarketFilters {
            active: Some(true),
            closed: Some(false),
            limit,
            order: "volume24hr".to_string(),
            ascending: false,
            ..Default::default()
        })
        .await
    }

    pub async fn search_markets(&self, query: &str, limit: usize) -> Result<Vec<GammaMarket>> {
        self.get_markets(&MarketFilters {
            query: query.to_string(),
            limit,
            ..Default::default()
        })
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let mut last_err: Option<reqwest::Error> = None;

        for attempt in 1..=RETRY_ATTEMPTS {
            let request = self.http.get(url).query(params);
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(AppError::Api {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    return resp.json::<T>().await.map_err(AppError::from);
                }
                Err(e) => {
                    debug!(url, attempt, "request failed: {e}");
                    last_err = Some(e);
                    if attempt < RETRY_ATTEMPTS {
                        tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                    }
                }
            }
        }

        Err(AppError::Http(last_err.expect("at least one attempt")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_array_decodes_plain_array() {
        let arr: JsonStringArray = serde_json::from_str(r#"["Yes", "No"]"#).unwrap();
        assert_eq!(arr.0, vec!["Yes", "No"]);
    }

    #[test]
    fn string_array_decodes_encoded_string() {
        let arr: JsonStringArray =
            serde_json::from_str(r#""[\"0.42\", \"0.58\"]""#).unwrap();
        assert_eq!(arr.0, vec!["0.42", "0.58"]);
    }

    #[test]
    fn string_array_treats_empty_string_as_empty() {
        let arr: JsonStringArray = serde_json::from_str(r#""""#).unwrap();
        assert!(arr.0.is_empty());
        let arr: JsonStringArray = serde_json::from_str("null").unwrap();
        assert!(arr.0.is_empty());
    }

    #[test]
    fn market_decodes_with_string_encoded_prices() {
        let raw = r#"{
            "id": "m1",
            "question": "Will it happen?",
            "conditionId": "0xabc",
            "slug": "will-it-happen",
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0.42\", \"0.58\"]",
            "volume24hr": 60000.0,
            "active": true,
            "closed": false
        }"#;
        let m: GammaMarket = serde_json::from_str(raw).unwrap();
        assert_eq!(m.outcomes.0, vec!["Yes", "No"]);
        assert_eq!(m.outcome_prices_f64(), vec![0.42, 0.58]);
        assert_eq!(m.yes_price(), 0.42);
    }

    #[test]
    fn unparseable_price_drops_that_outcome_only() {
        let m = GammaMarket {
            outcome_prices: JsonStringArray(vec![
                "0.42".to_string(),
                "garbage".to_string(),
                "0.58".to_string(),
            ]),
            ..Default::default()
        };
        assert_eq!(m.outcome_prices_f64(), vec![0.42, 0.58]);
    }

    #[test]
    fn event_decodes_with_missing_fields() {
        let raw = r#"{"id": "e1", "title": "Election 2028", "slug": "election-2028"}"#;
        let e: GammaEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(e.slug, "election-2028");
        assert!(e.markets.is_empty());
        assert!(e.tags.is_empty());
    }

    #[test]
    fn event_filters_pin_ascending_when_ordered() {
        let filters = EventFilters {
            active: Some(true),
            closed: Some(false),
            limit: 100,
            order: "volume24hr".to_string(),
            ascending: false,
            ..Default::default()
        };
        let params = filters.query_params();
        assert!(params.contains(&("order", "volume24hr".to_string())));
        assert!(params.contains(&("ascending", "false".to_string())));
        assert!(params.contains(&("active", "true".to_string())));

        // No order -> no ascending param at all.
        let params = EventFilters::default().query_params();
        assert!(!params.iter().any(|(k, _)| *k == "ascending"));
    }
}
