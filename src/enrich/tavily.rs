//! Tavily news search client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TAVILY_API_URL;
use crate::error::{AppError, Result};

/// Reputable wire-service domains the news search is restricted to.
const NEWS_DOMAINS: &[&str] = &[
    "reuters.com",
    "bloomberg.com",
    "cnbc.com",
    "wsj.com",
    "ft.com",
    "bbc.com",
    "cnn.com",
    "apnews.com",
];

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    topic: &'a str,
    max_results: usize,
    include_answer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    include_domains: Option<&'a [&'a str]>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub query: String,
    pub answer: String,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: f64,
    #[serde(rename = "published_date")]
    pub published: String,
}

pub struct TavilyClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TavilyClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: TAVILY_API_URL.to_string(),
            api_key,
        })
    }

    /// News-focused search restricted to the wire-service allow-list.
    pub async fn search_news(&self, query: &str, max_results: usize) -> Result<SearchResponse> {
        let request = SearchRequest {
            api_key: &self.api_key,
            query,
            search_depth: "advanced",
            topic: "news",
            max_results,
            include_answer: true,
            include_domains: Some(NEWS_DOMAINS),
        };

        debug!(query, max_results, "Tavily search");

        let resp = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&request)
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

        let result: SearchResponse = resp.json().await?;
        debug!(
            results = result.results.len(),
            has_answer = !result.answer.is_empty(),
            "Tavily search complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_serializes_domains_only_when_present() {
        let req = SearchRequest {
            api_key: "k",
            query: "bitcoin etf",
            search_depth: "advanced",
            topic: "news",
            max_results: 5,
            include_answer: true,
            include_domains: Some(NEWS_DOMAINS),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["topic"], "news");
        assert_eq!(json["include_domains"].as_array().unwrap().len(), 8);

        let req = SearchRequest { include_domains: None, ..req };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("include_domains").is_none());
    }

    #[test]
    fn search_response_tolerates_missing_fields() {
        let resp: SearchResponse = serde_json::from_str(
            r#"{"results": [{"title": "T", "url": "https://reuters.com/x", "content": "c", "score": 0.9}]}"#,
        )
        .unwrap();
        assert_eq!(resp.results.len(), 1);
        assert!(resp.results[0].published.is_empty());
        assert!(resp.answer.is_empty());
    }
}
