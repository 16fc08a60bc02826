//! Exa semantic search client.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EXA_API_URL;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    search_type: &'a str,
    use_autoprompt: bool,
    num_results: usize,
    category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_published_date: Option<String>,
    contents: Contents<'a>,
}

#[derive(Debug, Serialize)]
struct Contents<'a> {
    text: TextOptions,
    highlights: HighlightOptions<'a>,
    summary: SummaryOptions<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextOptions {
    max_characters: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HighlightOptions<'a> {
    num_sentences: usize,
    highlights_per_url: usize,
    query: &'a str,
}

#[derive(Debug, Serialize)]
struct SummaryOptions<'a> {
    query: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(rename = "autopromptString")]
    pub autoprompt_string: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub url: String,
    pub title: String,
    pub score: f64,
    pub published_date: String,
    pub author: String,
    pub text: String,
    pub highlights: Vec<String>,
    pub summary: String,
}

pub struct ExaClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ExaClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: EXA_API_URL.to_string(),
            api_key,
        })
    }

    /// Neural news search over the trailing `days_back` window, returning
    /// text, highlights, and a generated summary per result.
    pub async fn search_news(
        &self,
        query: &str,
        num_results: usize,
        days_back: i64,
    ) -> Result<SearchResponse> {
        let start_date = (Utc::now() - chrono::Duration::days(days_back))
            .format("%Y-%m-%d")
            .to_string();

        let request = SearchRequest {
            query,
            search_type: "neural",
            use_autoprompt: true,
            num_results,
            category: "news",
            start_published_date: Some(start_date),
            contents: Contents {
                text: TextOptions { max_characters: 1500 },
                highlights: HighlightOptions {
                    num_sentences: 3,
                    highlights_per_url: 3,
                    query,
                },
                summary: SummaryOptions { query },
            },
        };

        debug!(query, num_results, "Exa search");

        let resp = self
            .http
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", &self.api_key)
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
        debug!(results = result.results.len(), "Exa search complete");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_wire_names() {
        let req = SearchRequest {
            query: "fed rate cut",
            search_type: "neural",
            use_autoprompt: true,
            num_results: 5,
            category: "news",
            start_published_date: Some("2026-07-26".to_string()),
            contents: Contents {
                text: TextOptions { max_characters: 1500 },
                highlights: HighlightOptions {
                    num_sentences: 3,
                    highlights_per_url: 3,
                    query: "fed rate cut",
                },
                summary: SummaryOptions { query: "fed rate cut" },
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "neural");
        assert_eq!(json["numResults"], 5);
        assert_eq!(json["startPublishedDate"], "2026-07-26");
        assert_eq!(json["contents"]["highlights"]["highlightsPerUrl"], 3);
        assert_eq!(json["contents"]["text"]["maxCharacters"], 1500);
    }

    #[test]
    fn response_tolerates_sparse_results() {
        let resp: SearchResponse = serde_json::from_str(
            r#"{"results": [{"url": "https://example.com", "title": "T", "highlights": ["a"]}]}"#,
        )
        .unwrap();
        assert_eq!(resp.results[0].highlights.len(), 1);
        assert!(resp.results[0].summary.is_empty());
    }
}
