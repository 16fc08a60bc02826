//! Firecrawl deep-scrape client. Produces Markdown for LLM consumption.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FIRECRAWL_API_URL;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: &'a [&'a str],
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScrapeResponse {
    success: bool,
    data: Option<ScrapeData>,
    error: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrapeData {
    pub markdown: String,
    pub metadata: PageMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
}

pub struct FirecrawlClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FirecrawlClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: FIRECRAWL_API_URL.to_string(),
            api_key,
        })
    }

    pub async fn scrape(&self, url: &str) -> Result<ScrapeData> {
        debug!(url, "Firecrawl scrape");

        let resp = self
            .http
            .post(format!("{}/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&ScrapeRequest { url, formats: &["markdown"] })
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

        let result: ScrapeResponse = resp.json().await?;
        if !result.success {
            return Err(AppError::Enrichment(format!("firecrawl scrape failed: {}", result.error)));
        }

        let data = result
            .data
            .ok_or_else(|| AppError::Enrichment("firecrawl returned no data".to_string()))?;
        debug!(title = %data.metadata.title, markdown_len = data.markdown.len(), "Firecrawl scrape complete");
        Ok(data)
    }

    /// Scrape a bounded list of URLs sequentially. Individual failures are
    /// warned and skipped.
    pub async fn scrape_multiple(&self, urls: &[String], max: usize) -> Vec<ScrapeData> {
        let mut results = Vec::new();
        for url in urls.iter().take(max) {
            match self.scrape(url).await {
                Ok(data) => results.push(data),
                Err(e) => warn!(url = %url, "Failed to scrape URL: {e}"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_response_decodes_error_shape() {
        let resp: ScrapeResponse =
            serde_json::from_str(r#"{"success": false, "error": "blocked"}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error, "blocked");
        assert!(resp.data.is_none());
    }

    #[test]
    fn scrape_response_decodes_data_shape() {
        let raw = r##"{
            "success": true,
            "data": {
                "markdown": "# Title\nbody",
                "metadata": {"title": "Title", "sourceURL": "https://example.com/a"}
            }
        }"##;
        let resp: ScrapeResponse = serde_json::from_str(raw).unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.metadata.source_url, "https://example.com/a");
        assert!(data.markdown.starts_with("# Title"));
    }
}
