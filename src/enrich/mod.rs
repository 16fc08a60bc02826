//! Multi-source context enrichment feeding article generation.
//!
//! News search and semantic search run concurrently; deep scraping runs
//! after, over the top news URLs. Any provider can be disabled by omitting
//! its API key, and an individual provider failure is warned and elided:
//! the caller always gets whatever context the remaining sources produced.

mod exa;
mod firecrawl;
mod tavily;

pub use exa::ExaClient;
pub use firecrawl::FirecrawlClient;
pub use tavily::TavilyClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Deep-scraped markdown is truncated to this many chars per page before it
/// reaches a prompt.
const MAX_DEEP_MARKDOWN_CHARS: usize = 3000;

#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub tavily_api_key: String,
    pub exa_api_key: String,
    pub firecrawl_api_key: String,
    pub max_news_results: usize,
    pub max_deep_scrapes: usize,
    /// Trailing publish-date window for semantic search, in days.
    pub semantic_days_back: i64,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: String::new(),
            exa_api_key: String::new(),
            firecrawl_api_key: String::new(),
            max_news_results: 5,
            max_deep_scrapes: 2,
            semantic_days_back: 7,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    pub content: String,
    pub published: String,
    pub source: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticResult {
    pub title: String,
    pub url: String,
    pub text: String,
    pub highlights: Vec<String>,
    pub summary: String,
    pub published: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepContent {
    pub title: String,
    pub url: String,
    pub markdown: String,
    pub description: String,
}

/// Combined context from all enabled sources, with a pre-formatted plain
/// text `summary` ready for LLM consumption.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichedContext {
    pub news_articles: Vec<NewsArticle>,
    pub semantic_results: Vec<SemanticResult>,
    pub deep_content: Vec<DeepContent>,
    pub summary: String,
    pub enriched_at: Option<DateTime<Utc>>,
    /// Providers that actually contributed, e.g. ["tavily", "exa"].
    pub sources: Vec<String>,
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

pub struct Enricher {
    tavily: Option<TavilyClient>,
    exa: Option<ExaClient>,
    firecrawl: Option<FirecrawlClient>,
    config: EnricherConfig,
}

impl Enricher {
    pub fn new(config: EnricherConfig) -> Result<Self> {
        let tavily = if config.tavily_api_key.is_empty() {
            None
        } else {
            info!("Tavily enrichment enabled");
            Some(TavilyClient::new(config.tavily_api_key.clone())?)
        };
        let exa = if config.exa_api_key.is_empty() {
            None
        } else {
            info!("Exa enrichment enabled");
            Some(ExaClient::new(config.exa_api_key.clone())?)
        };
        let firecrawl = if config.firecrawl_api_key.is_empty() {
            None
        } else {
            info!("Firecrawl enrichment enabled");
            Some(FirecrawlClient::new(config.firecrawl_api_key.clone())?)
        };

        Ok(Self { tavily, exa, firecrawl, config })
    }

    pub fn any_enabled(&self) -> bool {
        self.tavily.is_some() || self.exa.is_some() || self.firecrawl.is_some()
    }

    /// Gather context for one market question. Never fails the caller over
    /// a provider error; sources that fail are simply absent from the
    /// result.
    pub async fn enrich(&self, market_question: &str, category: &str) -> EnrichedContext {
        info!(market = market_question, category, "Starting enrichment");

        let mut result = EnrichedContext {
            enriched_at: Some(Utc::now()),
            ..Default::default()
        };

        let (news, semantic) = tokio::join!(
            self.fetch_news(market_question),
            self.fetch_semantic(market_question),
        );

        if let Some(articles) = news {
            result.news_articles = articles;
            result.sources.push("tavily".to_string());
        }
        if let Some(results) = semantic {
            result.semantic_results = results;
            result.sources.push("exa".to_string());
        }

        // Deep scrape only URLs the news search already surfaced.
        if let Some(firecrawl) = &self.firecrawl {
            if !result.news_articles.is_empty() {
                let urls: Vec<String> = result
                    .news_articles
                    .iter()
                    .take(self.config.max_deep_scrapes)
                    .map(|a| a.url.clone())
                    .collect();
                let scraped = firecrawl.scrape_multiple(&urls, self.config.max_deep_scrapes).await;
                if !scraped.is_empty() {
                    result.deep_content = scraped
                        .into_iter()
                        .map(|s| DeepContent {
                            title: s.metadata.title,
                            url: s.metadata.source_url,
                            markdown: truncate(&s.markdown, MAX_DEEP_MARKDOWN_CHARS),
                            description: s.metadata.description,
                        })
                        .collect();
                    result.sources.push("firecrawl".to_string());
                }
            }
        }

        result.summary = build_summary(&result, market_question);

        info!(
            news_articles = result.news_articles.len(),
            semantic_results = result.semantic_results.len(),
            deep_content = result.deep_content.len(),
            sources = ?result.sources,
            "Enrichment complete"
        );

        result
    }

    async fn fetch_news(&self, query: &str) -> Option<Vec<NewsArticle>> {
        let tavily = self.tavily.as_ref()?;
        match tavily.search_news(query, self.config.max_news_results).await {
            Ok(resp) => Some(
                resp.results
                    .into_iter()
                    .map(|r| NewsArticle {
                        source: extract_domain(&r.url),
                        title: r.title,
                        url: r.url,
                        content: r.content,
                        published: r.published,
                        relevance: r.score,
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!("Tavily enrichment failed: {e}");
                None
            }
        }
    }

    async fn fetch_semantic(&self, query: &str) -> Option<Vec<SemanticResult>> {
        let exa = self.exa.as_ref()?;
        match exa
            .search_news(query, self.config.max_news_results, self.config.semantic_days_back)
            .await
        {
            Ok(resp) => Some(
                resp.results
                    .into_iter()
                    .map(|r| SemanticResult {
                        title: r.title,
                        url: r.url,
                        text: r.text,
                        highlights: r.highlights,
                        summary: r.summary,
                        published: r.published_date,
                        score: r.score,
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!("Exa enrichment failed: {e}");
                None
            }
        }
    }
}

/// Section-formatted plain text for the LLM: numbered entries under per-source
/// headers, excerpts bounded so one noisy page cannot flood a prompt.
fn build_summary(ctx: &EnrichedContext, query: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== CONTEXT FOR: {query} ===\n\n"));

    if !ctx.news_articles.is_empty() {
        out.push_str("## Recent News:\n");
        for (i, article) in ctx.news_articles.iter().enumerate() {
            out.push_str(&format!("{}. **{}** ({})\n", i + 1, article.title, article.source));
            if !article.content.is_empty() {
                out.push_str(&format!("   {}\n", truncate(&article.content, 300)));
            }
            out.push('\n');
        }
    }

    if !ctx.semantic_results.is_empty() {
        out.push_str("\n## Related Analysis:\n");
        for (i, result) in ctx.semantic_results.iter().enumerate() {
            out.push_str(&format!("{}. **{}**\n", i + 1, result.title));
            if !result.summary.is_empty() {
                out.push_str(&format!("   Summary: {}\n", result.summary));
            }
            if !result.highlights.is_empty() {
                out.push_str("   Key Points:\n");
                for h in result.highlights.iter().take(3) {
                    out.push_str(&format!("   - {h}\n"));
                }
            }
            out.push('\n');
        }
    }

    if !ctx.deep_content.is_empty() {
        out.push_str("\n## Detailed Sources:\n");
        for (i, content) in ctx.deep_content.iter().enumerate() {
            out.push_str(&format!("{}. **{}**\n", i + 1, content.title));
            if !content.description.is_empty() {
                out.push_str(&format!("   {}\n", content.description));
            }
            if !content.markdown.is_empty() {
                out.push_str(&format!(
                    "\n   --- Excerpt ---\n   {}\n   ---\n\n",
                    truncate(&content.markdown, 1000)
                ));
            }
        }
    }

    out
}

fn extract_domain(url: &str) -> String {
    let stripped = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.");
    stripped.split('/').next().unwrap_or(stripped).to_string()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut cut = max_len;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_providers_produce_empty_context() {
        let enricher = Enricher::new(EnricherConfig::default()).unwrap();
        assert!(!enricher.any_enabled());
    }

    #[tokio::test]
    async fn enrich_with_nothing_enabled_succeeds_with_no_sources() {
        let enricher = Enricher::new(EnricherConfig::default()).unwrap();
        let ctx = enricher.enrich("Will the Fed cut rates?", "economy").await;
        assert!(ctx.sources.is_empty());
        assert!(ctx.news_articles.is_empty());
        assert!(ctx.summary.contains("Will the Fed cut rates?"));
    }

    #[test]
    fn only_configured_providers_are_constructed() {
        let enricher = Enricher::new(EnricherConfig {
            tavily_api_key: "tvly-key".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(enricher.tavily.is_some());
        assert!(enricher.exa.is_none());
        assert!(enricher.firecrawl.is_none());
    }

    #[test]
    fn summary_sections_appear_only_for_present_sources() {
        let ctx = EnrichedContext {
            news_articles: vec![NewsArticle {
                title: "Fed signals cut".to_string(),
                url: "https://reuters.com/a".to_string(),
                content: "x".repeat(400),
                source: "reuters.com".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let summary = build_summary(&ctx, "fed");

        assert!(summary.contains("## Recent News:"));
        assert!(summary.contains("1. **Fed signals cut** (reuters.com)"));
        assert!(!summary.contains("## Related Analysis:"));
        assert!(!summary.contains("## Detailed Sources:"));
        // 400-char content is excerpted down to 300 + ellipsis.
        assert!(summary.contains(&format!("{}...", "x".repeat(300))));
    }

    #[test]
    fn summary_caps_highlights_at_three() {
        let ctx = EnrichedContext {
            semantic_results: vec![SemanticResult {
                title: "Analysis".to_string(),
                highlights: (0..5).map(|i| format!("point {i}")).collect(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let summary = build_summary(&ctx, "q");
        assert!(summary.contains("point 2"));
        assert!(!summary.contains("point 3"));
    }

    #[test]
    fn domain_extraction_strips_scheme_and_www() {
        assert_eq!(extract_domain("https://www.reuters.com/markets/x"), "reuters.com");
        assert_eq!(extract_domain("http://bbc.com"), "bbc.com");
        assert_eq!(extract_domain("apnews.com/article/1"), "apnews.com");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate(s, 6);
        assert!(t.ends_with("..."));
        assert!(t.len() <= 9);
    }
}
