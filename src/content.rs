//! Article generation: collect inputs, enrich, prompt, validate, persist.
//!
//! Five flavors. Breaking and new-market react to bus events and pull in
//! enrichment plus social correlation; briefings, trending, and category
//! digests run on schedule over Store queries. Without an LLM the
//! briefing-style flavors fall back to templated copy; breaking does not.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::article::{
    Article, ArticleBody, ArticleType, BriefingType, MarketRef, Sentiment, Significance,
};
use crate::bus::MarketEvent;
use crate::enrich::Enricher;
use crate::error::{AppError, Result};
use crate::llm::{format_volume, ChatRequest, LlmClient, SignalData};
use crate::social::Correlator;
use crate::store::Store;
use crate::types::{sanitize_slug, Market};

/// Markets listed inside a prompt are capped so one briefing cannot blow the
/// token budget.
const PROMPT_MARKET_CAP: usize = 10;

pub struct ContentGenerator {
    store: Arc<Store>,
    llm: Option<Arc<LlmClient>>,
    enricher: Option<Arc<Enricher>>,
    correlator: Option<Arc<Correlator>>,
}

impl ContentGenerator {
    pub fn new(
        store: Arc<Store>,
        llm: Option<Arc<LlmClient>>,
        enricher: Option<Arc<Enricher>>,
        correlator: Option<Arc<Correlator>>,
    ) -> Self {
        Self { store, llm, enricher, correlator }
    }

    // -----------------------------------------------------------------------
    // Breaking
    // -----------------------------------------------------------------------

    /// Breaking article from a bus event. Requires the LLM; enrichment and
    /// social correlation degrade to nothing on failure.
    pub async fn generate_breaking(&self, event: &MarketEvent) -> Result<Article> {
        let market = &event.market;
        info!(market = %market.question, kind = event.kind.name(), "Generating breaking article");

        let llm = self.llm.as_ref().ok_or(AppError::LlmUnavailable)?;

        let (context, mut sources) = self.enrich_context(market).await;
        let signals = self.collect_signals(market).await;
        let social_context = signals
            .iter()
            .map(|s| format!("@{}: {}", s.handle, s.content))
            .collect::<Vec<_>>()
            .join("\n");

        let narrative = llm
            .generate_narrative(&SignalData {
                market_title: market.question.clone(),
                event_title: market.group_item_title.clone(),
                category: market.category.clone(),
                previous_prob: market.previous_prob,
                current_prob: market.probability,
                time_frame: "24h".to_string(),
                volume_24h: market.volume_24h,
                total_volume: market.total_volume,
                external_context: context,
                social_signals_context: social_context,
            })
            .await?;

        for sig in &signals {
            let when = sig
                .posted_at
                .map(|t| t.format("%b %-d").to_string())
                .unwrap_or_default();
            sources.push(format!("@{} ({})", sig.handle, when));
        }

        let article = Article {
            slug: timestamped_slug(&narrative.headline),
            article_type: ArticleType::Breaking,
            category: market.category.clone(),
            headline: narrative.headline.clone(),
            subheadline: narrative.subheadline.clone(),
            summary: narrative.subheadline.clone(),
            body: ArticleBody {
                what_happened: narrative.what_changed,
                why_it_matters: narrative.why_it_matters,
                context: vec![narrative.market_context],
                what_to_watch: narrative.what_to_watch,
                analysis: String::new(),
            },
            markets: vec![MarketRef::from_market(market)],
            primary_market: Some(MarketRef::from_market(market)),
            social_signals: signals,
            tags: narrative.tags,
            significance: narrative.significance,
            sentiment: narrative.sentiment,
            created_at: Utc::now(),
            published_at: None,
            updated_at: Utc::now(),
            meta_title: narrative.headline,
            meta_description: narrative.subheadline,
            views: 0,
            published: true,
            featured: false,
            enrichment_sources: sources,
        };

        self.store.save_article(&article).await?;
        info!(slug = %article.slug, headline = %article.headline, "Breaking article generated");
        Ok(article)
    }

    // -----------------------------------------------------------------------
    // Briefing
    // -----------------------------------------------------------------------

    pub async fn generate_briefing(&self, briefing_type: BriefingType) -> Result<Article> {
        let config = briefing_type.config();
        info!(kind = %briefing_type, title = config.title, "Generating briefing");

        let mut refs = Vec::new();
        for category in config.categories {
            match self.store.markets_by_category(category, config.markets_per_category as i64).await {
                Ok(markets) => refs.extend(markets.iter().map(MarketRef::from_market)),
                Err(e) => warn!(category, "Failed to get markets: {e}"),
            }
        }

        if refs.is_empty() {
            return Err(AppError::NotFound("no markets found for briefing".to_string()));
        }

        let content = self.briefing_content(briefing_type, &refs).await?;

        let now = Utc::now();
        let date_str = now.format("%B %-d, %Y").to_string();
        let article = Article {
            slug: format!("{briefing_type}-briefing-{}", now.format("%Y-%m-%d")),
            article_type: ArticleType::Briefing,
            category: "briefing".to_string(),
            headline: format!("{}: {date_str}", config.title),
            subheadline: content.summary.clone(),
            summary: content.summary.clone(),
            body: ArticleBody {
                what_happened: content.overview,
                why_it_matters: content.key_insights,
                context: content.highlights,
                what_to_watch: content.what_to_watch,
                analysis: String::new(),
            },
            markets: refs,
            primary_market: None,
            social_signals: Vec::new(),
            tags: vec![
                "briefing".to_string(),
                briefing_type.to_string(),
                "daily".to_string(),
                "markets".to_string(),
            ],
            significance: Significance::Medium,
            sentiment: Sentiment::Neutral,
            created_at: now,
            published_at: None,
            updated_at: now,
            meta_title: format!("{} - {date_str} | Marketwire", config.title),
            meta_description: content.summary,
            views: 0,
            published: true,
            featured: false,
            enrichment_sources: Vec::new(),
        };

        self.store.save_article(&article).await?;
        info!(slug = %article.slug, markets = article.markets.len(), "Briefing generated");
        Ok(article)
    }

    // -----------------------------------------------------------------------
    // Trending
    // -----------------------------------------------------------------------

    pub async fn generate_trending(&self, limit: i64) -> Result<Article> {
        info!(limit, "Generating trending article");

        let markets = self.store.trending_markets(limit).await?;
        if markets.is_empty() {
            return Err(AppError::NotFound("no trending markets found".to_string()));
        }
        let refs: Vec<MarketRef> = markets.iter().map(MarketRef::from_market).collect();

        let content = self.trending_content(&refs).await?;

        let now = Utc::now();
        let mut tags = vec!["trending".to_string(), "hot".to_string(), "markets".to_string()];
        tags.extend(content.tags);

        let article = Article {
            slug: format!("trending-markets-{}", now.format("%Y-%m-%d-%H%M")),
            article_type: ArticleType::Trending,
            category: "trending".to_string(),
            headline: content.headline.clone(),
            subheadline: content.summary.clone(),
            summary: content.summary.clone(),
            body: ArticleBody {
                what_happened: content.overview,
                why_it_matters: content.analysis,
                context: content.highlights,
                what_to_watch: content.what_to_watch,
                analysis: String::new(),
            },
            markets: refs,
            primary_market: None,
            social_signals: Vec::new(),
            tags,
            significance: Significance::Medium,
            sentiment: Sentiment::Neutral,
            created_at: now,
            published_at: None,
            updated_at: now,
            meta_title: format!("{} | Marketwire", content.headline),
            meta_description: content.summary,
            views: 0,
            published: true,
            featured: false,
            enrichment_sources: Vec::new(),
        };

        self.store.save_article(&article).await?;
        info!(slug = %article.slug, markets = article.markets.len(), "Trending article generated");
        Ok(article)
    }

    // -----------------------------------------------------------------------
    // New market
    // -----------------------------------------------------------------------

    pub async fn generate_new_market(&self, market: &Market) -> Result<Article> {
        info!(market = %market.question, "Generating new market article");

        let (context, mut sources) = self.enrich_context(market).await;
        let signals = self.collect_signals(market).await;
        for sig in &signals {
            let when = sig
                .posted_at
                .map(|t| t.format("%b %-d").to_string())
                .unwrap_or_default();
            sources.push(format!("@{} ({})", sig.handle, when));
        }

        let content = self.new_market_content(market, &context).await?;

        let now = Utc::now();
        let mut tags = vec!["new".to_string(), "market".to_string()];
        tags.extend(content.tags);

        let article = Article {
            slug: format!("new-market-{}-{}", market.slug, now.format("%Y%m%d")),
            article_type: ArticleType::NewMarket,
            category: market.category.clone(),
            headline: content.headline.clone(),
            subheadline: content.summary.clone(),
            summary: content.summary.clone(),
            body: ArticleBody {
                what_happened: content.overview,
                why_it_matters: content.why_it_matters,
                context: content.context,
                what_to_watch: content.what_to_watch,
                analysis: String::new(),
            },
            markets: vec![MarketRef::from_market(market)],
            primary_market: Some(MarketRef::from_market(market)),
            social_signals: signals,
            tags,
            significance: Significance::Medium,
            sentiment: content.sentiment,
            created_at: now,
            published_at: None,
            updated_at: now,
            meta_title: format!("{} | Marketwire", content.headline),
            meta_description: content.summary,
            views: 0,
            published: true,
            featured: false,
            enrichment_sources: sources,
        };

        self.store.save_article(&article).await?;
        info!(slug = %article.slug, "New market article generated");
        Ok(article)
    }

    // -----------------------------------------------------------------------
    // Category digest
    // -----------------------------------------------------------------------

    pub async fn generate_category_digest(&self, category: &str, limit: i64) -> Result<Article> {
        info!(category, "Generating category digest");

        let markets = self.store.markets_by_category(category, limit).await?;
        if markets.is_empty() {
            return Err(AppError::NotFound(format!("no markets found for category {category}")));
        }
        let refs: Vec<MarketRef> = markets.iter().map(MarketRef::from_market).collect();

        let cat_name = self
            .store
            .category_by_slug(category)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| category.to_string());

        let content = self.digest_content(&cat_name, &refs).await?;

        let now = Utc::now();
        let mut tags = vec![category.to_string(), "digest".to_string(), "analysis".to_string()];
        tags.extend(content.tags);

        let article = Article {
            slug: format!("{category}-digest-{}", now.format("%Y-%m-%d")),
            article_type: ArticleType::Digest,
            category: category.to_string(),
            headline: format!("{cat_name} Markets: {}", content.headline),
            subheadline: content.summary.clone(),
            summary: content.summary.clone(),
            body: ArticleBody {
                what_happened: content.overview,
                why_it_matters: content.analysis,
                context: content.highlights,
                what_to_watch: content.what_to_watch,
                analysis: String::new(),
            },
            markets: refs,
            primary_market: None,
            social_signals: Vec::new(),
            tags,
            significance: Significance::Medium,
            sentiment: content.sentiment,
            created_at: now,
            published_at: None,
            updated_at: now,
            meta_title: format!("{cat_name} Prediction Markets Digest | Marketwire"),
            meta_description: content.summary,
            views: 0,
            published: true,
            featured: false,
            enrichment_sources: Vec::new(),
        };

        self.store.save_article(&article).await?;
        info!(slug = %article.slug, markets = article.markets.len(), "Category digest generated");
        Ok(article)
    }

    // -----------------------------------------------------------------------
    // Shared input collection
    // -----------------------------------------------------------------------

    /// Enrichment context for the primary market. Failure shrinks to an
    /// empty context; it never fails the article.
    async fn enrich_context(&self, market: &Market) -> (String, Vec<String>) {
        match &self.enricher {
            Some(enricher) => {
                let ctx = enricher.enrich(&market.question, &market.category).await;
                (ctx.summary, ctx.sources)
            }
            None => (String::new(), Vec::new()),
        }
    }

    async fn collect_signals(&self, market: &Market) -> Vec<crate::types::SocialSignal> {
        let Some(correlator) = &self.correlator else {
            return Vec::new();
        };
        match correlator
            .find_signals_for_market(market, chrono::Duration::hours(4))
            .await
        {
            Ok(signals) => signals,
            Err(e) => {
                warn!("Failed to correlate social signals: {e}");
                Vec::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Flavor content (LLM or templated fallback)
    // -----------------------------------------------------------------------

    async fn briefing_content(
        &self,
        briefing_type: BriefingType,
        refs: &[MarketRef],
    ) -> Result<BriefingContent> {
        let Some(llm) = &self.llm else {
            return Ok(BriefingContent {
                summary: format!(
                    "Your {briefing_type} prediction market briefing with {} markets",
                    refs.len()
                ),
                overview: "Here are the top prediction markets to watch.".to_string(),
                key_insights: "Market activity continues across multiple categories.".to_string(),
                highlights: vec![
                    "Multiple high-volume markets active".to_string(),
                    "Prices moving across categories".to_string(),
                ],
                what_to_watch: "Monitor these markets for significant movements.".to_string(),
            });
        };

        let prompt = format!(
            "Generate a {briefing_type} briefing for prediction markets.\n\n\
             MARKETS:\n{}\n\
             {}\n\
             Generate JSON:\n\
             {{\n\
               \"summary\": \"2-sentence executive summary\",\n\
               \"overview\": \"3-4 sentences covering the main themes\",\n\
               \"key_insights\": \"2-3 key insights from the data\",\n\
               \"highlights\": [\"highlight 1\", \"highlight 2\", \"highlight 3\"],\n\
               \"what_to_watch\": \"1-2 sentences on what to monitor\"\n\
             }}",
            market_lines(refs),
            aggregate_lines(refs),
        );

        llm.chat_json(ChatRequest {
            system_prompt: "You are a financial markets analyst. Generate concise, professional market briefings.".to_string(),
            user_prompt: prompt,
            temperature: 0.3,
            max_tokens: 800,
            json_mode: true,
        })
        .await
    }

    async fn trending_content(&self, refs: &[MarketRef]) -> Result<TrendingContent> {
        let Some(llm) = &self.llm else {
            return Ok(TrendingContent {
                headline: format!("Top {} Trending Prediction Markets", refs.len()),
                summary: "The hottest prediction markets right now based on volume and activity."
                    .to_string(),
                overview: "These markets are seeing the most trading activity.".to_string(),
                analysis: "High volume indicates strong trader interest.".to_string(),
                highlights: vec!["Multiple markets showing elevated activity".to_string()],
                what_to_watch: "Monitor for continued momentum.".to_string(),
                tags: Vec::new(),
            });
        };

        let prompt = format!(
            "Analyze these trending prediction markets:\n\n{}\n{}\n\
             Generate JSON:\n\
             {{\n\
               \"headline\": \"Compelling headline (max 80 chars)\",\n\
               \"summary\": \"2-sentence summary\",\n\
               \"overview\": \"3-4 sentences on what's trending\",\n\
               \"analysis\": \"2-3 sentences on why these are hot\",\n\
               \"highlights\": [\"key point 1\", \"key point 2\"],\n\
               \"what_to_watch\": \"What to monitor next\",\n\
               \"tags\": [\"relevant\", \"tags\"]\n\
             }}",
            market_lines(refs),
            aggregate_lines(refs),
        );

        llm.chat_json(ChatRequest {
            system_prompt: "You are a financial markets analyst covering prediction markets."
                .to_string(),
            user_prompt: prompt,
            temperature: 0.3,
            max_tokens: 600,
            json_mode: true,
        })
        .await
    }

    async fn new_market_content(
        &self,
        market: &Market,
        context: &str,
    ) -> Result<NewMarketContent> {
        let Some(llm) = &self.llm else {
            return Ok(NewMarketContent {
                headline: format!("New Market: {}", truncate(&market.question, 60)),
                summary: format!("A new prediction market asks: {}", market.question),
                overview: "This market has just been created and is now accepting trades."
                    .to_string(),
                why_it_matters: "New markets offer opportunities to express views on emerging topics."
                    .to_string(),
                context: Vec::new(),
                what_to_watch: "Watch for early price discovery and volume.".to_string(),
                tags: vec![market.category.clone()],
                sentiment: Sentiment::Neutral,
            });
        };

        let prompt = format!(
            "A new prediction market was just created:\n\n\
             QUESTION: {}\n\
             CATEGORY: {}\n\
             CURRENT PROBABILITY: {:.1}%\n\
             INITIAL VOLUME: ${}\n\n\
             CONTEXT (if available):\n{}\n\n\
             Generate JSON:\n\
             {{\n\
               \"headline\": \"Compelling headline about this new market\",\n\
               \"summary\": \"2-sentence summary\",\n\
               \"overview\": \"What this market is about\",\n\
               \"why_it_matters\": \"Why traders should care\",\n\
               \"context\": [\"relevant context point 1\", \"point 2\"],\n\
               \"what_to_watch\": \"What could move this market\",\n\
               \"tags\": [\"relevant\", \"tags\"],\n\
               \"sentiment\": \"bullish|bearish|neutral\"\n\
             }}",
            market.question,
            market.category,
            market.probability * 100.0,
            format_volume(market.volume_24h),
            context,
        );

        llm.chat_json(ChatRequest {
            system_prompt: "You are a financial journalist covering prediction markets.".to_string(),
            user_prompt: prompt,
            temperature: 0.4,
            max_tokens: 600,
            json_mode: true,
        })
        .await
    }

    async fn digest_content(&self, cat_name: &str, refs: &[MarketRef]) -> Result<DigestContent> {
        let Some(llm) = &self.llm else {
            return Ok(DigestContent {
                headline: format!("What's Moving in {cat_name}"),
                summary: format!("A look at the top {cat_name} prediction markets."),
                overview: format!("Here are the most active {cat_name} markets."),
                analysis: "Market activity reflects current events and sentiment.".to_string(),
                highlights: Vec::new(),
                what_to_watch: "Monitor for significant movements.".to_string(),
                tags: Vec::new(),
                sentiment: Sentiment::Neutral,
            });
        };

        let prompt = format!(
            "Create a digest for {cat_name} prediction markets:\n\n\
             MARKETS:\n{}\n\
             {}\n\
             Generate JSON:\n\
             {{\n\
               \"headline\": \"Compelling digest headline\",\n\
               \"summary\": \"2-sentence executive summary\",\n\
               \"overview\": \"3-4 sentences on category state\",\n\
               \"analysis\": \"Key insights and patterns\",\n\
               \"highlights\": [\"key point 1\", \"key point 2\"],\n\
               \"what_to_watch\": \"What to monitor\",\n\
               \"tags\": [\"relevant\", \"tags\"],\n\
               \"sentiment\": \"bullish|bearish|neutral\"\n\
             }}",
            market_lines(refs),
            aggregate_lines(refs),
        );

        llm.chat_json(ChatRequest {
            system_prompt: "You are a financial analyst specializing in prediction markets."
                .to_string(),
            user_prompt: prompt,
            temperature: 0.3,
            max_tokens: 600,
            json_mode: true,
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// LLM output schemas per flavor
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BriefingContent {
    summary: String,
    overview: String,
    key_insights: String,
    highlights: Vec<String>,
    what_to_watch: String,
}

#[derive(Debug, Deserialize)]
struct TrendingContent {
    headline: String,
    summary: String,
    overview: String,
    analysis: String,
    highlights: Vec<String>,
    what_to_watch: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NewMarketContent {
    headline: String,
    summary: String,
    overview: String,
    why_it_matters: String,
    #[serde(default)]
    context: Vec<String>,
    what_to_watch: String,
    #[serde(default)]
    tags: Vec<String>,
    sentiment: Sentiment,
}

#[derive(Debug, Deserialize)]
struct DigestContent {
    headline: String,
    summary: String,
    overview: String,
    analysis: String,
    #[serde(default)]
    highlights: Vec<String>,
    what_to_watch: String,
    #[serde(default)]
    tags: Vec<String>,
    sentiment: Sentiment,
}

// ---------------------------------------------------------------------------
// Prompt helpers
// ---------------------------------------------------------------------------

/// Sanitized headline plus a minute-resolution timestamp suffix.
fn timestamped_slug(headline: &str) -> String {
    format!("{}-{}", sanitize_slug(headline), Utc::now().format("%Y%m%d-%H%M"))
}

fn market_lines(refs: &[MarketRef]) -> String {
    refs.iter()
        .take(PROMPT_MARKET_CAP)
        .map(|m| {
            format!(
                "- {}: {:.1}% ({:+.1}% change, ${} volume)",
                m.question,
                m.probability * 100.0,
                m.change_24h * 100.0,
                format_volume(m.volume_24h),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pre-computed aggregates embedded alongside the per-market lines.
fn aggregate_lines(refs: &[MarketRef]) -> String {
    let total_volume: f64 = refs.iter().map(|m| m.volume_24h).sum();
    let bullish = refs.iter().filter(|m| m.change_24h > 0.0).count();
    let bearish = refs.iter().filter(|m| m.change_24h < 0.0).count();
    let biggest = refs.iter().max_by(|a, b| {
        a.change_24h
            .abs()
            .partial_cmp(&b.change_24h.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mover = match biggest {
        Some(m) => format!(
            "{} ({:+.1} points)",
            truncate(&m.question, 60),
            m.change_24h * 100.0
        ),
        None => "n/a".to_string(),
    };

    format!(
        "\nAGGREGATES:\n\
         Total 24h volume: ${}\n\
         Biggest mover: {mover}\n\
         Bullish: {bullish}, Bearish: {bearish}\n",
        format_volume(total_volume),
    )
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut cut = max_len.saturating_sub(3);
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
    use crate::bus::EventKind;

    async fn store_with_markets() -> Arc<Store> {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let categories = ["politics", "crypto", "finance", "tech", "sports"];
        for (i, cat) in categories.iter().enumerate() {
            let m = Market {
                market_id: format!("m{i}"),
                slug: format!("market-{i}"),
                question: format!("Will {cat} market {i} resolve yes?"),
                category: cat.to_string(),
                probability: 0.4 + i as f64 * 0.05,
                change_24h: if i % 2 == 0 { 0.03 } else { -0.02 },
                volume_24h: 100_000.0 + i as f64 * 10_000.0,
                total_volume: 1_000_000.0,
                trending_score: 40.0 + i as f64,
                active: true,
                closed: false,
                ..Default::default()
            };
            store.upsert_market(&m).await.unwrap();
        }
        store
    }

    fn generator(store: Arc<Store>) -> ContentGenerator {
        // No LLM, no enrichment, no correlator: the templated-fallback path.
        ContentGenerator::new(store, None, None, None)
    }

    #[tokio::test]
    async fn briefing_falls_back_to_templated_copy_without_llm() {
        let store = store_with_markets().await;
        let article = generator(Arc::clone(&store))
            .generate_briefing(BriefingType::Morning)
            .await
            .unwrap();

        assert_eq!(article.article_type, ArticleType::Briefing);
        assert_eq!(article.category, "briefing");
        assert!(article.slug.starts_with("morning-briefing-"));
        assert!(!article.markets.is_empty());
        assert!(article.published);
        assert!(article.summary.contains("morning"));

        let saved = store.article_by_slug(&article.slug).await.unwrap();
        assert!(saved.is_some());
    }

    #[tokio::test]
    async fn second_briefing_same_day_is_a_slug_conflict() {
        let store = store_with_markets().await;
        let generator = generator(store);

        generator.generate_briefing(BriefingType::Midday).await.unwrap();
        let err = generator.generate_briefing(BriefingType::Midday).await.unwrap_err();
        assert!(matches!(err, AppError::SlugConflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn briefing_with_no_markets_fails() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let err = generator(store)
            .generate_briefing(BriefingType::Morning)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn trending_article_covers_top_markets() {
        let store = store_with_markets().await;
        let article = generator(Arc::clone(&store)).generate_trending(3).await.unwrap();

        assert_eq!(article.article_type, ArticleType::Trending);
        assert!(article.slug.starts_with("trending-markets-"));
        assert_eq!(article.markets.len(), 3);
        // Highest trending score first.
        assert_eq!(article.markets[0].market_id, "m4");
        assert!(article.tags.contains(&"trending".to_string()));
    }

    #[tokio::test]
    async fn new_market_article_embeds_market_snapshot() {
        let store = store_with_markets().await;
        let market = store.market_by_id("m1").await.unwrap().unwrap();
        let article = generator(Arc::clone(&store))
            .generate_new_market(&market)
            .await
            .unwrap();

        assert_eq!(article.article_type, ArticleType::NewMarket);
        assert!(article.slug.starts_with("new-market-market-1-"));
        assert_eq!(article.markets.len(), 1);
        assert_eq!(article.markets[0].probability, market.probability);
        assert_eq!(article.primary_market.as_ref().unwrap().market_id, "m1");
        assert!(article.tags.contains(&"new".to_string()));
    }

    #[tokio::test]
    async fn category_digest_uses_display_name() {
        let store = store_with_markets().await;
        let article = generator(Arc::clone(&store))
            .generate_category_digest("crypto", 10)
            .await
            .unwrap();

        assert_eq!(article.article_type, ArticleType::Digest);
        assert!(article.slug.starts_with("crypto-digest-"));
        assert!(article.headline.starts_with("Crypto Markets:"));
        assert!(article.tags.contains(&"crypto".to_string()));
    }

    #[tokio::test]
    async fn digest_for_empty_category_fails() {
        let store = store_with_markets().await;
        let err = generator(store)
            .generate_category_digest("culture", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn breaking_without_llm_is_a_hard_failure() {
        let store = store_with_markets().await;
        let market = store.market_by_id("m0").await.unwrap().unwrap();
        let event = MarketEvent::new(
            EventKind::BreakingMove { previous: 0.40, current: 0.48, change: 0.08 },
            market,
        );

        let err = generator(Arc::clone(&store))
            .generate_breaking(&event)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LlmUnavailable), "got {err:?}");

        // No article was written.
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_articles, 0);
    }

    #[test]
    fn timestamped_slug_has_minute_suffix() {
        let slug = timestamped_slug("Bitcoin Odds Surge Past 70%!");
        // suffix: -YYYYMMDD-HHMM
        let parts: Vec<&str> = slug.rsplitn(3, '-').collect();
        assert_eq!(parts[0].len(), 4, "minute part: {slug}");
        assert_eq!(parts[1].len(), 8, "date part: {slug}");
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert!(slug.starts_with("bitcoin-odds-surge-past-70percent"));
    }

    #[test]
    fn aggregates_summarize_volume_and_direction() {
        let refs = vec![
            MarketRef { question: "A?".into(), change_24h: 0.10, volume_24h: 100_000.0, ..Default::default() },
            MarketRef { question: "B?".into(), change_24h: -0.20, volume_24h: 50_000.0, ..Default::default() },
            MarketRef { question: "C?".into(), change_24h: 0.01, volume_24h: 25_000.0, ..Default::default() },
        ];
        let lines = aggregate_lines(&refs);
        assert!(lines.contains("Total 24h volume: $175.0K"));
        assert!(lines.contains("Biggest mover: B? (-20.0 points)"));
        assert!(lines.contains("Bullish: 2, Bearish: 1"));
    }

    #[test]
    fn market_lines_cap_at_ten() {
        let refs: Vec<MarketRef> = (0..15)
            .map(|i| MarketRef { question: format!("Q{i}?"), ..Default::default() })
            .collect();
        let lines = market_lines(&refs);
        assert_eq!(lines.lines().count(), 10);
    }
}
