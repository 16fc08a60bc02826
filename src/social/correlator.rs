//! Correlates tracked-account posts with market movements by keyword
//! overlap and timing.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::article::Article;
use crate::error::{AppError, Result};
use crate::social::client::{Post, TrackedUser, XtrackerClient};
use crate::store::Store;
use crate::types::{Market, MarketMovement, SocialSignal};

const USER_CACHE_TTL_SECS: u64 = 300;
const POST_EXCERPT_MAX: usize = 280;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been",
    "will", "would", "could", "should", "may", "might", "in", "on", "at", "to",
    "for", "of", "with", "by", "from", "as", "into", "through", "this", "that",
    "these", "those", "it", "its", "their", "they", "them", "what", "when",
    "where", "who", "which", "how", "if", "then", "else", "than",
];

#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// How long after a post to look for market movements.
    pub time_window: Duration,
    /// Minimum |change_24h| for a market to count as moved.
    pub min_market_change: f64,
    pub max_signals_per_article: usize,
    /// Categories scanned during whole-feed correlation.
    pub categories: Vec<String>,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            time_window: Duration::hours(2),
            min_market_change: 0.02,
            max_signals_per_article: 3,
            categories: ["politics", "tech", "crypto", "finance", "world"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

struct UserCache {
    users: Vec<TrackedUser>,
    fetched_at: Option<Instant>,
}

pub struct Correlator {
    client: XtrackerClient,
    store: Arc<Store>,
    config: CorrelationConfig,
    users: Mutex<UserCache>,
}

impl Correlator {
    pub fn new(client: XtrackerClient, store: Arc<Store>, config: CorrelationConfig) -> Self {
        Self {
            client,
            store,
            config,
            users: Mutex::new(UserCache { users: Vec::new(), fetched_at: None }),
        }
    }

    /// Tracked users, cached for five minutes.
    pub async fn tracked_users(&self) -> Result<Vec<TrackedUser>> {
        let mut cache = self.users.lock().await;
        let fresh = cache
            .fetched_at
            .map(|t| t.elapsed().as_secs() < USER_CACHE_TTL_SECS)
            .unwrap_or(false);
        if fresh && !cache.users.is_empty() {
            return Ok(cache.users.clone());
        }

        let users = self.client.get_users().await?;
        cache.users = users.clone();
        cache.fetched_at = Some(Instant::now());
        Ok(users)
    }

    /// Posts by tracked accounts that plausibly influenced this market:
    /// keyword-relevant AND within the correlation window.
    pub async fn find_signals_for_market(
        &self,
        market: &Market,
        lookback: Duration,
    ) -> Result<Vec<SocialSignal>> {
        let users = self.tracked_users().await?;
        let since = Utc::now() - lookback;
        let mut signals = Vec::new();

        for user in &users {
            let posts = match self.client.get_recent_posts(&user.handle, since, 50).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(handle = %user.handle, "Failed to get posts: {e}");
                    continue;
                }
            };

            for post in &posts {
                if !is_relevant(&post.content, &market.question) {
                    continue;
                }
                if !self.is_time_correlated(post.created_at) {
                    continue;
                }

                signals.push(SocialSignal {
                    handle: user.handle.clone(),
                    name: user.name.clone(),
                    avatar_url: user.avatar_url.clone(),
                    verified: user.verified,
                    content: truncate_content(&post.content, POST_EXCERPT_MAX),
                    tweet_url: post.tweet_url(&user.handle),
                    posted_at: post.created_at,
                    market_impact: market.change_24h,
                    impact_window: post
                        .created_at
                        .map(|t| format_duration(Utc::now() - t))
                        .unwrap_or_default(),
                    affected_markets: Vec::new(),
                });
            }
        }

        signals.truncate(self.config.max_signals_per_article);
        Ok(signals)
    }

    /// Whole-feed correlation: every tracked account's recent posts scanned
    /// against moved markets in the configured categories. Strongest
    /// absolute impact first.
    pub async fn find_recent_signals(&self, lookback: Duration) -> Result<Vec<SocialSignal>> {
        let users = self.tracked_users().await?;
        let since = Utc::now() - lookback;
        let mut all_signals = Vec::new();

        for user in &users {
            let posts = match self.client.get_recent_posts(&user.handle, since, 100).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(handle = %user.handle, "Failed to get posts: {e}");
                    continue;
                }
            };

            for post in &posts {
                let movements = self.find_market_movements(post).await;
                if movements.is_empty() {
                    continue;
                }

                let avg_impact = movements.iter().map(|m| m.change.abs()).sum::<f64>()
                    / movements.len() as f64;

                all_signals.push(SocialSignal {
                    handle: user.handle.clone(),
                    name: user.name.clone(),
                    avatar_url: user.avatar_url.clone(),
                    verified: user.verified,
                    content: truncate_content(&post.content, POST_EXCERPT_MAX),
                    tweet_url: post.tweet_url(&user.handle),
                    posted_at: post.created_at,
                    market_impact: avg_impact,
                    impact_window: format_duration(self.config.time_window),
                    affected_markets: movements,
                });
            }
        }

        all_signals.sort_by(|a, b| {
            b.market_impact
                .abs()
                .partial_cmp(&a.market_impact.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all_signals.truncate(self.config.max_signals_per_article);
        Ok(all_signals)
    }

    /// Attach correlated signals to an article whose primary market
    /// resolves; also records `@handle` entries as enrichment sources.
    pub async fn enrich_article_with_signals(&self, article: &mut Article) -> Result<()> {
        let primary_slug = article
            .primary_market
            .as_ref()
            .map(|m| m.slug.clone())
            .or_else(|| article.markets.first().map(|m| m.slug.clone()));
        let Some(primary_slug) = primary_slug else {
            return Ok(());
        };

        let market = self
            .store
            .market_by_slug(&primary_slug)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("market {primary_slug}")))?;

        let signals = self.find_signals_for_market(&market, Duration::hours(4)).await?;
        if signals.is_empty() {
            return Ok(());
        }

        for sig in &signals {
            let when = sig
                .posted_at
                .map(|t| t.format("%b %-d").to_string())
                .unwrap_or_default();
            article.enrichment_sources.push(format!("@{} ({})", sig.handle, when));
        }

        info!(
            article = %article.slug,
            signals = signals.len(),
            "Enriched article with social signals"
        );
        article.social_signals = signals;
        Ok(())
    }

    async fn find_market_movements(&self, post: &Post) -> Vec<MarketMovement> {
        let mut movements = Vec::new();

        for category in &self.config.categories {
            let markets = match self.store.markets_by_category(category, 20).await {
                Ok(markets) => markets,
                Err(_) => continue,
            };

            for market in &markets {
                if market.change_24h.abs() < self.config.min_market_change {
                    continue;
                }
                if !is_relevant(&post.content, &market.question) {
                    continue;
                }

                movements.push(MarketMovement {
                    market_slug: market.slug.clone(),
                    market_title: market.question.clone(),
                    category: market.category.clone(),
                    prob_before: market.probability - market.change_24h,
                    prob_after: market.probability,
                    change: market.change_24h,
                    time_delta: format!("within {}", format_duration(self.config.time_window)),
                });
            }
        }

        movements
    }

    fn is_time_correlated(&self, post_time: Option<DateTime<Utc>>) -> bool {
        match post_time {
            Some(t) => Utc::now() - t <= self.config.time_window,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Keyword matching
// ---------------------------------------------------------------------------

/// Tokens from a market question worth matching on: lower-cased, stop words
/// dropped, short tokens dropped.
fn extract_keywords(text: &str) -> Vec<String> {
    let cleaned = text.replace(['?', '\'', '"'], " ");
    cleaned
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()).to_string())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Relevance: at least two question keywords (length > 3) appear as
/// substrings of the post content.
fn is_relevant(content: &str, question: &str) -> bool {
    let content_lower = content.to_lowercase();
    let keywords = extract_keywords(&question.to_lowercase());

    let matches = keywords
        .iter()
        .filter(|kw| kw.len() > 3 && content_lower.contains(kw.as_str()))
        .count();
    matches >= 2
}

fn truncate_content(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut cut = max_len.saturating_sub(3);
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

fn format_duration(d: Duration) -> String {
    if d < Duration::hours(1) {
        format!("{}m", d.num_minutes())
    } else if d < Duration::hours(24) {
        format!("{}h", d.num_hours())
    } else {
        format!("{}d", d.num_hours() / 24)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_drop_stop_words_and_short_tokens() {
        let keywords = extract_keywords("will the fed cut interest rates in march");
        assert!(keywords.contains(&"fed".to_string()));
        assert!(keywords.contains(&"interest".to_string()));
        assert!(keywords.contains(&"rates".to_string()));
        assert!(keywords.contains(&"march".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"in".to_string()));
        assert!(!keywords.contains(&"will".to_string()));
    }

    #[test]
    fn relevance_needs_two_long_keyword_matches() {
        let question = "Will Bitcoin reach 100k before March?";
        assert!(is_relevant(
            "Bitcoin is ripping toward 100k and March is coming fast",
            question
        ));
        // Only one keyword present.
        assert!(!is_relevant("bitcoin update", question));
        assert!(!is_relevant("totally unrelated post", question));
    }

    #[test]
    fn relevance_ignores_three_letter_tokens_for_matching() {
        // "fed" (3 chars) is a keyword but too short to count as a match.
        let question = "Will the fed cut rates soon?";
        assert!(!is_relevant("fed fed fed", question));
        assert!(is_relevant("rates decision coming soon from Powell", question));
    }

    #[test]
    fn excerpts_cap_at_280_chars() {
        let long = "a".repeat(400);
        let excerpt = truncate_content(&long, 280);
        assert_eq!(excerpt.len(), 280);
        assert!(excerpt.ends_with("..."));

        let short = "short post";
        assert_eq!(truncate_content(short, 280), "short post");
    }

    #[test]
    fn duration_labels_use_minutes_hours_days() {
        assert_eq!(format_duration(Duration::minutes(45)), "45m");
        assert_eq!(format_duration(Duration::hours(2)), "2h");
        assert_eq!(format_duration(Duration::hours(49)), "2d");
    }

    #[tokio::test]
    async fn movements_require_change_and_keyword_match() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());

        let mut moved = Market {
            market_id: "m1".to_string(),
            slug: "bitcoin-above-100k".to_string(),
            question: "Will Bitcoin close above 100k in March?".to_string(),
            category: "crypto".to_string(),
            probability: 0.55,
            change_24h: 0.05,
            volume_24h: 500_000.0,
            active: true,
            ..Default::default()
        };
        store.upsert_market(&moved).await.unwrap();

        moved.market_id = "m2".to_string();
        moved.slug = "ethereum-flips".to_string();
        moved.question = "Will Ethereum flip Bitcoin?".to_string();
        moved.change_24h = 0.001; // below min change
        store.upsert_market(&moved).await.unwrap();

        let correlator = Correlator::new(
            XtrackerClient::new(None).unwrap(),
            store,
            CorrelationConfig::default(),
        );

        let post = Post {
            content: "Bitcoin about to break 100k this March, screenshot this".to_string(),
            ..Default::default()
        };
        let movements = correlator.find_market_movements(&post).await;

        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].market_slug, "bitcoin-above-100k");
        assert!((movements[0].prob_before - 0.50).abs() < 1e-9);
        assert!((movements[0].prob_after - 0.55).abs() < 1e-9);
        assert_eq!(movements[0].time_delta, "within 2h");
    }
}
