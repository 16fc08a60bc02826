//! Row types for sqlx runtime-checked queries. Nested arrays/objects live
//! in JSON text columns and are decoded on the way out.

use chrono::{DateTime, Utc};

use crate::article::{Article, ArticleBody, ArticleType, MarketRef, Sentiment, Significance};
use crate::types::{Category, Market, PolymarketTag, Snapshot, SocialSignal};

#[derive(Debug, sqlx::FromRow)]
pub struct MarketRow {
    pub market_id: String,
    pub condition_id: String,
    pub slug: String,
    pub group_item_title: String,
    pub question: String,
    pub description: String,
    pub image: String,
    pub icon: String,
    pub category: String,
    pub tags: String,
    pub polymarket_tags: String,
    pub probability: f64,
    pub previous_prob: f64,
    pub change_24h: f64,
    pub change_7d: f64,
    pub last_trade_price: f64,
    pub volume_1h: f64,
    pub volume_24h: f64,
    pub volume_7d: f64,
    pub total_volume: f64,
    pub event_volume: f64,
    pub event_volume_24h: f64,
    pub event_title: String,
    pub comment_count: i64,
    pub series_slug: String,
    pub liquidity: f64,
    pub active: bool,
    pub closed: bool,
    pub archived: bool,
    pub accepting_bid: bool,
    pub start_date: String,
    pub end_date: String,
    pub resolution_source: String,
    pub competitor_count: i64,
    pub outcomes: String,
    pub outcome_prices: String,
    pub trending_score: f64,
    pub polymarket_url: String,
    pub first_seen_at: i64,
    pub updated_at: i64,
}

impl From<MarketRow> for Market {
    fn from(r: MarketRow) -> Self {
        Market {
            market_id: r.market_id,
            condition_id: r.condition_id,
            slug: r.slug,
            group_item_title: r.group_item_title,
            question: r.question,
            description: r.description,
            image: r.image,
            icon: r.icon,
            category: r.category,
            tags: decode_json(&r.tags),
            polymarket_tags: decode_json::<Vec<PolymarketTag>>(&r.polymarket_tags),
            probability: r.probability,
            previous_prob: r.previous_prob,
            change_24h: r.change_24h,
            change_7d: r.change_7d,
            last_trade_price: r.last_trade_price,
            volume_1h: r.volume_1h,
            volume_24h: r.volume_24h,
            volume_7d: r.volume_7d,
            total_volume: r.total_volume,
            event_volume: r.event_volume,
            event_volume_24h: r.event_volume_24h,
            event_title: r.event_title,
            comment_count: r.comment_count,
            series_slug: r.series_slug,
            liquidity: r.liquidity,
            active: r.active,
            closed: r.closed,
            archived: r.archived,
            accepting_bid: r.accepting_bid,
            start_date: r.start_date,
            end_date: r.end_date,
            resolution_source: r.resolution_source,
            competitor_count: r.competitor_count,
            outcomes: decode_json(&r.outcomes),
            outcome_prices: decode_json(&r.outcome_prices),
            trending_score: r.trending_score,
            polymarket_url: r.polymarket_url,
            first_seen_at: from_unix_opt(r.first_seen_at),
            updated_at: from_unix(r.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub market_id: String,
    pub probability: f64,
    pub volume_24h: f64,
    pub total_volume: f64,
    pub liquidity: f64,
    pub captured_at: i64,
}

impl From<SnapshotRow> for Snapshot {
    fn from(r: SnapshotRow) -> Self {
        Snapshot {
            market_id: r.market_id,
            probability: r.probability,
            volume_24h: r.volume_24h,
            total_volume: r.total_volume,
            liquidity: r.liquidity,
            captured_at: from_unix(r.captured_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ArticleRow {
    pub slug: String,
    pub article_type: String,
    pub category: String,
    pub headline: String,
    pub subheadline: String,
    pub summary: String,
    pub body: String,
    pub markets: String,
    pub primary_market: Option<String>,
    pub social_signals: String,
    pub tags: String,
    pub significance: String,
    pub sentiment: String,
    pub meta_title: String,
    pub meta_description: String,
    pub views: i64,
    pub published: bool,
    pub featured: bool,
    pub enrichment_sources: String,
    pub created_at: i64,
    pub published_at: i64,
    pub updated_at: i64,
}

impl From<ArticleRow> for Article {
    fn from(r: ArticleRow) -> Self {
        Article {
            slug: r.slug,
            article_type: ArticleType::parse(&r.article_type).unwrap_or(ArticleType::Briefing),
            category: r.category,
            headline: r.headline,
            subheadline: r.subheadline,
            summary: r.summary,
            body: decode_json::<ArticleBody>(&r.body),
            markets: decode_json::<Vec<MarketRef>>(&r.markets),
            primary_market: r
                .primary_market
                .as_deref()
                .and_then(|s| serde_json::from_str::<MarketRef>(s).ok()),
            social_signals: decode_json::<Vec<SocialSignal>>(&r.social_signals),
            tags: decode_json(&r.tags),
            significance: serde_json::from_value(serde_json::Value::String(r.significance))
                .unwrap_or(Significance::Medium),
            sentiment: serde_json::from_value(serde_json::Value::String(r.sentiment))
                .unwrap_or(Sentiment::Neutral),
            created_at: from_unix(r.created_at),
            published_at: from_unix_opt(r.published_at),
            updated_at: from_unix(r.updated_at),
            meta_title: r.meta_title,
            meta_description: r.meta_description,
            views: r.views,
            published: r.published,
            featured: r.featured,
            enrichment_sources: decode_json(&r.enrichment_sources),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct CategoryRow {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub sort_order: i64,
    pub dynamic: bool,
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category {
            slug: r.slug,
            name: r.name,
            description: r.description,
            icon: r.icon,
            color: r.color,
            order: r.sort_order,
            dynamic: r.dynamic,
        }
    }
}

fn decode_json<T: Default + serde::de::DeserializeOwned>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

pub fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

pub fn from_unix_opt(secs: i64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        None
    } else {
        DateTime::from_timestamp(secs, 0)
    }
}
