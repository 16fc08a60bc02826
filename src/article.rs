use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SocialSignal;

// ---------------------------------------------------------------------------
// Article classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleType {
    /// Breaking news from a significant market movement.
    Breaking,
    /// Scheduled briefing (morning, midday, evening, weekly).
    Briefing,
    /// Trending market roundup.
    Trending,
    /// Coverage of a newly listed market.
    NewMarket,
    /// In-depth analysis of a single market.
    DeepDive,
    /// Category or weekly digest.
    Digest,
    /// Educational content.
    Explainer,
}

impl ArticleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleType::Breaking => "breaking",
            ArticleType::Briefing => "briefing",
            ArticleType::Trending => "trending",
            ArticleType::NewMarket => "new_market",
            ArticleType::DeepDive => "deep_dive",
            ArticleType::Digest => "digest",
            ArticleType::Explainer => "explainer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "breaking" => Some(ArticleType::Breaking),
            "briefing" => Some(ArticleType::Briefing),
            "trending" => Some(ArticleType::Trending),
            "new_market" => Some(ArticleType::NewMarket),
            "deep_dive" => Some(ArticleType::DeepDive),
            "digest" => Some(ArticleType::Digest),
            "explainer" => Some(ArticleType::Explainer),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArticleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    Low,
    Medium,
    High,
    Breaking,
}

impl std::fmt::Display for Significance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Significance::Low => "low",
            Significance::Medium => "medium",
            Significance::High => "high",
            Significance::Breaking => "breaking",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// Generated editorial artifact. Created atomically at generation time and
/// mutable only for view counts, feature flags, and embedded market-ref
/// refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub slug: String,

    #[serde(rename = "type")]
    pub article_type: ArticleType,
    pub category: String,

    pub headline: String,
    pub subheadline: String,
    pub summary: String,
    pub body: ArticleBody,

    /// Market refs snapshot probability/change/volume at article time so the
    /// article stays readable even after the market moves on.
    pub markets: Vec<MarketRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_market: Option<MarketRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub social_signals: Vec<SocialSignal>,

    pub tags: Vec<String>,
    pub significance: Significance,
    pub sentiment: Sentiment,

    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    pub meta_title: String,
    pub meta_description: String,

    pub views: i64,
    pub published: bool,
    pub featured: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrichment_sources: Vec<String>,
}

/// The four named body sections, plus optional analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleBody {
    pub what_happened: String,
    pub why_it_matters: String,
    pub context: Vec<String>,
    pub what_to_watch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub analysis: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketRef {
    pub market_id: String,
    pub question: String,
    pub slug: String,
    pub probability: f64,
    #[serde(default)]
    pub previous_prob: f64,
    pub change_24h: f64,
    pub volume_24h: f64,
    pub total_volume: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub end_date: String,
}

impl MarketRef {
    pub fn from_market(m: &crate::types::Market) -> Self {
        Self {
            market_id: m.market_id.clone(),
            question: m.question.clone(),
            slug: m.slug.clone(),
            probability: m.probability,
            previous_prob: m.previous_prob,
            change_24h: m.change_24h,
            volume_24h: m.volume_24h,
            total_volume: m.total_volume,
            end_date: m.end_date.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Briefings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BriefingType {
    Morning,
    Midday,
    Evening,
    Weekly,
}

impl std::fmt::Display for BriefingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BriefingType::Morning => "morning",
            BriefingType::Midday => "midday",
            BriefingType::Evening => "evening",
            BriefingType::Weekly => "weekly",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct BriefingConfig {
    pub title: &'static str,
    pub markets_per_category: usize,
    pub categories: &'static [&'static str],
    pub include_summary: bool,
}

impl BriefingType {
    pub fn config(&self) -> BriefingConfig {
        match self {
            BriefingType::Morning => BriefingConfig {
                title: "Morning Market Briefing",
                markets_per_category: 3,
                categories: &["politics", "crypto", "finance", "tech", "sports"],
                include_summary: true,
            },
            BriefingType::Midday => BriefingConfig {
                title: "Midday Market Pulse",
                markets_per_category: 2,
                categories: &["politics", "crypto", "finance"],
                include_summary: false,
            },
            BriefingType::Evening => BriefingConfig {
                title: "Evening Market Wrap",
                markets_per_category: 3,
                categories: &["politics", "crypto", "finance", "tech", "sports"],
                include_summary: true,
            },
            BriefingType::Weekly => BriefingConfig {
                title: "Weekly Market Digest",
                markets_per_category: 5,
                categories: &["politics", "crypto", "finance", "tech", "sports", "geopolitics"],
                include_summary: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_type_round_trips_through_str() {
        for t in [
            ArticleType::Breaking,
            ArticleType::Briefing,
            ArticleType::Trending,
            ArticleType::NewMarket,
            ArticleType::DeepDive,
            ArticleType::Digest,
            ArticleType::Explainer,
        ] {
            assert_eq!(ArticleType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ArticleType::parse("bogus"), None);
    }

    #[test]
    fn sentiment_deserializes_from_llm_enum() {
        let s: Sentiment = serde_json::from_str("\"bullish\"").unwrap();
        assert_eq!(s, Sentiment::Bullish);
        assert!(serde_json::from_str::<Sentiment>("\"sideways\"").is_err());
    }

    #[test]
    fn briefing_configs_cover_all_types() {
        assert_eq!(BriefingType::Morning.config().markets_per_category, 3);
        assert_eq!(BriefingType::Weekly.config().categories.len(), 6);
        assert!(!BriefingType::Midday.config().include_summary);
    }
}
