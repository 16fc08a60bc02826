use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Canonical projection of a remote Polymarket market, keyed by `market_id`.
/// `slug` is derived deterministically from the question; `polymarket_url`
/// always uses the parent *event* slug.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Market {
    // Identifiers
    pub market_id: String,
    pub condition_id: String,
    pub slug: String,
    pub group_item_title: String,

    // Content
    pub question: String,
    pub description: String,
    pub image: String,
    pub icon: String,

    // Classification
    pub category: String,
    pub tags: Vec<String>,
    pub polymarket_tags: Vec<PolymarketTag>,

    // Pricing
    pub probability: f64,
    pub previous_prob: f64,
    pub change_24h: f64,
    pub change_7d: f64,
    pub last_trade_price: f64,

    // Volume
    pub volume_1h: f64,
    pub volume_24h: f64,
    pub volume_7d: f64,
    pub total_volume: f64,
    pub event_volume: f64,
    pub event_volume_24h: f64,

    // Event data
    pub event_title: String,
    pub comment_count: i64,
    pub series_slug: String,

    // Liquidity & status
    pub liquidity: f64,
    pub active: bool,
    pub closed: bool,
    pub archived: bool,
    pub accepting_bid: bool,
    pub start_date: String,
    pub end_date: String,

    // Resolution
    pub resolution_source: String,
    pub competitor_count: i64,

    // Outcomes
    pub outcomes: Vec<String>,
    pub outcome_prices: Vec<f64>,

    // Derived
    pub trending_score: f64,
    pub polymarket_url: String,

    // Timing. `first_seen_at` is None until the first sync pass observes
    // the market, then never changes again.
    pub first_seen_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolymarketTag {
    pub label: String,
    pub slug: String,
}

impl Market {
    /// Trending score: sum of four bounded components. Used only for ranking.
    pub fn calculate_trending_score(&self) -> f64 {
        // Volume component (0-40)
        let volume_score = match self.volume_24h {
            v if v >= 1_000_000.0 => 40.0,
            v if v >= 500_000.0 => 30.0,
            v if v >= 100_000.0 => 20.0,
            v if v >= 50_000.0 => 10.0,
            _ => 0.0,
        };

        // Movement component (0-30)
        let movement_score = match self.change_24h.abs() {
            c if c >= 0.15 => 30.0,
            c if c >= 0.10 => 25.0,
            c if c >= 0.05 => 15.0,
            c if c >= 0.02 => 10.0,
            _ => 0.0,
        };

        // Velocity: hourly volume against the 24h hourly average (0-20)
        let mut velocity_score = 0.0;
        if self.volume_24h > 0.0 && self.volume_1h > 0.0 {
            let hourly_ratio = self.volume_1h / (self.volume_24h / 24.0);
            velocity_score = match hourly_ratio {
                r if r >= 5.0 => 20.0,
                r if r >= 3.0 => 15.0,
                r if r >= 2.0 => 10.0,
                _ => 0.0,
            };
        }

        // Interest: markets near 50/50 are more interesting. Negative at the
        // extremes.
        let interest_score = 10.0 - (self.probability - 0.5).abs() * 20.0;

        volume_score + movement_score + velocity_score + interest_score
    }

    /// First category whose keyword list matches the lower-cased question.
    /// Ties break by declaration order; no match is "other".
    pub fn detect_category(&self) -> String {
        let question = self.question.to_lowercase();
        for (category, keywords) in CATEGORY_KEYWORDS {
            if keywords.iter().any(|kw| question.contains(kw)) {
                return (*category).to_string();
            }
        }
        "other".to_string()
    }

    pub fn is_new(&self, within: chrono::Duration) -> bool {
        match self.first_seen_at {
            Some(t) => Utc::now() - t <= within,
            None => false,
        }
    }

    pub fn is_breaking(&self, threshold: f64) -> bool {
        self.change_24h.abs() >= threshold
    }

    pub fn generate_slug(&self) -> String {
        sanitize_slug(&self.question)
    }
}

/// URL-friendly slug: lower-cased, punctuation stripped, `&`/`%`/`$`/`@`
/// expanded to words, capped at 80 chars, trailing dashes trimmed.
/// Deterministic: the same input always yields the same slug.
pub fn sanitize_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        match c {
            ' ' => slug.push('-'),
            '&' => slug.push_str("and"),
            '%' => slug.push_str("percent"),
            '$' => slug.push_str("usd"),
            '@' => slug.push_str("at"),
            '\'' | '"' | '?' | '!' | ',' | '.' | ':' | ';' | '(' | ')' | '[' | ']' | '#' | '+' => {}
            c => slug.push(c),
        }
    }

    // Collapse runs of dashes produced by stripped punctuation.
    let mut collapsed = String::with_capacity(slug.len());
    let mut prev_dash = false;
    for c in slug.chars() {
        if c == '-' {
            if !prev_dash {
                collapsed.push('-');
            }
            prev_dash = true;
        } else {
            collapsed.push(c);
            prev_dash = false;
        }
    }

    if collapsed.len() > 80 {
        let mut cut = 80;
        while !collapsed.is_char_boundary(cut) {
            cut -= 1;
        }
        collapsed.truncate(cut);
    }

    collapsed.trim_end_matches('-').to_string()
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Periodic time-stamped copy of a market's price and volume. Append-only;
/// pruned by age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub market_id: String,
    pub probability: f64,
    pub volume_24h: f64,
    pub total_volume: f64,
    pub liquidity: f64,
    pub captured_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Category taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub order: i64,
    /// trending, breaking, and new are computed on read, never assigned.
    pub dynamic: bool,
}

pub fn default_categories() -> Vec<Category> {
    fn cat(
        slug: &str,
        name: &str,
        description: &str,
        icon: &str,
        color: &str,
        order: i64,
        dynamic: bool,
    ) -> Category {
        Category {
            slug: slug.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            order,
            dynamic,
        }
    }

    vec![
        cat("trending", "Trending", "Most active prediction markets right now", "trending_up", "#FF6B6B", 1, true),
        cat("breaking", "Breaking", "Significant market movements and news", "bolt", "#FF4757", 2, true),
        cat("new", "New", "Recently created markets", "fiber_new", "#2ED573", 3, true),
        cat("politics", "Politics", "Political predictions and elections", "account_balance", "#5352ED", 10, false),
        cat("elections", "Elections", "Election predictions worldwide", "how_to_vote", "#A29BFE", 11, false),
        cat("crypto", "Crypto", "Cryptocurrency predictions", "currency_bitcoin", "#F7931A", 20, false),
        cat("finance", "Finance", "Financial markets and economic predictions", "trending_up", "#00D2D3", 21, false),
        cat("economy", "Economy", "Economic indicators and predictions", "payments", "#FDCB6E", 22, false),
        cat("earnings", "Earnings", "Company earnings predictions", "attach_money", "#00B894", 23, false),
        cat("tech", "Tech", "Technology industry predictions", "computer", "#0984E3", 30, false),
        cat("sports", "Sports", "Sports predictions and outcomes", "sports_soccer", "#1E90FF", 40, false),
        cat("geopolitics", "Geopolitics", "Global political events and conflicts", "public", "#6C5CE7", 50, false),
        cat("world", "World", "Global events and news", "language", "#636E72", 51, false),
        cat("culture", "Culture", "Pop culture and entertainment", "movie", "#E84393", 60, false),
    ]
}

/// Keyword map for question classification. Order matters: the first
/// matching category wins.
pub const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("politics", &[
        "president", "congress", "senate", "house", "vote", "trump", "biden",
        "government", "governor", "mayor", "legislation", "bill", "law",
        "republican", "democrat", "gop", "dnc", "rnc", "white house",
    ]),
    ("elections", &[
        "election", "ballot", "primary", "nominee", "electoral", "swing state",
        "poll", "voter", "voting", "candidate", "midterm", "runoff",
    ]),
    ("crypto", &[
        "bitcoin", "btc", "ethereum", "eth", "crypto", "token", "blockchain",
        "defi", "nft", "altcoin", "stablecoin", "usdc", "usdt", "solana",
        "cardano", "dogecoin", "shiba", "binance", "coinbase", "sec crypto",
    ]),
    ("finance", &[
        "stock", "nasdaq", "dow", "s&p", "market", "trading", "investor",
        "wall street", "hedge fund", "ipo", "merger", "acquisition",
    ]),
    ("economy", &[
        "fed", "federal reserve", "interest rate", "inflation", "gdp",
        "recession", "unemployment", "jobs report", "cpi", "treasury",
        "fiscal", "monetary", "debt ceiling", "deficit",
    ]),
    ("earnings", &[
        "earnings", "revenue", "profit", "quarterly", "eps", "guidance",
        "beat", "miss", "forecast", "outlook",
    ]),
    ("tech", &[
        "ai", "artificial intelligence", "openai", "chatgpt", "google", "apple",
        "microsoft", "meta", "amazon", "tesla", "nvidia", "semiconductor",
        "chip", "software", "startup", "silicon valley", "spacex", "elon",
    ]),
    ("sports", &[
        "nfl", "nba", "mlb", "nhl", "soccer", "football", "basketball",
        "baseball", "hockey", "super bowl", "world series", "championship",
        "playoffs", "finals", "mvp", "draft", "trade", "coach",
    ]),
    ("geopolitics", &[
        "war", "conflict", "military", "nato", "russia", "ukraine", "china",
        "taiwan", "iran", "israel", "palestine", "ceasefire", "sanctions",
        "treaty", "summit", "diplomacy", "embassy",
    ]),
    ("world", &[
        "international", "global", "united nations", "un", "world",
        "foreign", "abroad", "overseas",
    ]),
    ("culture", &[
        "movie", "film", "oscars", "grammy", "emmys", "celebrity", "music",
        "album", "tour", "concert", "tv show", "streaming", "netflix",
        "disney", "marvel", "box office", "viral", "tiktok", "influencer",
    ]),
];

// ---------------------------------------------------------------------------
// Social signals
// ---------------------------------------------------------------------------

/// Attributable post by a tracked account, tied to one or more market
/// movements by keyword overlap and timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialSignal {
    pub handle: String,
    pub name: String,
    pub avatar_url: String,
    pub verified: bool,
    /// Post excerpt, capped at 280 chars.
    pub content: String,
    pub tweet_url: String,
    pub posted_at: Option<DateTime<Utc>>,
    /// Observed market impact as a signed fraction.
    pub market_impact: f64,
    /// Human-readable window label, e.g. "45m" or "2h".
    pub impact_window: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_markets: Vec<MarketMovement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketMovement {
    pub market_slug: String,
    pub market_title: String,
    pub category: String,
    pub prob_before: f64,
    pub prob_after: f64,
    pub change: f64,
    pub time_delta: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn market_with_question(q: &str) -> Market {
        Market {
            question: q.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn slug_is_deterministic() {
        let m = market_with_question("Will Bitcoin reach $100,000 by March?");
        assert_eq!(m.generate_slug(), m.generate_slug());
        assert_eq!(m.generate_slug(), "will-bitcoin-reach-usd100000-by-march");
    }

    #[test]
    fn slug_strips_forbidden_characters() {
        let slug = sanitize_slug("100% sure? $5 @ stake & more [really] #1 + extra!");
        for c in ['%', '$', '@', '#', '+', '[', ']'] {
            assert!(!slug.contains(c), "slug {slug:?} contains {c:?}");
        }
        assert!(slug.contains("percent"));
        assert!(slug.contains("usd"));
        assert!(slug.contains("and"));
    }

    #[test]
    fn slug_collapses_dashes_and_trims() {
        let slug = sanitize_slug("what -- about . . trailing? ");
        assert!(!slug.contains("--"), "slug {slug:?} has consecutive dashes");
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn slug_caps_length() {
        let long = "word ".repeat(40);
        let slug = sanitize_slug(&long);
        assert!(slug.len() <= 80, "slug is {} chars", slug.len());
    }

    #[test]
    fn classifier_first_category_wins() {
        // "president" (politics) appears before "election" (elections) in
        // declaration order, so politics wins even though both match.
        let m = market_with_question("Will the president win the election?");
        assert_eq!(m.detect_category(), "politics");
    }

    #[test]
    fn classifier_falls_back_to_other() {
        let m = market_with_question("Will it rain tomorrow in Lisbon?");
        assert_eq!(m.detect_category(), "other");
    }

    #[test]
    fn classifier_matches_crypto() {
        let m = market_with_question("Will Bitcoin close above 100k?");
        assert_eq!(m.detect_category(), "crypto");
    }

    #[test]
    fn trending_score_components() {
        let mut m = Market {
            volume_24h: 1_200_000.0,
            volume_1h: 300_000.0, // ratio 6 -> 20 pts
            change_24h: 0.16,     // 30 pts
            probability: 0.5,     // interest 10
            ..Default::default()
        };
        // 40 + 30 + 20 + 10
        assert_eq!(m.calculate_trending_score(), 100.0);

        m.probability = 1.0; // interest 10 - 10 = 0... (0.5 * 20 = 10)
        assert_eq!(m.calculate_trending_score(), 90.0);
    }

    #[test]
    fn trending_score_monotone_in_change() {
        let base = Market {
            volume_24h: 80_000.0,
            probability: 0.6,
            ..Default::default()
        };
        let mut prev = f64::MIN;
        for change in [0.0, 0.01, 0.02, 0.05, 0.10, 0.15, 0.30] {
            let m = Market { change_24h: change, ..base.clone() };
            let score = m.calculate_trending_score();
            assert!(score >= prev, "score decreased at change {change}");
            prev = score;
        }
    }

    #[test]
    fn trending_score_velocity_requires_positive_volumes() {
        let m = Market {
            volume_24h: 0.0,
            volume_1h: 10_000.0,
            probability: 0.5,
            ..Default::default()
        };
        // No volume, no movement, no velocity; interest only.
        assert_eq!(m.calculate_trending_score(), 10.0);
    }

    #[test]
    fn interest_score_can_go_negative() {
        let m = Market { probability: 0.99, ..Default::default() };
        assert!(m.calculate_trending_score() < 1.0);
    }

    #[test]
    fn default_categories_have_three_dynamic() {
        let cats = default_categories();
        assert_eq!(cats.iter().filter(|c| c.dynamic).count(), 3);
        assert_eq!(cats.len(), 14);
    }
}
