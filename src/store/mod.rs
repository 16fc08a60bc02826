//! SQLite persistence for markets, snapshots, articles, and categories.
//!
//! All queries are runtime-checked (`query_as` + row types in [`models`]).
//! `open` runs migrations and seeds the default categories, both idempotent.

pub mod models;

use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::article::{Article, ArticleType};
use crate::error::{AppError, Result};
use crate::types::{default_categories, Category, Market, Snapshot};
use models::{ArticleRow, CategoryRow, MarketRow, SnapshotRow};

const MARKET_COLUMNS: &str = "market_id, condition_id, slug, group_item_title, question, description, \
     image, icon, category, tags, polymarket_tags, probability, previous_prob, \
     change_24h, change_7d, last_trade_price, volume_1h, volume_24h, volume_7d, \
     total_volume, event_volume, event_volume_24h, event_title, comment_count, \
     series_slug, liquidity, active, closed, archived, accepting_bid, start_date, \
     end_date, resolution_source, competitor_count, outcomes, outcome_prices, \
     trending_score, polymarket_url, first_seen_at, updated_at";

const ARTICLE_COLUMNS: &str = "slug, article_type, category, headline, subheadline, summary, body, markets, \
     primary_market, social_signals, tags, significance, sentiment, meta_title, \
     meta_description, views, published, featured, enrichment_sources, created_at, \
     published_at, updated_at";

#[derive(Debug, serde::Serialize)]
pub struct Stats {
    pub total_markets: i64,
    pub active_markets: i64,
    pub total_articles: i64,
    pub today_articles: i64,
    pub total_snapshots: i64,
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if missing) the database file, runs migrations, and
    /// seeds default categories. No connectivity here is fatal to start-up.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self::init(pool).await?;
        info!(path, "Database ready");
        Ok(store)
    }

    /// In-memory database for tests. A single connection keeps the database
    /// alive for the pool's lifetime.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        let store = Self { pool };
        store.seed_categories().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn seed_categories(&self) -> Result<()> {
        for cat in default_categories() {
            sqlx::query(
                "INSERT INTO categories (slug, name, description, icon, color, sort_order, dynamic) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(slug) DO NOTHING",
            )
            .bind(&cat.slug)
            .bind(&cat.name)
            .bind(&cat.description)
            .bind(&cat.icon)
            .bind(&cat.color)
            .bind(cat.order)
            .bind(cat.dynamic)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Markets
    // -----------------------------------------------------------------------

    /// Insert or replace a market keyed by `market_id`. `updated_at` is
    /// stamped now; `first_seen_at` is written once and then preserved.
    pub async fn upsert_market(&self, m: &Market) -> Result<()> {
        let now = Utc::now().timestamp();
        let first_seen = m.first_seen_at.map(|t| t.timestamp()).unwrap_or(now);

        let sql = format!(
            "INSERT INTO markets ({MARKET_COLUMNS}) VALUES \
             (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
              ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(market_id) DO UPDATE SET \
             condition_id = excluded.condition_id, \
             slug = excluded.slug, \
             group_item_title = excluded.group_item_title, \
             question = excluded.question, \
             description = excluded.description, \
             image = excluded.image, \
             icon = excluded.icon, \
             category = excluded.category, \
             tags = excluded.tags, \
             polymarket_tags = excluded.polymarket_tags, \
             probability = excluded.probability, \
             previous_prob = excluded.previous_prob, \
             change_24h = excluded.change_24h, \
             change_7d = excluded.change_7d, \
             last_trade_price = excluded.last_trade_price, \
             volume_1h = excluded.volume_1h, \
             volume_24h = excluded.volume_24h, \
             volume_7d = excluded.volume_7d, \
             total_volume = excluded.total_volume, \
             event_volume = excluded.event_volume, \
             event_volume_24h = excluded.event_volume_24h, \
             event_title = excluded.event_title, \
             comment_count = excluded.comment_count, \
             series_slug = excluded.series_slug, \
             liquidity = excluded.liquidity, \
             active = excluded.active, \
             closed = excluded.closed, \
             archived = excluded.archived, \
             accepting_bid = excluded.accepting_bid, \
             start_date = excluded.start_date, \
             end_date = excluded.end_date, \
             resolution_source = excluded.resolution_source, \
             competitor_count = excluded.competitor_count, \
             outcomes = excluded.outcomes, \
             outcome_prices = excluded.outcome_prices, \
             trending_score = excluded.trending_score, \
             polymarket_url = excluded.polymarket_url, \
             first_seen_at = CASE WHEN markets.first_seen_at = 0 \
                 THEN excluded.first_seen_at ELSE markets.first_seen_at END, \
             updated_at = excluded.updated_at"
        );

        sqlx::query(&sql)
            .bind(&m.market_id)
            .bind(&m.condition_id)
            .bind(&m.slug)
            .bind(&m.group_item_title)
            .bind(&m.question)
            .bind(&m.description)
            .bind(&m.image)
            .bind(&m.icon)
            .bind(&m.category)
            .bind(serde_json::to_string(&m.tags)?)
            .bind(serde_json::to_string(&m.polymarket_tags)?)
            .bind(m.probability)
            .bind(m.previous_prob)
            .bind(m.change_24h)
            .bind(m.change_7d)
            .bind(m.last_trade_price)
            .bind(m.volume_1h)
            .bind(m.volume_24h)
            .bind(m.volume_7d)
            .bind(m.total_volume)
            .bind(m.event_volume)
            .bind(m.event_volume_24h)
            .bind(&m.event_title)
            .bind(m.comment_count)
            .bind(&m.series_slug)
            .bind(m.liquidity)
            .bind(m.active)
            .bind(m.closed)
            .bind(m.archived)
            .bind(m.accepting_bid)
            .bind(&m.start_date)
            .bind(&m.end_date)
            .bind(&m.resolution_source)
            .bind(m.competitor_count)
            .bind(serde_json::to_string(&m.outcomes)?)
            .bind(serde_json::to_string(&m.outcome_prices)?)
            .bind(m.trending_score)
            .bind(&m.polymarket_url)
            .bind(first_seen)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn market_by_id(&self, market_id: &str) -> Result<Option<Market>> {
        let sql = format!("SELECT {MARKET_COLUMNS} FROM markets WHERE market_id = ?");
        let row = sqlx::query_as::<_, MarketRow>(&sql)
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Market::from))
    }

    pub async fn market_by_slug(&self, slug: &str) -> Result<Option<Market>> {
        let sql = format!("SELECT {MARKET_COLUMNS} FROM markets WHERE slug = ?");
        let row = sqlx::query_as::<_, MarketRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Market::from))
    }

    /// Top-N by trending score among active, open markets.
    pub async fn trending_markets(&self, limit: i64) -> Result<Vec<Market>> {
        let sql = format!(
            "SELECT {MARKET_COLUMNS} FROM markets \
             WHERE active = 1 AND closed = 0 \
             ORDER BY trending_score DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, MarketRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Market::from).collect())
    }

    /// Top-N by 24h volume within one category, active and open.
    pub async fn markets_by_category(&self, category: &str, limit: i64) -> Result<Vec<Market>> {
        let sql = format!(
            "SELECT {MARKET_COLUMNS} FROM markets \
             WHERE category = ? AND active = 1 AND closed = 0 \
             ORDER BY volume_24h DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, MarketRow>(&sql)
            .bind(category)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Market::from).collect())
    }

    /// Markets first seen within `within`, newest first, active.
    pub async fn new_markets(&self, within: Duration, limit: i64) -> Result<Vec<Market>> {
        let cutoff = (Utc::now() - within).timestamp();
        let sql = format!(
            "SELECT {MARKET_COLUMNS} FROM markets \
             WHERE first_seen_at >= ? AND active = 1 AND closed = 0 \
             ORDER BY first_seen_at DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, MarketRow>(&sql)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Market::from).collect())
    }

    /// Markets with |change_24h| >= threshold, active, largest change first.
    pub async fn breaking_markets(&self, threshold: f64, limit: i64) -> Result<Vec<Market>> {
        let sql = format!(
            "SELECT {MARKET_COLUMNS} FROM markets \
             WHERE (change_24h >= ? OR change_24h <= ?) AND active = 1 AND closed = 0 \
             ORDER BY change_24h DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, MarketRow>(&sql)
            .bind(threshold)
            .bind(-threshold)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Market::from).collect())
    }

    pub async fn top_markets_by_volume(&self, limit: i64) -> Result<Vec<Market>> {
        let sql = format!(
            "SELECT {MARKET_COLUMNS} FROM markets \
             WHERE active = 1 AND closed = 0 \
             ORDER BY volume_24h DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, MarketRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Market::from).collect())
    }

    /// Every active, open market. Used to rebuild the syncer cache on start.
    pub async fn all_active_markets(&self) -> Result<Vec<Market>> {
        let sql = format!(
            "SELECT {MARKET_COLUMNS} FROM markets WHERE active = 1 AND closed = 0"
        );
        let rows = sqlx::query_as::<_, MarketRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Market::from).collect())
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Append a snapshot, stamping `captured_at` now.
    pub async fn save_snapshot(&self, s: &Snapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO snapshots (market_id, probability, volume_24h, total_volume, liquidity, captured_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&s.market_id)
        .bind(s.probability)
        .bind(s.volume_24h)
        .bind(s.total_volume)
        .bind(s.liquidity)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn snapshots_for(&self, market_id: &str, since: Duration) -> Result<Vec<Snapshot>> {
        let cutoff = (Utc::now() - since).timestamp();
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT market_id, probability, volume_24h, total_volume, liquidity, captured_at \
             FROM snapshots WHERE market_id = ? AND captured_at >= ? \
             ORDER BY captured_at DESC",
        )
        .bind(market_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Snapshot::from).collect())
    }

    pub async fn latest_snapshot(&self, market_id: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT market_id, probability, volume_24h, total_volume, liquidity, captured_at \
             FROM snapshots WHERE market_id = ? \
             ORDER BY captured_at DESC LIMIT 1",
        )
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Snapshot::from))
    }

    /// Delete snapshots older than `age`. Returns the number removed.
    pub async fn clean_old_snapshots(&self, age: Duration) -> Result<u64> {
        let cutoff = (Utc::now() - age).timestamp();
        let result = sqlx::query("DELETE FROM snapshots WHERE captured_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Articles
    // -----------------------------------------------------------------------

    /// Insert a new article. A duplicate slug is a defined error
    /// ([`AppError::SlugConflict`]) so generators can detect re-runs.
    pub async fn save_article(&self, a: &Article) -> Result<()> {
        let now = Utc::now().timestamp();
        let published_at = match a.published_at {
            Some(t) => t.timestamp(),
            None if a.published => now,
            None => 0,
        };

        let sql = format!(
            "INSERT INTO articles ({ARTICLE_COLUMNS}) VALUES \
             (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );

        let result = sqlx::query(&sql)
            .bind(&a.slug)
            .bind(a.article_type.as_str())
            .bind(&a.category)
            .bind(&a.headline)
            .bind(&a.subheadline)
            .bind(&a.summary)
            .bind(serde_json::to_string(&a.body)?)
            .bind(serde_json::to_string(&a.markets)?)
            .bind(
                a.primary_market
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            )
            .bind(serde_json::to_string(&a.social_signals)?)
            .bind(serde_json::to_string(&a.tags)?)
            .bind(a.significance.to_string())
            .bind(a.sentiment.to_string())
            .bind(&a.meta_title)
            .bind(&a.meta_description)
            .bind(a.views)
            .bind(a.published)
            .bind(a.featured)
            .bind(serde_json::to_string(&a.enrichment_sources)?)
            .bind(now)
            .bind(published_at)
            .bind(now)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::SlugConflict(a.slug.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Update the mutable parts of an article: market refs, flags, body.
    pub async fn update_article(&self, a: &Article) -> Result<()> {
        sqlx::query(
            "UPDATE articles SET \
             body = ?, markets = ?, primary_market = ?, social_signals = ?, \
             published = ?, featured = ?, updated_at = ? \
             WHERE slug = ?",
        )
        .bind(serde_json::to_string(&a.body)?)
        .bind(serde_json::to_string(&a.markets)?)
        .bind(
            a.primary_market
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(serde_json::to_string(&a.social_signals)?)
        .bind(a.published)
        .bind(a.featured)
        .bind(Utc::now().timestamp())
        .bind(&a.slug)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE slug = ?");
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Article::from))
    }

    pub async fn recent_articles(&self, limit: i64) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE published = 1 ORDER BY published_at DESC LIMIT ?"
        );
        self.fetch_articles(&sql, None, limit).await
    }

    pub async fn articles_by_type(&self, t: ArticleType, limit: i64) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE article_type = ? AND published = 1 \
             ORDER BY published_at DESC LIMIT ?"
        );
        self.fetch_articles(&sql, Some(t.as_str()), limit).await
    }

    pub async fn articles_by_category(&self, category: &str, limit: i64) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE category = ? AND published = 1 \
             ORDER BY published_at DESC LIMIT ?"
        );
        self.fetch_articles(&sql, Some(category), limit).await
    }

    pub async fn featured_articles(&self, limit: i64) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE featured = 1 AND published = 1 \
             ORDER BY published_at DESC LIMIT ?"
        );
        self.fetch_articles(&sql, None, limit).await
    }

    pub async fn today_articles(&self) -> Result<Vec<Article>> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(0);
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE published_at >= ? AND published = 1 \
             ORDER BY published_at DESC"
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(midnight)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// Atomic view-count bump. Failures are logged, never surfaced: a read
    /// request must not fail because the counter write did.
    pub async fn increment_article_views(&self, slug: &str) {
        let result = sqlx::query("UPDATE articles SET views = views + 1 WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            warn!(slug, "failed to increment article views: {e}");
        }
    }

    async fn fetch_articles(
        &self,
        sql: &str,
        filter: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Article>> {
        let mut query = sqlx::query_as::<_, ArticleRow>(sql);
        if let Some(f) = filter {
            query = query.bind(f.to_string());
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Article::from).collect())
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    pub async fn categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT slug, name, description, icon, color, sort_order, dynamic \
             FROM categories ORDER BY sort_order ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    pub async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT slug, name, description, icon, color, sort_order, dynamic \
             FROM categories WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Category::from))
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub async fn stats(&self) -> Result<Stats> {
        let total_markets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM markets")
            .fetch_one(&self.pool)
            .await?;
        let active_markets: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM markets WHERE active = 1 AND closed = 0")
                .fetch_one(&self.pool)
                .await?;
        let total_articles: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE published = 1")
                .fetch_one(&self.pool)
                .await?;
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(0);
        let today_articles: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM articles WHERE published_at >= ? AND published = 1",
        )
        .bind(midnight)
        .fetch_one(&self.pool)
        .await?;
        let total_snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
            .fetch_one(&self.pool)
            .await?;

        Ok(Stats {
            total_markets,
            active_markets,
            total_articles,
            today_articles,
            total_snapshots,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
