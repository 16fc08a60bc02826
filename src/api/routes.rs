//! Read-only HTTP API over the Store, plus admin endpoints for the syncer
//! and scheduler.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::article::ArticleType;
use crate::error::AppError;
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::syncer::Syncer;

/// Hard cap on list sizes regardless of the query string.
const MAX_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<Store>,
    pub syncer: Option<Arc<Syncer>>,
    pub scheduler: Option<Arc<Scheduler>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/feed", get(home_feed))
        .route("/api/articles", get(articles))
        .route("/api/articles/today", get(today_articles))
        .route("/api/articles/breaking", get(breaking_articles))
        .route("/api/articles/trending", get(trending_articles))
        .route("/api/articles/featured", get(featured_articles))
        .route("/api/articles/type/:type", get(articles_by_type))
        .route("/api/articles/category/:category", get(articles_by_category))
        .route("/api/articles/:slug", get(article_by_slug))
        .route("/api/markets", get(markets))
        .route("/api/markets/trending", get(trending_markets))
        .route("/api/markets/breaking", get(breaking_markets))
        .route("/api/markets/new", get(new_markets))
        .route("/api/markets/category/:category", get(markets_by_category))
        .route("/api/markets/:slug", get(market_by_slug))
        .route("/api/categories", get(categories))
        .route("/api/categories/:slug", get(category_by_slug))
        .route("/api/admin/sync", post(admin_sync))
        .route("/api/admin/debug", get(admin_debug))
        .route("/api/admin/jobs", get(admin_jobs))
        .route("/api/admin/jobs/:name/run", post(admin_run_job))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

fn clamp_limit(q: &LimitQuery, default: i64) -> i64 {
    match q.limit {
        Some(l) if l > 0 => l.min(MAX_LIMIT),
        _ => default,
    }
}

// ---------------------------------------------------------------------------
// Health / stats / feed
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "marketwire"}))
}

async fn stats(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, AppError> {
    let stats = state.store.stats().await?;
    Ok(Json(serde_json::to_value(stats)?))
}

/// Curated homepage payload: featured (falling back to breaking), recent,
/// trending markets, and today's output.
async fn home_feed(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, AppError> {
    let mut featured = state.store.featured_articles(3).await?;
    if featured.is_empty() {
        featured = state.store.articles_by_type(ArticleType::Breaking, 3).await?;
    }
    let recent = state.store.recent_articles(10).await?;
    let trending_markets = state.store.trending_markets(10).await?;
    let today = state.store.today_articles().await?;

    Ok(Json(json!({
        "featured": featured,
        "recent": recent,
        "trending_markets": trending_markets,
        "today": today,
    })))
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

async fn articles(
    State(state): State<ApiState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let articles = state.store.recent_articles(clamp_limit(&q, 20)).await?;
    Ok(Json(json!({"count": articles.len(), "articles": articles})))
}

async fn article_by_slug(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let article = state
        .store
        .article_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("article {slug}")))?;

    // Best effort; the read must not fail on the counter write.
    state.store.increment_article_views(&slug).await;

    Ok(Json(article).into_response())
}

async fn today_articles(
    State(state): State<ApiState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let articles = state.store.today_articles().await?;
    Ok(Json(json!({"count": articles.len(), "articles": articles})))
}

async fn breaking_articles(
    State(state): State<ApiState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let articles = state
        .store
        .articles_by_type(ArticleType::Breaking, clamp_limit(&q, 10))
        .await?;
    Ok(Json(json!({"count": articles.len(), "articles": articles})))
}

async fn trending_articles(
    State(state): State<ApiState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let articles = state
        .store
        .articles_by_type(ArticleType::Trending, clamp_limit(&q, 10))
        .await?;
    Ok(Json(json!({"count": articles.len(), "articles": articles})))
}

async fn featured_articles(
    State(state): State<ApiState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let articles = state.store.featured_articles(clamp_limit(&q, 5)).await?;
    Ok(Json(json!({"count": articles.len(), "articles": articles})))
}

async fn articles_by_type(
    State(state): State<ApiState>,
    Path(type_str): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let article_type = ArticleType::parse(&type_str)
        .ok_or_else(|| AppError::NotFound(format!("article type {type_str}")))?;
    let articles = state
        .store
        .articles_by_type(article_type, clamp_limit(&q, 20))
        .await?;
    Ok(Json(json!({"count": articles.len(), "type": type_str, "articles": articles})))
}

async fn articles_by_category(
    State(state): State<ApiState>,
    Path(category): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let articles = state
        .store
        .articles_by_category(&category, clamp_limit(&q, 20))
        .await?;
    Ok(Json(json!({"count": articles.len(), "category": category, "articles": articles})))
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

async fn markets(
    State(state): State<ApiState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let markets = state.store.top_markets_by_volume(clamp_limit(&q, 50)).await?;
    Ok(Json(json!({"count": markets.len(), "markets": markets})))
}

async fn market_by_slug(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let market = state
        .store
        .market_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("market {slug}")))?;
    Ok(Json(market).into_response())
}

async fn trending_markets(
    State(state): State<ApiState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let markets = state.store.trending_markets(clamp_limit(&q, 20)).await?;
    Ok(Json(json!({"count": markets.len(), "markets": markets})))
}

async fn breaking_markets(
    State(state): State<ApiState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let markets = state.store.breaking_markets(0.05, clamp_limit(&q, 20)).await?;
    Ok(Json(json!({"count": markets.len(), "markets": markets})))
}

async fn new_markets(
    State(state): State<ApiState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let markets = state
        .store
        .new_markets(chrono::Duration::days(7), clamp_limit(&q, 20))
        .await?;
    Ok(Json(json!({"count": markets.len(), "markets": markets})))
}

async fn markets_by_category(
    State(state): State<ApiState>,
    Path(category): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let markets = state
        .store
        .markets_by_category(&category, clamp_limit(&q, 20))
        .await?;
    Ok(Json(json!({"count": markets.len(), "category": category, "markets": markets})))
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

async fn categories(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, AppError> {
    let categories = state.store.categories().await?;
    Ok(Json(json!({"count": categories.len(), "categories": categories})))
}

async fn category_by_slug(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let category = state
        .store
        .category_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("category {slug}")))?;

    let markets = state.store.markets_by_category(&slug, 10).await.unwrap_or_default();
    let articles = state.store.articles_by_category(&slug, 10).await.unwrap_or_default();

    Ok(Json(json!({
        "category": category,
        "markets": markets,
        "articles": articles,
    })))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

async fn admin_sync(State(state): State<ApiState>) -> Response {
    let Some(syncer) = &state.syncer else {
        return service_unavailable("Syncer not available");
    };

    let syncer = Arc::clone(syncer);
    tokio::spawn(async move { syncer.sync_now().await });

    Json(json!({"status": "ok", "message": "Sync triggered"})).into_response()
}

async fn admin_debug(State(state): State<ApiState>) -> Response {
    let Some(syncer) = &state.syncer else {
        return service_unavailable("Syncer not available");
    };

    let markets = syncer.trending_from_cache(20);
    Json(json!({
        "cached_market_count": syncer.cached_market_count(),
        "markets": markets,
    }))
    .into_response()
}

async fn admin_jobs(State(state): State<ApiState>) -> Response {
    let Some(scheduler) = &state.scheduler else {
        return service_unavailable("Scheduler not available");
    };

    let jobs = scheduler.job_status();
    Json(json!({"count": jobs.len(), "jobs": jobs})).into_response()
}

async fn admin_run_job(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    let Some(scheduler) = &state.scheduler else {
        return service_unavailable("Scheduler not available");
    };

    if !scheduler.run_job_now(&name) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Job not found: {name}")})),
        )
            .into_response();
    }

    Json(json!({"status": "ok", "message": format!("Job triggered: {name}")})).into_response()
}

fn service_unavailable(message: &str) -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": message}))).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
