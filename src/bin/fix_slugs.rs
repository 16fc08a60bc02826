//! One-shot repair: re-derive market slugs with the canonical sanitizer and
//! rewrite rows whose stored slug disagrees.

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use marketwire::config::Config;
use marketwire::error::Result;
use marketwire::store::Store;
use marketwire::types::sanitize_slug;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .init();

    if let Err(e) = run().await {
        eprintln!("fix-slugs failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cfg = Config::from_env()?;
    let store = Store::open(&cfg.database_path).await?;

    let rows: Vec<(String, String, String)> =
        sqlx::query_as("SELECT market_id, question, slug FROM markets")
            .fetch_all(store.pool())
            .await?;

    let total = rows.len();
    let mut fixed = 0;

    for (market_id, question, slug) in rows {
        let fresh = sanitize_slug(&question);
        if fresh == slug {
            continue;
        }

        let result = sqlx::query("UPDATE markets SET slug = ? WHERE market_id = ?")
            .bind(&fresh)
            .bind(&market_id)
            .execute(store.pool())
            .await;

        match result {
            Ok(_) => {
                info!(market_id = %market_id, old = %slug, new = %fresh, "Slug repaired");
                fixed += 1;
            }
            // A collision means two distinct questions sanitize identically;
            // leave the row for manual review rather than clobbering.
            Err(e) => warn!(market_id = %market_id, "Failed to update slug: {e}"),
        }
    }

    info!(fixed, total, "Slug repair complete");
    Ok(())
}
