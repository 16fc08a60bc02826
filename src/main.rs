//! marketwire: watches prediction markets and generates editorial content.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use marketwire::api::{router, ApiState};
use marketwire::bus::EventBus;
use marketwire::config::Config;
use marketwire::content::ContentGenerator;
use marketwire::enrich::{Enricher, EnricherConfig};
use marketwire::error::Result;
use marketwire::llm::{LlmClient, LlmConfig};
use marketwire::polymarket::PolymarketClient;
use marketwire::scheduler::Scheduler;
use marketwire::social::{CorrelationConfig, Correlator, XtrackerClient};
use marketwire::store::Store;
use marketwire::syncer::{Syncer, SyncerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    let filter = if cfg.debug { "debug".to_string() } else { cfg.log_level.clone() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&filter))
        .init();

    info!("marketwire - starting content engine");

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Storage (fatal if unreachable) ---
    let store = Arc::new(Store::open(&cfg.database_path).await?);

    // --- Outbound clients ---
    let client = PolymarketClient::new()?;
    info!("Polymarket client initialized");

    let llm = if cfg.llm_configured() {
        info!(model = %cfg.llm_model, "LLM client initialized");
        Some(Arc::new(LlmClient::new(LlmConfig {
            api_key: cfg.llm_api_key.clone(),
            endpoint: cfg.llm_endpoint.clone(),
            model: cfg.llm_model.clone(),
        })?))
    } else {
        warn!("LLM client not initialized (no API key); briefing-style articles use templated copy");
        None
    };

    let enricher = if cfg.enable_enrichment {
        let enricher = Enricher::new(EnricherConfig {
            tavily_api_key: cfg.tavily_api_key.clone(),
            exa_api_key: cfg.exa_api_key.clone(),
            firecrawl_api_key: cfg.firecrawl_api_key.clone(),
            ..Default::default()
        })?;
        if enricher.any_enabled() {
            info!("Enrichment pipeline initialized");
            Some(Arc::new(enricher))
        } else {
            None
        }
    } else {
        None
    };

    let correlator = Some(Arc::new(Correlator::new(
        XtrackerClient::new(Some(cfg.xtracker_base_url.clone()))?,
        Arc::clone(&store),
        CorrelationConfig::default(),
    )));

    // --- Core pipeline ---
    let bus = EventBus::new();

    let syncer = Syncer::new(
        client,
        Arc::clone(&store),
        Arc::clone(&bus),
        SyncerConfig {
            sync_interval: cfg.poll_interval,
            breaking_threshold: cfg.min_probability_change,
            min_volume_24h: cfg.min_volume_24h,
            ..Default::default()
        },
    );
    info!("Market syncer initialized");

    let generator = Arc::new(ContentGenerator::new(
        Arc::clone(&store),
        llm,
        enricher,
        correlator,
    ));
    let scheduler = Scheduler::new(generator);
    info!("Scheduler initialized");

    // --- Start everything ---
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let scheduler_events = bus.subscribe();

    let mut handles = Vec::new();
    handles.push(bus.start_dispatcher(shutdown_tx.subscribe()));
    syncer.warm_cache().await;
    handles.extend(syncer.start(&shutdown_tx));
    handles.extend(scheduler.start(scheduler_events, &shutdown_tx));

    let api_state = ApiState {
        store: Arc::clone(&store),
        syncer: Some(Arc::clone(&syncer)),
        scheduler: Some(Arc::clone(&scheduler)),
    };
    let listener = tokio::net::TcpListener::bind(&cfg.http_addr).await?;
    info!(addr = %cfg.http_addr, "HTTP API listening");

    let mut server_shutdown = shutdown_tx.subscribe();
    let server = axum::serve(listener, router(api_state)).with_graceful_shutdown(async move {
        let _ = server_shutdown.recv().await;
    });
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("API server error: {e}");
        }
    });

    info!("marketwire engine running");

    // --- Graceful shutdown ---
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(());
    for handle in handles {
        let _ = handle.await;
    }
    let _ = server_handle.await;

    info!("marketwire engine stopped");
    Ok(())
}
