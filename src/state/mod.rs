mod market_cache;

pub use market_cache::MarketCache;
