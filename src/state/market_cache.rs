use dashmap::DashMap;

use crate::types::Market;

// ---------------------------------------------------------------------------
// MarketCache
// ---------------------------------------------------------------------------

/// Process-local mirror of active markets, keyed by `market_id`.
///
/// The syncer's sync pass is the only writer; readers are the syncer's
/// snapshot pass and admin queries. Rebuilt from the Store on start, so a
/// restart reproduces the same cache.
pub struct MarketCache {
    markets: DashMap<String, Market>,
}

impl MarketCache {
    pub fn new() -> Self {
        Self {
            markets: DashMap::new(),
        }
    }

    pub fn get(&self, market_id: &str) -> Option<Market> {
        self.markets.get(market_id).map(|m| m.clone())
    }

    pub fn contains(&self, market_id: &str) -> bool {
        self.markets.contains_key(market_id)
    }

    pub fn insert(&self, market: Market) {
        self.markets.insert(market.market_id.clone(), market);
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn load(&self, markets: Vec<Market>) {
        for market in markets {
            self.insert(market);
        }
    }

    pub fn all(&self) -> Vec<Market> {
        self.markets.iter().map(|e| e.value().clone()).collect()
    }

    /// Top-N active, open markets by trending score.
    pub fn trending(&self, limit: usize) -> Vec<Market> {
        let mut markets: Vec<Market> = self
            .markets
            .iter()
            .filter(|e| e.value().active && !e.value().closed)
            .map(|e| e.value().clone())
            .collect();

        markets.sort_by(|a, b| {
            b.trending_score
                .partial_cmp(&a.trending_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        markets.truncate(limit);
        markets
    }

    /// Recompute trending scores in place for every cached market.
    pub fn recalculate_trending(&self) {
        for mut entry in self.markets.iter_mut() {
            let score = entry.value().calculate_trending_score();
            entry.value_mut().trending_score = score;
        }
    }
}

impl Default for MarketCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
