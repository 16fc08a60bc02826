//! In-process pub/sub between the syncer and its consumers.
//!
//! Delivery is lossy by design: emission and per-subscriber forwarding are
//! both try_send. A full queue drops the event with a warning rather than
//! stalling the ingest loop; the next sync tick mostly re-derives what was
//! missed.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{EVENT_QUEUE_CAPACITY, SUBSCRIBER_QUEUE_CAPACITY};
use crate::types::{Market, Snapshot};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Event kind plus its typed metadata.
#[derive(Debug, Clone)]
pub enum EventKind {
    NewMarket,
    PriceChange {
        previous: f64,
        current: f64,
    },
    BreakingMove {
        previous: f64,
        current: f64,
        change: f64,
    },
    VolumeSpike {
        previous_volume: f64,
        current_volume: f64,
        multiplier: f64,
    },
    ThresholdCross {
        threshold: f64,
        direction: Direction,
    },
    TrendingUpdate,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::NewMarket => "new_market",
            EventKind::PriceChange { .. } => "price_change",
            EventKind::BreakingMove { .. } => "breaking_move",
            EventKind::VolumeSpike { .. } => "volume_spike",
            EventKind::ThresholdCross { .. } => "threshold_cross",
            EventKind::TrendingUpdate => "trending_update",
        }
    }
}

/// A market event as seen by subscribers. `market` is the state the syncer
/// cache holds immediately after emission.
#[derive(Debug, Clone)]
pub struct MarketEvent {
    pub kind: EventKind,
    pub market: Market,
    pub previous: Option<Snapshot>,
    pub timestamp: DateTime<Utc>,
}

impl MarketEvent {
    pub fn new(kind: EventKind, market: Market) -> Self {
        Self {
            kind,
            market,
            previous: None,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Single producer, N subscribers. The dispatcher task moves events from the
/// producer queue to every subscriber channel.
pub struct EventBus {
    tx: mpsc::Sender<MarketEvent>,
    rx: Mutex<Option<mpsc::Receiver<MarketEvent>>>,
    subscribers: RwLock<Vec<mpsc::Sender<MarketEvent>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        Arc::new(Self {
            tx,
            rx: Mutex::new(Some(rx)),
            subscribers: RwLock::new(Vec::new()),
        })
    }

    /// Register a new subscriber. Each subscriber gets its own bounded
    /// channel; a slow subscriber loses events, it never stalls the bus.
    pub fn subscribe(&self) -> mpsc::Receiver<MarketEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.write().unwrap().push(tx);
        rx
    }

    /// Non-blocking enqueue. A full producer queue drops the event.
    pub fn emit(&self, event: MarketEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ev)) => {
                warn!(kind = ev.kind.name(), "event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event queue closed, dropping event");
            }
        }
    }

    /// Spawn the dispatcher loop. Exits on shutdown or when the producer
    /// side closes; subscriber channels close when the bus is dropped.
    pub fn start_dispatcher(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        let mut rx = bus
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("dispatcher already started");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        bus.dispatch(event);
                    }
                }
            }
            debug!("event dispatcher stopped");
        })
    }

    fn dispatch(&self, event: MarketEvent) {
        let subscribers = self.subscribers.read().unwrap();
        for sub in subscribers.iter() {
            match sub.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(kind = event.kind.name(), "subscriber channel full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Market;
    use std::time::Duration;

    fn event(kind: EventKind) -> MarketEvent {
        MarketEvent::new(
            kind,
            Market {
                market_id: "m1".to_string(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn events_fan_out_to_all_subscribers() {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let bus = EventBus::new();
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();
        let handle = bus.start_dispatcher(shutdown_tx.subscribe());

        bus.emit(event(EventKind::NewMarket));
        bus.emit(event(EventKind::TrendingUpdate));

        let got_a = sub_a.recv().await.unwrap();
        assert_eq!(got_a.kind.name(), "new_market");
        let got_a2 = sub_a.recv().await.unwrap();
        assert_eq!(got_a2.kind.name(), "trending_update");

        assert_eq!(sub_b.recv().await.unwrap().kind.name(), "new_market");
        assert_eq!(sub_b.recv().await.unwrap().kind.name(), "trending_update");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn slow_subscriber_drops_excess_events() {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        // Queue more events than the subscriber channel can hold before the
        // dispatcher runs, so the overflow deterministically hits a full
        // channel.
        let total = SUBSCRIBER_QUEUE_CAPACITY + 50;
        for _ in 0..total {
            bus.emit(event(EventKind::NewMarket));
        }

        let handle = bus.start_dispatcher(shutdown_tx.subscribe());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut received = 0;
        while sub.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_QUEUE_CAPACITY, "overflow must be dropped");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_the_dispatcher() {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let bus = EventBus::new();
        let handle = bus.start_dispatcher(shutdown_tx.subscribe());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("dispatcher must exit on shutdown")
            .unwrap();
    }

    #[test]
    fn event_kind_names_match_wire_names() {
        assert_eq!(EventKind::NewMarket.name(), "new_market");
        assert_eq!(
            EventKind::BreakingMove { previous: 0.4, current: 0.5, change: 0.1 }.name(),
            "breaking_move"
        );
        assert_eq!(
            EventKind::ThresholdCross { threshold: 0.5, direction: Direction::Up }.name(),
            "threshold_cross"
        );
        assert_eq!(Direction::Up.to_string(), "up");
        assert_eq!(Direction::Down.to_string(), "down");
    }
}
