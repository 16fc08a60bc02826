mod client;
mod correlator;

pub use client::{DailyMetric, Post, TrackedUser, Tracking, XtrackerClient};
pub use correlator::{CorrelationConfig, Correlator};
