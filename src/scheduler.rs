//! Scheduled jobs and event-driven content generation.
//!
//! Two loops: a minute ticker that runs any job whose `next_run` has
//! arrived, and a consumer of the event-bus subscription that turns
//! qualifying market events into articles.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc, Weekday};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::article::BriefingType;
use crate::bus::{EventKind, MarketEvent};
use crate::config::{JOB_TIMEOUT, NEW_MARKET_ARTICLE_MIN_VOLUME};
use crate::content::ContentGenerator;

/// Event-driven generation deadline, shorter than the scheduled-job one.
const EVENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Threshold crossings at or beyond these lines get breaking coverage.
const EXTREME_THRESHOLD_HIGH: f64 = 0.75;
const EXTREME_THRESHOLD_LOW: f64 = 0.25;

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// What a job does. Kept as data so the job table stays inspectable.
#[derive(Debug, Clone)]
pub enum JobKind {
    Briefing(BriefingType),
    Trending { limit: i64 },
    CategoryDigest { category: String, limit: i64 },
}

#[derive(Debug, Clone)]
pub enum Schedule {
    Interval(Duration),
    /// Time of day, UTC.
    Daily { hour: u32, minute: u32 },
    /// Time of day on specific weekdays, UTC.
    Weekly { hour: u32, minute: u32, days: Vec<Weekday> },
}

#[derive(Debug)]
pub struct Job {
    pub name: String,
    pub schedule: Schedule,
    pub kind: JobKind,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
}

/// Next fire time for a schedule, strictly in the future relative to `now`.
fn next_run(schedule: &Schedule, now: DateTime<Utc>) -> DateTime<Utc> {
    let at_time = |date: chrono::NaiveDate, hour: u32, minute: u32| {
        date.and_hms_opt(hour, minute, 0)
            .map(|n| Utc.from_utc_datetime(&n))
    };

    match schedule {
        Schedule::Interval(d) => {
            now + chrono::Duration::from_std(*d).unwrap_or_else(|_| chrono::Duration::zero())
        }
        Schedule::Daily { hour, minute } => {
            let today = now.date_naive();
            match at_time(today, *hour, *minute) {
                Some(candidate) if candidate > now => candidate,
                _ => at_time(today + chrono::Duration::days(1), *hour, *minute)
                    .unwrap_or(now + chrono::Duration::hours(24)),
            }
        }
        Schedule::Weekly { hour, minute, days } => {
            let today = now.date_naive();
            for offset in 0..=7 {
                let date = today + chrono::Duration::days(offset);
                if let Some(candidate) = at_time(date, *hour, *minute) {
                    if candidate > now && days.contains(&candidate.weekday()) {
                        return candidate;
                    }
                }
            }
            now + chrono::Duration::hours(1)
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    generator: Arc<ContentGenerator>,
    jobs: RwLock<Vec<Job>>,
}

impl Scheduler {
    pub fn new(generator: Arc<ContentGenerator>) -> Arc<Self> {
        let scheduler = Arc::new(Self {
            generator,
            jobs: RwLock::new(Vec::new()),
        });
        scheduler.register_default_jobs();
        scheduler
    }

    fn register_default_jobs(&self) {
        self.add_job("morning-briefing", Schedule::Daily { hour: 8, minute: 0 },
            JobKind::Briefing(BriefingType::Morning));
        self.add_job("midday-pulse", Schedule::Daily { hour: 12, minute: 0 },
            JobKind::Briefing(BriefingType::Midday));
        self.add_job("evening-wrap", Schedule::Daily { hour: 18, minute: 0 },
            JobKind::Briefing(BriefingType::Evening));
        self.add_job(
            "weekly-digest",
            Schedule::Weekly { hour: 10, minute: 0, days: vec![Weekday::Mon] },
            JobKind::Briefing(BriefingType::Weekly),
        );
        self.add_job(
            "trending-update",
            Schedule::Interval(Duration::from_secs(2 * 3600)),
            JobKind::Trending { limit: 10 },
        );

        // One digest per category per day, staggered over consecutive hours.
        let categories = ["crypto", "politics", "tech", "sports", "finance"];
        for (i, category) in categories.iter().enumerate() {
            self.add_job(
                &format!("{category}-digest"),
                Schedule::Daily { hour: 9 + i as u32, minute: 30 },
                JobKind::CategoryDigest { category: category.to_string(), limit: 10 },
            );
        }
    }

    pub fn add_job(&self, name: &str, schedule: Schedule, kind: JobKind) {
        let next = next_run(&schedule, Utc::now());
        info!(job = name, next_run = %next, "Job registered");
        self.jobs.write().unwrap().push(Job {
            name: name.to_string(),
            schedule,
            kind,
            last_run: None,
            next_run: next,
        });
    }

    /// Spawn the job ticker and the bus-event consumer.
    pub fn start(
        self: &Arc<Self>,
        events: mpsc::Receiver<MarketEvent>,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        info!(jobs = self.jobs.read().unwrap().len(), "Starting scheduler");
        let mut handles = Vec::new();

        let scheduler = Arc::clone(self);
        let mut rx = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(60));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = ticker.tick() => scheduler.check_and_run_jobs(),
                }
            }
            debug!("job loop stopped");
        }));

        let scheduler = Arc::clone(self);
        let mut rx = shutdown.subscribe();
        let mut events = events;
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        scheduler.process_event(event).await;
                    }
                }
            }
            debug!("event loop stopped");
        }));

        handles
    }

    /// Dispatch every due job and advance its next_run. Jobs run in their
    /// own tasks so a slow one cannot hold the ticker.
    fn check_and_run_jobs(&self) {
        for (name, kind) in self.take_due_jobs(Utc::now()) {
            let generator = Arc::clone(&self.generator);
            tokio::spawn(async move {
                run_job(&generator, &name, kind).await;
            });
        }
    }

    fn take_due_jobs(&self, now: DateTime<Utc>) -> Vec<(String, JobKind)> {
        let mut due = Vec::new();
        let mut jobs = self.jobs.write().unwrap();
        for job in jobs.iter_mut() {
            if now >= job.next_run {
                due.push((job.name.clone(), job.kind.clone()));
                job.last_run = Some(now);
                job.next_run = next_run(&job.schedule, now);
                debug!(job = %job.name, next_run = %job.next_run, "Job scheduled for next run");
            }
        }
        due
    }

    /// Bus reactions: breaking moves and extreme threshold crossings get
    /// breaking coverage, qualifying new markets get a listing article,
    /// volume spikes are observed only.
    async fn process_event(&self, event: MarketEvent) {
        debug!(kind = event.kind.name(), market = %event.market.question, "Processing event");

        match &event.kind {
            EventKind::BreakingMove { .. } => {
                self.generate_breaking_with_timeout(&event).await;
            }
            EventKind::NewMarket => {
                if event.market.volume_24h >= NEW_MARKET_ARTICLE_MIN_VOLUME {
                    let result = tokio::time::timeout(
                        EVENT_TIMEOUT,
                        self.generator.generate_new_market(&event.market),
                    )
                    .await;
                    match result {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!("Failed to generate new market article: {e}"),
                        Err(_) => warn!("New market article generation timed out"),
                    }
                }
            }
            EventKind::ThresholdCross { threshold, .. } => {
                if *threshold >= EXTREME_THRESHOLD_HIGH || *threshold <= EXTREME_THRESHOLD_LOW {
                    self.generate_breaking_with_timeout(&event).await;
                }
            }
            EventKind::VolumeSpike { multiplier, .. } => {
                info!(
                    market = %event.market.question,
                    multiplier,
                    "Volume spike detected"
                );
            }
            EventKind::PriceChange { .. } | EventKind::TrendingUpdate => {}
        }
    }

    async fn generate_breaking_with_timeout(&self, event: &MarketEvent) {
        let result =
            tokio::time::timeout(EVENT_TIMEOUT, self.generator.generate_breaking(event)).await;
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Failed to generate breaking article: {e}"),
            Err(_) => warn!("Breaking article generation timed out"),
        }
    }

    // -----------------------------------------------------------------------
    // Admin surface
    // -----------------------------------------------------------------------

    /// Kick a job immediately by name. Returns false for an unknown name.
    pub fn run_job_now(&self, name: &str) -> bool {
        let kind = {
            let jobs = self.jobs.read().unwrap();
            jobs.iter().find(|j| j.name == name).map(|j| j.kind.clone())
        };
        let Some(kind) = kind else {
            return false;
        };

        let generator = Arc::clone(&self.generator);
        let name = name.to_string();
        tokio::spawn(async move {
            run_job(&generator, &name, kind).await;
        });
        true
    }

    pub fn job_status(&self) -> Vec<JobStatus> {
        self.jobs
            .read()
            .unwrap()
            .iter()
            .map(|j| JobStatus {
                name: j.name.clone(),
                last_run: j.last_run,
                next_run: j.next_run,
            })
            .collect()
    }
}

/// One job execution under the per-run deadline. A timeout is warned; the
/// next scheduled run proceeds normally.
async fn run_job(generator: &ContentGenerator, name: &str, kind: JobKind) {
    info!(job = name, "Running job");

    let work = async {
        match kind {
            JobKind::Briefing(t) => generator.generate_briefing(t).await.map(|_| ()),
            JobKind::Trending { limit } => generator.generate_trending(limit).await.map(|_| ()),
            JobKind::CategoryDigest { category, limit } => generator
                .generate_category_digest(&category, limit)
                .await
                .map(|_| ()),
        }
    };

    match tokio::time::timeout(JOB_TIMEOUT, work).await {
        Ok(Ok(())) => info!(job = name, "Job completed"),
        Ok(Err(e)) => error!(job = name, "Job failed: {e}"),
        Err(_) => warn!(job = name, "Job timed out"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::types::Market;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn interval_schedule_adds_the_interval() {
        let now = at(2026, 8, 1, 10, 0);
        let next = next_run(&Schedule::Interval(Duration::from_secs(7200)), now);
        assert_eq!(next, at(2026, 8, 1, 12, 0));
    }

    #[test]
    fn daily_schedule_picks_today_or_tomorrow() {
        let schedule = Schedule::Daily { hour: 12, minute: 0 };

        // Before noon: today at 12:00.
        assert_eq!(next_run(&schedule, at(2026, 8, 1, 9, 30)), at(2026, 8, 1, 12, 0));
        // After noon: tomorrow.
        assert_eq!(next_run(&schedule, at(2026, 8, 1, 13, 0)), at(2026, 8, 2, 12, 0));
        // Exactly at noon: tomorrow (next_run is strictly future).
        assert_eq!(next_run(&schedule, at(2026, 8, 1, 12, 0)), at(2026, 8, 2, 12, 0));
    }

    #[test]
    fn weekly_schedule_finds_next_matching_day() {
        let schedule = Schedule::Weekly { hour: 10, minute: 0, days: vec![Weekday::Mon] };

        // 2026-08-01 is a Saturday; next Monday is 08-03.
        assert_eq!(next_run(&schedule, at(2026, 8, 1, 9, 0)), at(2026, 8, 3, 10, 0));
        // On Monday before 10:00, fire that day.
        assert_eq!(next_run(&schedule, at(2026, 8, 3, 8, 0)), at(2026, 8, 3, 10, 0));
        // On Monday after 10:00, wait a week.
        assert_eq!(next_run(&schedule, at(2026, 8, 3, 11, 0)), at(2026, 8, 10, 10, 0));
    }

    async fn test_scheduler() -> (Arc<Scheduler>, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let generator = Arc::new(ContentGenerator::new(Arc::clone(&store), None, None, None));
        (Scheduler::new(generator), store)
    }

    #[tokio::test]
    async fn default_job_set_is_registered() {
        let (scheduler, _) = test_scheduler().await;
        let status = scheduler.job_status();

        // 4 briefings + trending + 5 category digests.
        assert_eq!(status.len(), 10);
        let names: Vec<&str> = status.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"morning-briefing"));
        assert!(names.contains(&"weekly-digest"));
        assert!(names.contains(&"trending-update"));
        assert!(names.contains(&"crypto-digest"));
        assert!(names.contains(&"finance-digest"));
    }

    #[tokio::test]
    async fn due_jobs_are_taken_and_rescheduled() {
        let (scheduler, _) = test_scheduler().await;

        // Far future: everything is due.
        let later = Utc::now() + chrono::Duration::days(30);
        let due = scheduler.take_due_jobs(later);
        assert_eq!(due.len(), 10);

        // Every job got a new next_run strictly after the dispatch time.
        for job in scheduler.job_status() {
            assert!(job.next_run > later, "{} not rescheduled", job.name);
            assert_eq!(job.last_run, Some(later));
        }

        // Immediately re-checking finds nothing due.
        assert!(scheduler.take_due_jobs(later).is_empty());
    }

    #[tokio::test]
    async fn run_job_now_rejects_unknown_names() {
        let (scheduler, _) = test_scheduler().await;
        assert!(!scheduler.run_job_now("does-not-exist"));
        assert!(scheduler.run_job_now("trending-update"));
    }

    #[tokio::test]
    async fn qualifying_new_market_event_produces_an_article() {
        let (scheduler, store) = test_scheduler().await;

        let mut market = Market {
            market_id: "m1".to_string(),
            question: "Will the new market rip?".to_string(),
            category: "crypto".to_string(),
            probability: 0.42,
            volume_24h: 60_000.0,
            active: true,
            ..Default::default()
        };
        market.slug = market.generate_slug();

        scheduler
            .process_event(MarketEvent::new(EventKind::NewMarket, market.clone()))
            .await;
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_articles, 1, "60k volume qualifies");

        // Below the volume floor: observed, not covered.
        market.market_id = "m2".to_string();
        market.volume_24h = 40_000.0;
        scheduler
            .process_event(MarketEvent::new(EventKind::NewMarket, market))
            .await;
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_articles, 1);
    }

    #[tokio::test]
    async fn mid_range_threshold_cross_is_not_breaking() {
        let (scheduler, store) = test_scheduler().await;
        let market = Market {
            market_id: "m1".to_string(),
            question: "Q?".to_string(),
            probability: 0.52,
            ..Default::default()
        };

        // 0.50 crossing: no breaking article (and no LLM either way).
        scheduler
            .process_event(MarketEvent::new(
                EventKind::ThresholdCross { threshold: 0.50, direction: crate::bus::Direction::Up },
                market,
            ))
            .await;
        assert_eq!(store.stats().await.unwrap().total_articles, 0);
    }
}
