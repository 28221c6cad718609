#![allow(dead_code)]
//! Shared helpers for the engine's integration tests.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use accrual_client::{AccrualApiError, AccrualOutcome, AccrualResult, AccrualStatus};
use async_trait::async_trait;
use log::*;
use loyalty_common::{OrderNumber, Points};
use loyalty_engine::{
    db_types::OrderStatusType,
    AccrualLookup,
    BackoffPolicy,
    DispatcherConfig,
    JobDispatcher,
    JobStatsSnapshot,
    OrderManagement,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub async fn prepare_test_db() -> Arc<SqliteDatabase> {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let url = format!("sqlite://{}/loyalty_it_{}.db", std::env::temp_dir().display(), rand::random::<u64>());
    if Sqlite::database_exists(&url).await.unwrap_or(false) {
        Sqlite::drop_database(&url).await.expect("Error dropping database");
    }
    Sqlite::create_database(&url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
    db.migrate().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    Arc::new(db)
}

/// Short delays everywhere, so that tests run in milliseconds rather than seconds.
pub fn fast_config() -> DispatcherConfig {
    DispatcherConfig {
        queue_size: 16,
        max_concurrent_jobs: 8,
        job_timeout: Duration::from_secs(30),
        poll_interval: Duration::from_millis(10),
        rate_limit_backoff: BackoffPolicy::fixed(Duration::from_millis(50)),
        transport_backoff: BackoffPolicy::exponential(Duration::from_millis(10), Duration::from_millis(40), 3),
    }
}

pub fn number(s: &str) -> OrderNumber {
    s.parse().expect("test order numbers are Luhn-valid")
}

pub fn registered(n: &str) -> AccrualOutcome {
    AccrualOutcome::Result(AccrualResult::new(&number(n), AccrualStatus::Registered))
}

pub fn unregistered() -> AccrualOutcome {
    AccrualOutcome::Unregistered
}

pub fn processing(n: &str) -> AccrualOutcome {
    AccrualOutcome::Result(AccrualResult::new(&number(n), AccrualStatus::Processing))
}

pub fn processed(n: &str, points: i64) -> AccrualOutcome {
    AccrualOutcome::Result(AccrualResult::processed(&number(n), Points::from_whole(points)))
}

pub fn invalid(n: &str) -> AccrualOutcome {
    AccrualOutcome::Result(AccrualResult::new(&number(n), AccrualStatus::Invalid))
}

pub fn rate_limited() -> AccrualOutcome {
    AccrualOutcome::RateLimited { retry_after: None }
}

pub fn transport_error() -> AccrualOutcome {
    AccrualOutcome::TransportError(AccrualApiError::RequestError("connection refused".into()))
}

/// An accrual service that plays back a script per order. The last entry of a script repeats forever. Orders
/// without a script are `REGISTERED`.
#[derive(Default)]
pub struct ScriptedAccrual {
    scripts: Mutex<HashMap<String, VecDeque<AccrualOutcome>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    latency: Duration,
}

impl ScriptedAccrual {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, order: &str, outcomes: Vec<AccrualOutcome>) -> Self {
        self.scripts.lock().unwrap().insert(order.to_string(), outcomes.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls_for(&self, order: &str) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().filter(|(n, _)| n == order).map(|(_, t)| *t).collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AccrualLookup for ScriptedAccrual {
    async fn poll(&self, order_number: &OrderNumber) -> AccrualOutcome {
        self.calls.lock().unwrap().push((order_number.to_string(), Instant::now()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(order_number.as_str()) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) => script.front().cloned().unwrap_or_else(|| registered(order_number.as_str())),
            None => registered(order_number.as_str()),
        }
    }
}

/// Waits until `check` passes on the dispatcher's stats, panicking after a few seconds.
pub async fn wait_for_stats<B, F>(dispatcher: &JobDispatcher<B>, check: F) -> JobStatsSnapshot
where
    B: loyalty_engine::LoyaltyDatabase,
    F: Fn(&JobStatsSnapshot) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let stats = dispatcher.stats();
        if check(&stats) {
            return stats;
        }
        assert!(Instant::now() < deadline, "Timed out waiting for the dispatcher. Stats: {stats}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_status(db: &SqliteDatabase, owner: &str, n: &str, status: OrderStatusType) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let current = db.fetch_order_status(owner, &number(n)).await.unwrap();
        if current == Some(status) {
            return;
        }
        assert!(Instant::now() < deadline, "Order {n} is {current:?}, expected {status}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
