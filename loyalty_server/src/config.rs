use std::{env, fmt::Display, str::FromStr, time::Duration};

use accrual_client::AccrualConfig;
use log::*;
use loyalty_common::{
    helpers::{parse_boolean_flag, parse_millis},
    Secret,
};
use loyalty_engine::{BackoffPolicy, DispatcherConfig};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/loyalty.db";
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 25;
const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);
const TRANSPORT_BACKOFF_CAP: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// May carry credentials, so it is never logged.
    pub database_url: Secret<String>,
    pub max_db_connections: u32,
    pub accrual: AccrualConfig,
    pub dispatcher: DispatcherConfig,
    /// Re-submit every order that has not reached a terminal status when the server starts.
    pub resume_pending: bool,
    /// How often the job statistics are logged. Zero turns the report off.
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: Secret::new(DEFAULT_DATABASE_URL.to_string()),
            max_db_connections: DEFAULT_MAX_DB_CONNECTIONS,
            accrual: AccrualConfig::default(),
            dispatcher: DispatcherConfig::default(),
            resume_pending: true,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let var = |name: &str| env::var(name).ok();
        let database_url = var("LOYALTY_DATABASE_URL").unwrap_or_else(|| {
            warn!("🪛️ LOYALTY_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_db_connections =
            parse_value("LOYALTY_DB_MAX_CONNECTIONS", var("LOYALTY_DB_MAX_CONNECTIONS"), DEFAULT_MAX_DB_CONNECTIONS);
        let stats_interval = parse_value("LOYALTY_STATS_INTERVAL", var("LOYALTY_STATS_INTERVAL"), 60u64);
        Self {
            database_url: Secret::new(database_url),
            max_db_connections: max_db_connections.max(1),
            accrual: AccrualConfig::new_from_env_or_default(),
            dispatcher: dispatcher_config(var),
            resume_pending: parse_boolean_flag(var("LOYALTY_RESUME_PENDING"), true),
            stats_interval: Duration::from_secs(stats_interval),
        }
    }
}

/// Builds the dispatcher configuration from whatever `var` returns for each setting. Missing or invalid values fall
/// back to the defaults.
pub fn dispatcher_config<F>(var: F) -> DispatcherConfig
where F: Fn(&str) -> Option<String> {
    let defaults = DispatcherConfig::default();
    let value = |name: &str, default| parse_value(name, var(name), default);
    let millis = |name: &str, default| parse_duration_millis(name, var(name), default);

    let queue_size = value("LOYALTY_JOB_QUEUE_SIZE", defaults.queue_size);
    let max_concurrent_jobs = value("LOYALTY_MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs);
    let job_timeout =
        Duration::from_secs(parse_value("LOYALTY_JOB_TIMEOUT", var("LOYALTY_JOB_TIMEOUT"), defaults.job_timeout.as_secs()));
    let poll_interval = millis("LOYALTY_POLL_INTERVAL_MS", defaults.poll_interval);

    let rate_limit_defaults = defaults.rate_limit_backoff;
    let mut multiplier =
        parse_value("LOYALTY_RATE_LIMIT_BACKOFF_MULTIPLIER", var("LOYALTY_RATE_LIMIT_BACKOFF_MULTIPLIER"), 1.0f64);
    if !multiplier.is_finite() || multiplier < 1.0 {
        warn!("🪛️ LOYALTY_RATE_LIMIT_BACKOFF_MULTIPLIER must be at least 1.0. Using 1.0 instead of {multiplier}.");
        multiplier = 1.0;
    }
    let rate_limit_backoff = BackoffPolicy {
        initial: millis("LOYALTY_RATE_LIMIT_BACKOFF_MS", rate_limit_defaults.initial),
        multiplier,
        cap: millis("LOYALTY_RATE_LIMIT_BACKOFF_CAP_MS", rate_limit_defaults.cap),
        max_attempts: parse_optional("LOYALTY_RATE_LIMIT_MAX_ATTEMPTS", var("LOYALTY_RATE_LIMIT_MAX_ATTEMPTS")),
    };
    let transport_backoff = BackoffPolicy::exponential(
        millis("LOYALTY_TRANSPORT_BACKOFF_MS", defaults.transport_backoff.initial),
        TRANSPORT_BACKOFF_CAP,
        parse_value(
            "LOYALTY_TRANSPORT_RETRIES",
            var("LOYALTY_TRANSPORT_RETRIES"),
            defaults.transport_backoff.max_attempts.unwrap_or(3),
        ),
    );
    if queue_size == 0 || max_concurrent_jobs == 0 {
        warn!("🪛️ The job queue size and the number of concurrent jobs must be at least 1. Using 1 instead of 0.");
    }
    DispatcherConfig {
        queue_size: queue_size.max(1),
        max_concurrent_jobs: max_concurrent_jobs.max(1),
        job_timeout,
        poll_interval,
        rate_limit_backoff,
        transport_backoff,
    }
}

fn parse_value<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => default,
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name} ({s}). {e} Using the default, {default}, instead.");
            default
        }),
    }
}

fn parse_duration_millis(name: &str, value: Option<String>, default: Duration) -> Duration {
    match value {
        None => default,
        Some(s) => parse_millis(&s).unwrap_or_else(|| {
            warn!(
                "🪛️ Invalid configuration value for {name} ({s}). Expected a whole number of milliseconds. Using the \
                 default, {}ms, instead.",
                default.as_millis()
            );
            default
        }),
    }
}

/// Unset, empty, or an explicit "none" means no limit.
fn parse_optional(name: &str, value: Option<String>) -> Option<u32> {
    let s = value?;
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("none") {
        return None;
    }
    s.parse::<u32>()
        .map_err(|e| warn!("🪛️ Invalid configuration value for {name} ({s}). {e} No limit will be applied."))
        .ok()
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = dispatcher_config(lookup(&[]));
        assert_eq!(config.queue_size, 128);
        assert_eq!(config.max_concurrent_jobs, 64);
        assert_eq!(config.job_timeout, Duration::from_secs(600));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.rate_limit_backoff, BackoffPolicy::default_rate_limit());
        assert_eq!(config.transport_backoff, BackoffPolicy::default_transport());
    }

    #[test]
    fn overrides() {
        let config = dispatcher_config(lookup(&[
            ("LOYALTY_JOB_QUEUE_SIZE", "10"),
            ("LOYALTY_MAX_CONCURRENT_JOBS", "4"),
            ("LOYALTY_JOB_TIMEOUT", "30"),
            ("LOYALTY_POLL_INTERVAL_MS", "250"),
            ("LOYALTY_RATE_LIMIT_BACKOFF_MS", "200"),
            ("LOYALTY_RATE_LIMIT_BACKOFF_MULTIPLIER", "2.5"),
            ("LOYALTY_RATE_LIMIT_BACKOFF_CAP_MS", "5000"),
            ("LOYALTY_RATE_LIMIT_MAX_ATTEMPTS", "7"),
            ("LOYALTY_TRANSPORT_RETRIES", "5"),
            ("LOYALTY_TRANSPORT_BACKOFF_MS", "100"),
        ]));
        assert_eq!(config.queue_size, 10);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.job_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.rate_limit_backoff.initial, Duration::from_millis(200));
        assert_eq!(config.rate_limit_backoff.multiplier, 2.5);
        assert_eq!(config.rate_limit_backoff.cap, Duration::from_secs(5));
        assert_eq!(config.rate_limit_backoff.max_attempts, Some(7));
        assert_eq!(config.transport_backoff.max_attempts, Some(5));
        assert_eq!(config.transport_backoff.initial, Duration::from_millis(100));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = dispatcher_config(lookup(&[
            ("LOYALTY_JOB_QUEUE_SIZE", "lots"),
            ("LOYALTY_MAX_CONCURRENT_JOBS", "0"),
            ("LOYALTY_POLL_INTERVAL_MS", "1.5"),
            ("LOYALTY_RATE_LIMIT_BACKOFF_MULTIPLIER", "0.5"),
            ("LOYALTY_RATE_LIMIT_MAX_ATTEMPTS", "-3"),
        ]));
        assert_eq!(config.queue_size, 128);
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.rate_limit_backoff.multiplier, 1.0);
        assert_eq!(config.rate_limit_backoff.max_attempts, None);
    }

    #[test]
    fn retry_counts_out_of_range_are_rejected() {
        let config = dispatcher_config(lookup(&[
            ("LOYALTY_TRANSPORT_RETRIES", "4294967297"),
            ("LOYALTY_JOB_TIMEOUT", "-1"),
        ]));
        assert_eq!(config.transport_backoff.max_attempts, Some(3));
        assert_eq!(config.job_timeout, Duration::from_secs(600));

        let config = dispatcher_config(lookup(&[("LOYALTY_TRANSPORT_RETRIES", "4294967295")]));
        assert_eq!(config.transport_backoff.max_attempts, Some(u32::MAX));
    }

    #[test]
    fn optional_limits() {
        assert_eq!(parse_optional("X", None), None);
        assert_eq!(parse_optional("X", Some("none".into())), None);
        assert_eq!(parse_optional("X", Some(" ".into())), None);
        assert_eq!(parse_optional("X", Some("12".into())), Some(12));
    }

    #[test]
    fn database_url_is_not_printed() {
        let config = ServerConfig::default();
        assert!(!format!("{config:?}").contains("loyalty.db"));
        assert_eq!(config.database_url.reveal(), DEFAULT_DATABASE_URL);
    }
}
