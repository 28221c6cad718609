use std::time::Duration;

use log::*;

const DEFAULT_ACCRUAL_ADDRESS: &str = "http://localhost:8081";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AccrualConfig {
    /// Base address of the accrual service, e.g. `http://localhost:8081`. A bare `host:port` is accepted and treated
    /// as plain HTTP.
    pub base_url: String,
    /// Upper bound on a single lookup, including connection set-up.
    pub timeout: Duration,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_ACCRUAL_ADDRESS.to_string(), timeout: DEFAULT_HTTP_TIMEOUT }
    }
}

impl AccrualConfig {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.to_string(), ..Default::default() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("LOYALTY_ACCRUAL_ADDRESS")
            .or_else(|_| std::env::var("ACCRUAL_SYSTEM_ADDRESS"))
            .unwrap_or_else(|_| {
                warn!("🧾️ LOYALTY_ACCRUAL_ADDRESS not set, using {DEFAULT_ACCRUAL_ADDRESS} as default");
                DEFAULT_ACCRUAL_ADDRESS.to_string()
            });
        let timeout = std::env::var("LOYALTY_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🧾️ Invalid configuration value for LOYALTY_HTTP_TIMEOUT. {e}"))
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);
        Self { base_url, timeout }
    }

    /// The base address with a scheme and without a trailing slash.
    pub fn normalized_base_url(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        if base.contains("://") {
            base.to_string()
        } else {
            format!("http://{base}")
        }
    }
}
