use std::{sync::Arc, time::Duration};

use log::*;
use loyalty_common::OrderNumber;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER},
    Client,
    StatusCode,
};
use url::Url;

use crate::{config::AccrualConfig, AccrualApiError, AccrualOutcome, AccrualResult};

/// A stateless handle on the accrual service. Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct AccrualApi {
    base_url: Url,
    client: Arc<Client>,
}

impl AccrualApi {
    pub fn new(config: AccrualConfig) -> Result<Self, AccrualApiError> {
        let base = config.normalized_base_url();
        let base_url = Url::parse(&base).map_err(|e| AccrualApiError::InvalidUrl(format!("{base}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AccrualApiError::InvalidUrl(base));
        }
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| AccrualApiError::Initialization(e.to_string()))?;
        debug!("🧾️ Accrual client configured for {base_url}");
        Ok(Self { base_url, client: Arc::new(client) })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn url(&self, order_number: &OrderNumber) -> String {
        format!("{}/api/orders/{order_number}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// Looks up a single order on the accrual service.
    ///
    /// * 200 with a JSON body is parsed into [`AccrualOutcome::Result`].
    /// * 204 means the service does not know the order yet: [`AccrualOutcome::Unregistered`].
    /// * 429 is [`AccrualOutcome::RateLimited`].
    /// * Anything else, including connection failures and unreadable bodies, is a [`AccrualOutcome::TransportError`].
    pub async fn poll(&self, order_number: &OrderNumber) -> AccrualOutcome {
        let url = self.url(order_number);
        trace!("🧾️ GET {url}");
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("🧾️ Could not reach the accrual service for order {order_number}. {e}");
                return AccrualOutcome::TransportError(AccrualApiError::RequestError(e.to_string()));
            },
        };
        let status = response.status();
        debug!("🧾️ Accrual service answered {status} for order {order_number}");
        match status {
            StatusCode::OK => match response.json::<AccrualResult>().await {
                Ok(result) => {
                    if result.order != order_number.as_str() {
                        warn!(
                            "🧾️ Asked about order {order_number}, but the accrual service answered for order {}",
                            result.order
                        );
                    }
                    AccrualOutcome::Result(result)
                },
                Err(e) => AccrualOutcome::TransportError(AccrualApiError::JsonError(e.to_string())),
            },
            StatusCode::NO_CONTENT => AccrualOutcome::Unregistered,
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = retry_after(response.headers());
                trace!("🧾️ Rate limited. Retry-After: {retry_after:?}");
                AccrualOutcome::RateLimited { retry_after }
            },
            other => {
                let message = response.text().await.unwrap_or_default();
                AccrualOutcome::TransportError(AccrualApiError::UnexpectedStatus { status: other.as_u16(), message })
            },
        }
    }
}

/// Reads a `Retry-After` header given in whole seconds. The HTTP-date form is ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
