use std::{fmt::Display, time::Duration};

use loyalty_common::{OrderNumber, Points};
use serde::{Deserialize, Serialize};

use crate::AccrualApiError;

/// The accrual service's view of an order. This vocabulary is distinct from the locally persisted order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    /// The order is known to the service, but processing has not started.
    Registered,
    Processing,
    /// Terminal. The reward has been calculated.
    Processed,
    /// Terminal. No reward will be paid.
    Invalid,
}

impl Display for AccrualStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccrualStatus::Registered => write!(f, "REGISTERED"),
            AccrualStatus::Processing => write!(f, "PROCESSING"),
            AccrualStatus::Processed => write!(f, "PROCESSED"),
            AccrualStatus::Invalid => write!(f, "INVALID"),
        }
    }
}

/// Response body of `GET /api/orders/{number}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualResult {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Points>,
}

impl AccrualResult {
    pub fn new(order: &OrderNumber, status: AccrualStatus) -> Self {
        Self { order: order.to_string(), status, accrual: None }
    }

    pub fn processed(order: &OrderNumber, accrual: Points) -> Self {
        Self { order: order.to_string(), status: AccrualStatus::Processed, accrual: Some(accrual) }
    }
}

/// The classified result of a single lookup.
#[derive(Debug, Clone)]
pub enum AccrualOutcome {
    /// The service answered with a status for the order.
    Result(AccrualResult),
    /// HTTP 204. The service has not heard of the order yet, so the order stays `NEW` locally. This is not the same
    /// as a `REGISTERED` result.
    Unregistered,
    /// HTTP 429. The caller must back off before asking again. `retry_after` carries the server's hint, if it sent
    /// one.
    RateLimited { retry_after: Option<Duration> },
    /// The lookup failed: connection problems, an unreadable body or an unexpected status code.
    TransportError(AccrualApiError),
}
