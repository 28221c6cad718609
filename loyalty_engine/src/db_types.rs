use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use loyalty_common::{OrderNumber, Points};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
/// The locally persisted order lifecycle: `NEW → PROCESSING → {PROCESSED | INVALID}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been uploaded, and the accrual service has not been asked about it yet.
    New,
    /// The accrual service knows about the order and is still calculating the reward.
    Processing,
    /// The reward has been calculated and credited to the owner's balance.
    Processed,
    /// The accrual service rejected the order. No reward will be paid.
    Invalid,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Invalid)
    }

    /// The statuses a row may be in for it to legally move to `self`. Terminal rows never move.
    pub fn allowed_predecessors(&self) -> &'static [OrderStatusType] {
        match self {
            Self::New => &[Self::New],
            Self::Processing | Self::Processed | Self::Invalid => &[Self::New, Self::Processing],
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::New => write!(f, "NEW"),
            OrderStatusType::Processing => write!(f, "PROCESSING"),
            OrderStatusType::Processed => write!(f, "PROCESSED"),
            OrderStatusType::Invalid => write!(f, "INVALID"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "PROCESSING" => Ok(Self::Processing),
            "PROCESSED" => Ok(Self::Processed),
            "INVALID" => Ok(Self::Invalid),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

impl TryFrom<String> for OrderStatusType {
    type Error = ConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Order {
    pub number: OrderNumber,
    pub owner: String,
    #[sqlx(try_from = "String")]
    pub status: OrderStatusType,
    /// Only ever set on the transition into [`OrderStatusType::Processed`].
    pub accrual: Option<Points>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub number: OrderNumber,
    pub owner: String,
    pub uploaded_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(number: OrderNumber, owner: &str) -> Self {
        Self { number, owner: owner.to_string(), uploaded_at: Utc::now() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOrderResult {
    Inserted(Order),
    /// An order with this number already exists. It may belong to someone else.
    AlreadyExists(Order),
}

//--------------------------------------       Balance       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Balance {
    pub owner: String,
    #[sqlx(rename = "current_balance")]
    pub current: Points,
    #[sqlx(rename = "total_withdrawn")]
    pub withdrawn: Points,
}

impl Balance {
    /// The balance of an owner that has never been credited.
    pub fn empty(owner: &str) -> Self {
        Self { owner: owner.to_string(), current: Points::default(), withdrawn: Points::default() }
    }
}

//--------------------------------------     Withdrawal      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Withdrawal {
    pub owner: String,
    /// The order the points were spent on. This is a free-form reference and is not validated against `orders`.
    pub order_reference: String,
    pub sum: Points,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalResult {
    Completed(Balance),
    /// The withdrawal was rejected. Nothing was written. Carries the unchanged balance.
    InsufficientFunds(Balance),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_strings() {
        for status in [
            OrderStatusType::New,
            OrderStatusType::Processing,
            OrderStatusType::Processed,
            OrderStatusType::Invalid,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatusType>().unwrap(), status);
        }
        assert!("REGISTERED".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn terminal_statuses_have_no_way_out() {
        assert!(OrderStatusType::Processed.is_terminal());
        assert!(OrderStatusType::Invalid.is_terminal());
        assert!(!OrderStatusType::Processing.is_terminal());
        for status in [OrderStatusType::New, OrderStatusType::Processing, OrderStatusType::Processed] {
            assert!(status.allowed_predecessors().iter().all(|p| !p.is_terminal()));
        }
        assert!(!OrderStatusType::New.allowed_predecessors().contains(&OrderStatusType::Processing));
    }
}
