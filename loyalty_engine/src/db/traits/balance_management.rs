use async_trait::async_trait;
use loyalty_common::Points;

use super::DatabaseBackend;
use crate::db_types::{Balance, Withdrawal};

#[async_trait]
pub trait BalanceManagement: DatabaseBackend + Send + Sync {
    /// The owner's balance. An owner that has never been credited has an empty balance, not an error.
    async fn fetch_balance(&self, owner: &str) -> Result<Balance, Self::Error>;

    /// Overwrites the owner's balance. This is a plain setter: callers that read-modify-write must hold the owner's
    /// lock for the whole cycle.
    async fn set_balance(&self, owner: &str, current: Points, withdrawn: Points) -> Result<Balance, Self::Error>;

    /// The owner's withdrawals, oldest first.
    async fn fetch_withdrawals(&self, owner: &str) -> Result<Vec<Withdrawal>, Self::Error>;
}
