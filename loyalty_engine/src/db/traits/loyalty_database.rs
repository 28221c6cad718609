use async_trait::async_trait;
use loyalty_common::{OrderNumber, Points};

use super::{BalanceManagement, OrderManagement};
use crate::db_types::{Balance, WithdrawalResult};

/// A complete backend for the reconciliation core.
#[async_trait]
pub trait LoyaltyDatabase: OrderManagement + BalanceManagement + 'static {
    /// The URL of the database
    fn url(&self) -> String;

    /// In a single atomic transaction,
    /// * moves the order to `PROCESSED` and records `accrual`, provided it is not already terminal, and
    /// * adds `accrual` to the owner's current balance.
    ///
    /// If the order was already terminal (or does not exist), nothing is written and `None` is returned. This is what
    /// makes the credit at-most-once per order: retrying a settle that already succeeded is a no-op.
    async fn settle_processed_order(
        &self,
        owner: &str,
        number: &OrderNumber,
        accrual: Points,
    ) -> Result<Option<Balance>, Self::Error>;

    /// In a single atomic transaction, checks that the owner can afford `sum`, moves it from `current` to
    /// `withdrawn`, and records the withdrawal. Nothing is written if funds are insufficient.
    async fn withdraw(&self, owner: &str, order_reference: &str, sum: Points)
        -> Result<WithdrawalResult, Self::Error>;
}
