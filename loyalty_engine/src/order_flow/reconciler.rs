use std::{fmt::Debug, sync::Arc};

use log::*;
use loyalty_common::{OrderNumber, Points};

use super::{errors::ReconcileError, owner_locks::OwnerLocks};
use crate::{
    db::traits::LoyaltyDatabase,
    db_types::{Balance, OrderStatusType, WithdrawalResult},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditResult {
    Credited(Balance),
    /// The order was already terminal, so nothing was credited.
    AlreadySettled,
}

/// Applies order settlements and withdrawals to balances, one owner at a time.
///
/// Every balance-affecting operation holds the owner's lock for its full read-modify-write cycle, and the backend
/// applies the `PROCESSED` transition and its credit atomically. Together these mean an order is credited at most
/// once, and a credit never interleaves with a withdrawal for the same owner.
pub struct BalanceReconciler<B> {
    db: Arc<B>,
    locks: OwnerLocks,
}

impl<B> Clone for BalanceReconciler<B> {
    fn clone(&self) -> Self {
        Self { db: Arc::clone(&self.db), locks: self.locks.clone() }
    }
}

impl<B> Debug for BalanceReconciler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BalanceReconciler ({} owners seen)", self.locks.len())
    }
}

impl<B> BalanceReconciler<B>
where B: LoyaltyDatabase
{
    pub fn new(db: Arc<B>) -> Self {
        Self { db, locks: OwnerLocks::new() }
    }

    pub fn db(&self) -> &B {
        self.db.as_ref()
    }

    /// Moves the order to `PROCESSED` and credits `amount` to the owner.
    ///
    /// Calling this again for an order that is already settled is harmless and returns
    /// [`CreditResult::AlreadySettled`].
    pub async fn credit(
        &self,
        owner: &str,
        number: &OrderNumber,
        amount: Points,
    ) -> Result<CreditResult, ReconcileError> {
        if amount.is_negative() {
            return Err(ReconcileError::InvalidAmount(amount));
        }
        let _guard = self.locks.lock(owner).await;
        let settled = self.db.settle_processed_order(owner, number, amount).await.map_err(db_error)?;
        match settled {
            Some(balance) => {
                info!("⚖️ Credited {amount} to {owner} for order {number}. Balance is now {}", balance.current);
                Ok(CreditResult::Credited(balance))
            },
            None => {
                debug!("⚖️ Order {number} was already settled. {owner} has not been credited again.");
                Ok(CreditResult::AlreadySettled)
            },
        }
    }

    /// Records a non-crediting status change. Returns `false` if the order had already moved past `status`.
    pub async fn record_status(
        &self,
        owner: &str,
        number: &OrderNumber,
        status: OrderStatusType,
    ) -> Result<bool, ReconcileError> {
        if status == OrderStatusType::Processed {
            return Err(ReconcileError::SettlementRequired);
        }
        let _guard = self.locks.lock(owner).await;
        let updated = self.db.update_order_status(owner, number, status, None).await.map_err(db_error)?;
        trace!("⚖️ Order {number} -> {status}: {}", if updated { "updated" } else { "unchanged" });
        Ok(updated)
    }

    pub async fn withdraw(
        &self,
        owner: &str,
        order_reference: &str,
        sum: Points,
    ) -> Result<WithdrawalResult, ReconcileError> {
        if sum <= Points::default() {
            return Err(ReconcileError::InvalidAmount(sum));
        }
        let _guard = self.locks.lock(owner).await;
        let result = self.db.withdraw(owner, order_reference, sum).await.map_err(db_error)?;
        if let WithdrawalResult::InsufficientFunds(balance) = &result {
            info!("⚖️ {owner} tried to withdraw {sum} but only has {}", balance.current);
        }
        Ok(result)
    }

    pub async fn balance(&self, owner: &str) -> Result<Balance, ReconcileError> {
        self.db.fetch_balance(owner).await.map_err(db_error)
    }
}

fn db_error<E: std::error::Error>(e: E) -> ReconcileError {
    ReconcileError::DatabaseError(e.to_string())
}
