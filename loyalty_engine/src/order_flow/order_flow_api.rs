use std::fmt::Debug;

use log::*;
use loyalty_common::{OrderNumber, Points};

use super::{
    dispatcher::JobSubmitter,
    errors::OrderFlowError,
    reconciler::BalanceReconciler,
};
use crate::{
    db::traits::LoyaltyDatabase,
    db_types::{Balance, InsertOrderResult, NewOrder, Order, Withdrawal, WithdrawalResult},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOrderResult {
    /// A new order. It has been saved as `NEW` and a job is queued for it.
    Accepted(Order),
    /// The same owner uploaded this order before. Nothing changed.
    AlreadyUploaded(Order),
}

/// `OrderFlowApi` is what the order, balance and withdrawal handlers call into. It never touches the accrual
/// service itself; new orders are handed to the job dispatcher.
pub struct OrderFlowApi<B> {
    reconciler: BalanceReconciler<B>,
    submitter: JobSubmitter,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { reconciler: self.reconciler.clone(), submitter: self.submitter.clone() }
    }
}

impl<B> OrderFlowApi<B>
where B: LoyaltyDatabase
{
    pub fn new(reconciler: BalanceReconciler<B>, submitter: JobSubmitter) -> Self {
        Self { reconciler, submitter }
    }

    /// Saves an uploaded order and queues it for reconciliation.
    ///
    /// Order numbers are globally unique. Uploading an order that belongs to someone else fails with
    /// [`OrderFlowError::OwnedByAnotherUser`].
    ///
    /// If the dispatcher is shutting down the order is still saved, but the job is not queued and
    /// [`super::DispatchError::JobChannelClosed`] is returned. The order is picked up again by
    /// [`super::JobDispatcher::resume_pending_orders`] on the next start.
    pub async fn register_order(&self, number: OrderNumber, owner: &str) -> Result<RegisterOrderResult, OrderFlowError> {
        let inserted = self
            .reconciler
            .db()
            .insert_order(NewOrder::new(number.clone(), owner))
            .await
            .map_err(|e| OrderFlowError::DatabaseError(e.to_string()))?;
        match inserted {
            InsertOrderResult::Inserted(order) => {
                debug!("🔄️📦️ Order {number} uploaded by {owner}");
                self.submitter.submit(number, owner).await?;
                Ok(RegisterOrderResult::Accepted(order))
            },
            InsertOrderResult::AlreadyExists(order) if order.owner == owner => {
                trace!("🔄️📦️ {owner} uploaded order {number} again");
                Ok(RegisterOrderResult::AlreadyUploaded(order))
            },
            InsertOrderResult::AlreadyExists(_) => {
                info!("🔄️📦️ {owner} tried to upload order {number}, which belongs to someone else");
                Err(OrderFlowError::OwnedByAnotherUser(number))
            },
        }
    }

    /// The owner's orders, newest first.
    pub async fn orders(&self, owner: &str) -> Result<Vec<Order>, OrderFlowError> {
        self.reconciler
            .db()
            .fetch_orders_for_owner(owner)
            .await
            .map_err(|e| OrderFlowError::DatabaseError(e.to_string()))
    }

    pub async fn balance(&self, owner: &str) -> Result<Balance, OrderFlowError> {
        Ok(self.reconciler.balance(owner).await?)
    }

    /// Spends `sum` points from the owner's balance against `order_reference`.
    pub async fn withdraw(
        &self,
        owner: &str,
        order_reference: &str,
        sum: Points,
    ) -> Result<WithdrawalResult, OrderFlowError> {
        let result = self.reconciler.withdraw(owner, order_reference, sum).await?;
        if let WithdrawalResult::Completed(balance) = &result {
            debug!("🔄️💰️ {owner} spent {sum} on {order_reference}. {} left", balance.current);
        }
        Ok(result)
    }

    /// The owner's withdrawals, oldest first.
    pub async fn withdrawals(&self, owner: &str) -> Result<Vec<Withdrawal>, OrderFlowError> {
        self.reconciler
            .db()
            .fetch_withdrawals(owner)
            .await
            .map_err(|e| OrderFlowError::DatabaseError(e.to_string()))
    }
}
