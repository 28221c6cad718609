use async_trait::async_trait;
use loyalty_common::{OrderNumber, Points};

use super::DatabaseBackend;
use crate::db_types::{InsertOrderResult, NewOrder, Order, OrderStatusType};

#[async_trait]
pub trait OrderManagement: DatabaseBackend + Send + Sync {
    /// Stores a new order with status `NEW`. Order numbers are globally unique: if the number is already taken, by
    /// anyone, nothing is written and the existing order is returned in [`InsertOrderResult::AlreadyExists`].
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, Self::Error>;

    async fn fetch_order(&self, owner: &str, number: &OrderNumber) -> Result<Option<Order>, Self::Error>;

    /// Fetches the current status of the owner's order, or `None` if the owner has no such order.
    async fn fetch_order_status(
        &self,
        owner: &str,
        number: &OrderNumber,
    ) -> Result<Option<OrderStatusType>, Self::Error>;

    /// Moves the order to `status`.
    ///
    /// The write only happens if the current status is one of [`OrderStatusType::allowed_predecessors`], so terminal
    /// orders are never touched and statuses never regress. `accrual` is only stored when `status` is `PROCESSED`.
    /// Note that this does **not** credit the owner's balance; use [`super::LoyaltyDatabase::settle_processed_order`]
    /// for that.
    ///
    /// Returns `true` if a row changed.
    async fn update_order_status(
        &self,
        owner: &str,
        number: &OrderNumber,
        status: OrderStatusType,
        accrual: Option<Points>,
    ) -> Result<bool, Self::Error>;

    /// All orders for the owner, newest first.
    async fn fetch_orders_for_owner(&self, owner: &str) -> Result<Vec<Order>, Self::Error>;

    /// Every order that has not reached a terminal status, oldest first.
    async fn fetch_pending_orders(&self) -> Result<Vec<Order>, Self::Error>;
}
