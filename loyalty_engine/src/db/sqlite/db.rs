use std::fmt::Debug;

use async_trait::async_trait;
use log::*;
use loyalty_common::{OrderNumber, Points};
use sqlx::SqlitePool;

use super::{balances, new_pool, orders, withdrawals, SqliteDatabaseError};
use crate::{
    db::traits::{BalanceManagement, DatabaseBackend, LoyaltyDatabase, OrderManagement},
    db_types::{Balance, InsertOrderResult, NewOrder, Order, OrderStatusType, Withdrawal, WithdrawalResult},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database at `url`, creating the file if needed. Migrations are not run; call
    /// [`Self::migrate`] for that.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        debug!("🗃️ Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl DatabaseBackend for SqliteDatabase {
    type Error = SqliteDatabaseError;
}

#[async_trait]
impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order(&self, owner: &str, number: &OrderNumber) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_number(number, &mut conn).await?;
        Ok(order.filter(|o| o.owner == owner))
    }

    async fn fetch_order_status(
        &self,
        owner: &str,
        number: &OrderNumber,
    ) -> Result<Option<OrderStatusType>, Self::Error> {
        Ok(self.fetch_order(owner, number).await?.map(|o| o.status))
    }

    async fn update_order_status(
        &self,
        owner: &str,
        number: &OrderNumber,
        status: OrderStatusType,
        accrual: Option<Points>,
    ) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order_status(owner, number, status, accrual, &mut conn).await
    }

    async fn fetch_orders_for_owner(&self, owner: &str) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_for_owner(owner, &mut conn).await
    }

    async fn fetch_pending_orders(&self) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_with_status(&[OrderStatusType::New, OrderStatusType::Processing], &mut conn).await
    }
}

#[async_trait]
impl BalanceManagement for SqliteDatabase {
    async fn fetch_balance(&self, owner: &str) -> Result<Balance, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        balances::fetch_balance(owner, &mut conn).await
    }

    async fn set_balance(&self, owner: &str, current: Points, withdrawn: Points) -> Result<Balance, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        balances::set_balance(owner, current, withdrawn, &mut conn).await
    }

    async fn fetch_withdrawals(&self, owner: &str) -> Result<Vec<Withdrawal>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::fetch_withdrawals(owner, &mut conn).await
    }
}

#[async_trait]
impl LoyaltyDatabase for SqliteDatabase {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn settle_processed_order(
        &self,
        owner: &str,
        number: &OrderNumber,
        accrual: Points,
    ) -> Result<Option<Balance>, Self::Error> {
        let mut tx = self.pool.begin().await?;
        // The status update goes first so that the transaction holds the write lock from the start
        let updated =
            orders::update_order_status(owner, number, OrderStatusType::Processed, Some(accrual), &mut tx).await?;
        if !updated {
            tx.rollback().await?;
            debug!("🗃️ Order {number} for {owner} is already settled or does not exist. Nothing credited.");
            return Ok(None);
        }
        let balance = balances::credit(owner, accrual, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {number} settled. {accrual} credited to {owner}, who now has {}", balance.current);
        Ok(Some(balance))
    }

    async fn withdraw(
        &self,
        owner: &str,
        order_reference: &str,
        sum: Points,
    ) -> Result<WithdrawalResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        match balances::debit(owner, sum, &mut tx).await? {
            Some(balance) => {
                withdrawals::insert_withdrawal(owner, order_reference, sum, &mut tx).await?;
                tx.commit().await?;
                debug!("🗃️ {owner} withdrew {sum} for order {order_reference}");
                Ok(WithdrawalResult::Completed(balance))
            },
            None => {
                tx.rollback().await?;
                let balance = self.fetch_balance(owner).await?;
                debug!("🗃️ {owner} cannot withdraw {sum}. Current balance is {}", balance.current);
                Ok(WithdrawalResult::InsufficientFunds(balance))
            },
        }
    }
}
