//! Loyalty Engine
//!
//! The reconciliation core of the loyalty points backend. Users upload purchase orders; an external accrual service
//! decides, eventually, how many points each order is worth. This library keeps local order and balance state in step
//! with that service without losing or double-counting a reward.
//!
//! The library is divided into two main sections:
//! 1. Database management ([`mod@db`]). The persistence boundary is a set of traits, with SQLite as the supplied
//!    backend. The data types stored in the database live in [`db_types`] and are public.
//! 2. The order flow ([`order_flow`]). The state machine, the balance reconciler, and the job dispatcher that polls the
//!    accrual service for every open order.
pub mod db;
pub mod db_types;
pub mod order_flow;

#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{BalanceManagement, DatabaseBackend, LoyaltyDatabase, OrderManagement};
pub use order_flow::{
    AccrualLookup,
    BackoffPolicy,
    BalanceReconciler,
    CreditResult,
    DispatchError,
    DispatcherConfig,
    Job,
    JobDispatcher,
    JobOutcome,
    JobStatsSnapshot,
    JobSubmitter,
    OrderFlowApi,
    OrderFlowError,
    ReconcileError,
    RegisterOrderResult,
};
