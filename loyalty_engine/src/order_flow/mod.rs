//! Reconciliation of local orders and balances against the accrual service.
//!
//! Control flows one way: an upload handler registers an order through [`OrderFlowApi`], which queues a [`Job`] on
//! the [`JobDispatcher`]. The dispatcher runs one polling loop per job. Each loop asks the accrual service about the
//! order, feeds the answer through [`transition`], and hands any change to the [`BalanceReconciler`], until the order
//! is terminal or the job is cancelled.
mod accrual;
mod backoff;
mod dispatcher;
mod errors;
mod job;
mod order_flow_api;
mod owner_locks;
mod reconciler;
mod state_machine;
mod stats;

pub use accrual::AccrualLookup;
pub use backoff::BackoffPolicy;
pub use dispatcher::{DispatcherConfig, JobDispatcher, JobSubmitter};
pub use errors::{DispatchError, OrderFlowError, ReconcileError};
pub use job::{Job, JobOutcome};
pub use order_flow_api::{OrderFlowApi, RegisterOrderResult};
pub use owner_locks::OwnerLocks;
pub use reconciler::{BalanceReconciler, CreditResult};
pub use state_machine::transition;
pub use stats::{JobStats, JobStatsSnapshot};
