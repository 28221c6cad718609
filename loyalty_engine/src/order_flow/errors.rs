use accrual_client::AccrualApiError;
use loyalty_common::{OrderNumber, Points};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0} is not a valid amount")]
    InvalidAmount(Points),
    #[error("PROCESSED can only be reached by crediting the order")]
    SettlementRequired,
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("The job dispatcher is shutting down and no longer accepts jobs")]
    JobChannelClosed,
    #[error("The job queue is full")]
    QueueFull,
    #[error("The job dispatcher is already running")]
    AlreadyRunning,
    #[error("Could not create the accrual client. {0}")]
    Client(#[from] AccrualApiError),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} has already been uploaded by another user")]
    OwnedByAnotherUser(OrderNumber),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}
