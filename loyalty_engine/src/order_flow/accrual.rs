use accrual_client::{AccrualApi, AccrualOutcome};
use async_trait::async_trait;
use loyalty_common::OrderNumber;

/// A source of accrual results. [`AccrualApi`] is the real one; tests script their own.
#[async_trait]
pub trait AccrualLookup: Send + Sync + 'static {
    async fn poll(&self, order_number: &OrderNumber) -> AccrualOutcome;
}

#[async_trait]
impl AccrualLookup for AccrualApi {
    async fn poll(&self, order_number: &OrderNumber) -> AccrualOutcome {
        AccrualApi::poll(self, order_number).await
    }
}
