//! Client for the external accrual service.
//!
//! The accrual service computes the loyalty reward for a purchase order. It is polled, never pushed, and is rate
//! limited. [`AccrualApi::poll`] performs a single lookup and classifies the HTTP outcome into an [`AccrualOutcome`]
//! so that callers only need to decide what to do next, not how to read status codes.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::AccrualApi;
pub use config::AccrualConfig;
pub use data_objects::{AccrualOutcome, AccrualResult, AccrualStatus};
pub use error::AccrualApiError;
