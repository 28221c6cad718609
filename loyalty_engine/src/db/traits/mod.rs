//! The persistence boundary of the reconciliation core.
//!
//! Backends implement [`OrderManagement`] and [`BalanceManagement`], plus the two atomic operations in
//! [`LoyaltyDatabase`]. The reconciliation core never issues SQL itself; everything goes through these traits, so a
//! backend is free to choose how it achieves atomicity as long as the documented guarantees hold.
mod balance_management;
mod loyalty_database;
mod order_management;

pub use balance_management::BalanceManagement;
pub use loyalty_database::LoyaltyDatabase;
pub use order_management::OrderManagement;

/// Common ground for the persistence traits: the error type a backend reports.
pub trait DatabaseBackend {
    type Error: std::error::Error + Send + Sync + 'static;
}
