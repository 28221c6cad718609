mod order_number;
mod points;

pub mod helpers;
pub mod op;
mod secret;

pub use order_number::{luhn_valid, OrderNumber, OrderNumberError};
pub use points::{Points, PointsConversionError};
pub use secret::Secret;
