//! The order lifecycle, as driven by accrual service results.
//!
//! | current \ result  | REGISTERED | PROCESSING | PROCESSED | INVALID |
//! |-------------------|------------|------------|-----------|---------|
//! | NEW, PROCESSING   | PROCESSING | PROCESSING | PROCESSED | INVALID |
//! | PROCESSED         | PROCESSED  | PROCESSED  | PROCESSED | PROCESSED |
//! | INVALID           | INVALID    | INVALID    | INVALID   | INVALID |
//!
//! A lookup the service answers with 204 carries no status at all and never reaches this table. The order keeps
//! whatever status it has, so a fresh upload stays `NEW`.
use accrual_client::{AccrualResult, AccrualStatus};

use crate::db_types::OrderStatusType;

impl From<AccrualStatus> for OrderStatusType {
    fn from(status: AccrualStatus) -> Self {
        match status {
            AccrualStatus::Registered | AccrualStatus::Processing => OrderStatusType::Processing,
            AccrualStatus::Processed => OrderStatusType::Processed,
            AccrualStatus::Invalid => OrderStatusType::Invalid,
        }
    }
}

/// The status an order in `current` moves to after the accrual service reported `result`.
///
/// Terminal statuses are sticky, so polling a settled order again is a no-op.
pub fn transition(current: OrderStatusType, result: &AccrualResult) -> OrderStatusType {
    if current.is_terminal() {
        return current;
    }
    result.status.into()
}

#[cfg(test)]
mod test {
    use loyalty_common::{OrderNumber, Points};

    use super::*;

    const ALL_RESULTS: [AccrualStatus; 4] =
        [AccrualStatus::Registered, AccrualStatus::Processing, AccrualStatus::Processed, AccrualStatus::Invalid];

    fn result(status: AccrualStatus) -> AccrualResult {
        let number: OrderNumber = "79927398713".parse().unwrap();
        match status {
            AccrualStatus::Processed => AccrualResult::processed(&number, Points::from_whole(500)),
            s => AccrualResult::new(&number, s),
        }
    }

    #[test]
    fn open_orders_follow_the_service() {
        for current in [OrderStatusType::New, OrderStatusType::Processing] {
            let next: Vec<_> = ALL_RESULTS.iter().map(|s| transition(current, &result(*s))).collect();
            assert_eq!(next, vec![
                OrderStatusType::Processing,
                OrderStatusType::Processing,
                OrderStatusType::Processed,
                OrderStatusType::Invalid
            ]);
        }
    }

    #[test]
    fn terminal_orders_never_move() {
        for current in [OrderStatusType::Processed, OrderStatusType::Invalid] {
            for status in ALL_RESULTS {
                assert_eq!(transition(current, &result(status)), current);
            }
        }
    }

    #[test]
    fn never_regresses() {
        let rank = |s: OrderStatusType| match s {
            OrderStatusType::New => 0,
            OrderStatusType::Processing => 1,
            OrderStatusType::Processed | OrderStatusType::Invalid => 2,
        };
        for current in
            [OrderStatusType::New, OrderStatusType::Processing, OrderStatusType::Processed, OrderStatusType::Invalid]
        {
            for status in ALL_RESULTS {
                assert!(rank(transition(current, &result(status))) >= rank(current));
            }
        }
    }
}
