use log::trace;
use loyalty_common::{OrderNumber, Points};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{InsertOrderResult, NewOrder, Order, OrderStatusType},
};

const ORDER_COLUMNS: &str = "number, owner, status, accrual, uploaded_at";

/// Inserts the order unless its number is already taken, then reads back whichever row holds the number.
///
/// The insert comes first so that, inside a transaction, the connection takes the write lock before it reads.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<InsertOrderResult, SqliteDatabaseError> {
    let number = order.number.clone();
    let inserted = insert_order(order, &mut *conn).await?;
    let stored = fetch_order_by_number(&number, conn)
        .await?
        .ok_or_else(|| SqliteDatabaseError::OrderVanished(number.to_string()))?;
    if inserted {
        Ok(InsertOrderResult::Inserted(stored))
    } else {
        Ok(InsertOrderResult::AlreadyExists(stored))
    }
}

/// Returns `false` if an order with the same number already exists, in which case nothing was written.
async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        "INSERT INTO orders (number, owner, status, uploaded_at) VALUES ($1, $2, $3, $4) ON CONFLICT (number) DO \
         NOTHING",
    )
    .bind(order.number.as_str())
    .bind(order.owner)
    .bind(OrderStatusType::New.to_string())
    .bind(order.uploaded_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_order_by_number(
    number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE number = $1");
    let order = sqlx::query_as::<_, Order>(&sql).bind(number.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_orders_for_owner(owner: &str, conn: &mut SqliteConnection) -> Result<Vec<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE owner = $1 ORDER BY uploaded_at DESC, id DESC");
    let orders = sqlx::query_as::<_, Order>(&sql).bind(owner).fetch_all(conn).await?;
    Ok(orders)
}

/// Fetches every order in one of the given statuses, oldest first.
pub async fn fetch_orders_with_status(
    statuses: &[OrderStatusType],
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE status IN ("));
    let mut list = builder.separated(", ");
    for status in statuses {
        list.push_bind(status.to_string());
    }
    list.push_unseparated(") ORDER BY uploaded_at ASC, id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}

/// Moves the order to `status` if, and only if, its current status is a legal predecessor of `status`. The accrual
/// amount is only written for `PROCESSED`. Returns `true` if a row was changed.
pub(crate) async fn update_order_status(
    owner: &str,
    number: &OrderNumber,
    status: OrderStatusType,
    accrual: Option<Points>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let accrual = if status == OrderStatusType::Processed { accrual } else { None };
    let mut builder = QueryBuilder::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP, status = ");
    builder.push_bind(status.to_string());
    if let Some(accrual) = accrual {
        builder.push(", accrual = ");
        builder.push_bind(accrual);
    }
    builder.push(" WHERE number = ");
    builder.push_bind(number.as_str());
    builder.push(" AND owner = ");
    builder.push_bind(owner);
    builder.push(" AND status IN (");
    let mut predecessors = builder.separated(", ");
    for s in status.allowed_predecessors() {
        predecessors.push_bind(s.to_string());
    }
    predecessors.push_unseparated(")");
    trace!("🗃️ Executing query: {}", builder.sql());
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected() > 0)
}
