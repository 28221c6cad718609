use chrono::Utc;
use loyalty_common::Points;
use sqlx::SqliteConnection;

use crate::{db::sqlite::SqliteDatabaseError, db_types::Withdrawal};

pub async fn insert_withdrawal(
    owner: &str,
    order_reference: &str,
    sum: Points,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let _ = sqlx::query("INSERT INTO withdrawals (owner, order_reference, sum, processed_at) VALUES ($1, $2, $3, $4)")
        .bind(owner)
        .bind(order_reference)
        .bind(sum)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_withdrawals(owner: &str, conn: &mut SqliteConnection) -> Result<Vec<Withdrawal>, SqliteDatabaseError> {
    let withdrawals = sqlx::query_as::<_, Withdrawal>(
        "SELECT owner, order_reference, sum, processed_at FROM withdrawals WHERE owner = $1 ORDER BY processed_at ASC, \
         id ASC",
    )
    .bind(owner)
    .fetch_all(conn)
    .await?;
    Ok(withdrawals)
}
