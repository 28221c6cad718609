use loyalty_common::Points;
use sqlx::SqliteConnection;

use crate::{db::sqlite::SqliteDatabaseError, db_types::Balance};

/// Returns the owner's balance. Owners without a row have an empty balance.
pub async fn fetch_balance(owner: &str, conn: &mut SqliteConnection) -> Result<Balance, SqliteDatabaseError> {
    let balance = sqlx::query_as::<_, Balance>("SELECT owner, current_balance, total_withdrawn FROM balances WHERE owner = $1")
        .bind(owner)
        .fetch_optional(conn)
        .await?;
    Ok(balance.unwrap_or_else(|| Balance::empty(owner)))
}

pub async fn set_balance(
    owner: &str,
    current: Points,
    withdrawn: Points,
    conn: &mut SqliteConnection,
) -> Result<Balance, SqliteDatabaseError> {
    let balance = sqlx::query_as::<_, Balance>(
        r#"INSERT INTO balances (owner, current_balance, total_withdrawn) VALUES ($1, $2, $3)
        ON CONFLICT (owner) DO UPDATE SET
            current_balance = excluded.current_balance,
            total_withdrawn = excluded.total_withdrawn,
            updated_at = CURRENT_TIMESTAMP
        RETURNING owner, current_balance, total_withdrawn"#,
    )
    .bind(owner)
    .bind(current)
    .bind(withdrawn)
    .fetch_one(conn)
    .await?;
    Ok(balance)
}

/// Adds `amount` to the owner's current balance in a single statement, creating the row if needed.
pub async fn credit(owner: &str, amount: Points, conn: &mut SqliteConnection) -> Result<Balance, SqliteDatabaseError> {
    let balance = sqlx::query_as::<_, Balance>(
        r#"INSERT INTO balances (owner, current_balance, total_withdrawn) VALUES ($1, $2, 0)
        ON CONFLICT (owner) DO UPDATE SET
            current_balance = current_balance + excluded.current_balance,
            updated_at = CURRENT_TIMESTAMP
        RETURNING owner, current_balance, total_withdrawn"#,
    )
    .bind(owner)
    .bind(amount)
    .fetch_one(conn)
    .await?;
    Ok(balance)
}

/// Moves `amount` from the current balance to the withdrawn total, but only if the current balance covers it. Returns `None` when it does not (or
/// the owner has no balance at all), in which case nothing was written.
pub async fn debit(
    owner: &str,
    amount: Points,
    conn: &mut SqliteConnection,
) -> Result<Option<Balance>, SqliteDatabaseError> {
    let balance = sqlx::query_as::<_, Balance>(
        r#"UPDATE balances SET
            current_balance = current_balance - $1,
            total_withdrawn = total_withdrawn + $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE owner = $2 AND current_balance >= $1
        RETURNING owner, current_balance, total_withdrawn"#,
    )
    .bind(amount)
    .bind(owner)
    .fetch_optional(conn)
    .await?;
    Ok(balance)
}
