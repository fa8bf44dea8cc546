//! Session-level advisory lock that keeps two pipeline runs from writing the
//! destination tables at the same time.

use sqlx::{Connection, PgConnection, PgPool};

use crate::DbError;

/// Advisory lock key: the ASCII bytes of `trendetl`.
pub const RUN_LOCK_KEY: i64 = 0x7472_656e_6465_746c;

/// Holds the advisory lock on a connection detached from the pool.
///
/// Dropping the lock closes the connection, which releases the lock on the
/// server; [`RunLock::release`] does the same explicitly.
pub struct RunLock {
    conn: PgConnection,
}

/// Try to take the run lock without waiting.
///
/// # Errors
///
/// Returns [`DbError::RunLockHeld`] if another session holds the lock, or
/// [`DbError::Sqlx`] if a connection cannot be acquired.
pub async fn try_acquire_run_lock(pool: &PgPool) -> Result<RunLock, DbError> {
    let mut conn = pool.acquire().await?.detach();

    let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
        .bind(RUN_LOCK_KEY)
        .fetch_one(&mut conn)
        .await?;

    if !acquired {
        return Err(DbError::RunLockHeld);
    }

    tracing::debug!(key = RUN_LOCK_KEY, "run lock acquired");
    Ok(RunLock { conn })
}

impl RunLock {
    /// Unlock and close the lock connection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the unlock statement or close fails.
    pub async fn release(mut self) -> Result<(), DbError> {
        sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(RUN_LOCK_KEY)
            .fetch_one(&mut self.conn)
            .await?;
        self.conn.close().await?;
        tracing::debug!(key = RUN_LOCK_KEY, "run lock released");
        Ok(())
    }
}
