//! Named mutexes over Postgres rows.
//!
//! A lock is a row in `ledger_locks` with a holder token and a 1 s expiry.
//! Acquisition upserts the row, stealing it only when the previous holder's
//! TTL has lapsed; a holder that outlives its TTL must treat its work as
//! aborted. Acquisition is retried up to 10 times with 0–400 ms of jitter
//! between attempts, after which the operation fails with a retryable
//! contention error that bubbles to the queue.

use rand::Rng;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{BridgeError, BridgeResult};

const MAX_ATTEMPTS: u32 = 10;
const LOCK_TTL_SECS: f64 = 1.0;

/// A held named lock. Release explicitly; the TTL reclaims leaked locks.
pub struct LockGuard {
    pool: PgPool,
    name: String,
    holder: Uuid,
}

impl LockGuard {
    /// Best-effort release. A failure here only delays the next acquirer by
    /// the remaining TTL.
    pub async fn release(self) {
        let result = sqlx::query("DELETE FROM ledger_locks WHERE name = $1 AND holder = $2")
            .bind(&self.name)
            .bind(self.holder)
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            tracing::warn!(lock = %self.name, error = %e, "failed to release lock, TTL will reclaim");
        }
    }
}

/// Acquire the named lock, retrying with jitter.
pub async fn acquire(pool: &PgPool, name: &str) -> BridgeResult<LockGuard> {
    let holder = Uuid::new_v4();

    for attempt in 0..MAX_ATTEMPTS {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO ledger_locks (name, holder, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (name) DO UPDATE SET
                holder = EXCLUDED.holder,
                expires_at = EXCLUDED.expires_at
            WHERE ledger_locks.expires_at <= NOW()
            RETURNING holder
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(LOCK_TTL_SECS)
        .fetch_optional(pool)
        .await
        .map_err(|e| BridgeError::External(e.into()))?;

        if row.is_some() {
            return Ok(LockGuard {
                pool: pool.clone(),
                name: name.to_string(),
                holder,
            });
        }

        if attempt + 1 < MAX_ATTEMPTS {
            crate::metrics::record_lock_retry(name);
            let jitter_ms = rand::thread_rng().gen_range(0..=400u64);
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
        }
    }

    tracing::warn!(lock = %name, "lock acquisition exhausted after {} attempts", MAX_ATTEMPTS);
    Err(BridgeError::ContentionTimeout(name.to_string()))
}

/// Lock name guarding a user's balance (deposits, withdrawals, wrapped→native
/// credits).
pub fn balance_lock(native: &str) -> String {
    format!("balance:{}", native)
}

/// Lock name guarding native→wrapped debits. Kept separate so a swap and a
/// landing deposit for the same address can proceed concurrently; both still
/// linearise at the store.
pub fn swap_lock(native: &str) -> String {
    format!("swap-to-wrapped:{}", native)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_names() {
        assert_eq!(balance_lock("paw_1abc"), "balance:paw_1abc");
        assert_eq!(swap_lock("paw_1abc"), "swap-to-wrapped:paw_1abc");
    }
}
