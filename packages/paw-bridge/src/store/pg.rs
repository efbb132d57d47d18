//! Postgres implementation of the ledger store.
//!
//! Amounts are stored as NUMERIC(78,0) and moved as decimal strings, cast in
//! SQL (`$n::NUMERIC`). Each mutation acquires the named lock for the touched
//! key, then commits the record row, the balance delta, and the audit row in
//! one transaction.

use alloy::primitives::U256;
use async_trait::async_trait;
use eyre::eyre;
use serde_json::json;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};

use pawchain_rs::types::{parse_units, NativeAddress};

use crate::error::{BridgeError, BridgeResult};
use crate::store::{
    locks, DepositRecord, LedgerStore, SwapToNativeRecord, SwapToWrappedRecord, WithdrawalRecord,
    HISTORY_LIMIT,
};

/// Pending claims live for 300 seconds before expiring.
const PENDING_CLAIM_TTL_SECS: f64 = 300.0;

pub struct PgLedgerStore {
    pool: PgPool,
}

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> eyre::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| eyre!("Failed to connect to database: {}", e))
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> eyre::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| eyre!("Failed to run database migrations: {}", e))?;
    Ok(())
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Credit a balance inside the transaction, creating the row on first use.
    async fn credit(
        tx: &mut Transaction<'_, Postgres>,
        native: &str,
        amount: U256,
    ) -> BridgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO balances (native, amount) VALUES ($1, $2::NUMERIC)
            ON CONFLICT (native) DO UPDATE SET
                amount = balances.amount + EXCLUDED.amount,
                updated_at = NOW()
            "#,
        )
        .bind(native)
        .bind(amount.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Debit a balance inside the transaction; fails without mutating when
    /// the balance would go negative.
    async fn debit(
        tx: &mut Transaction<'_, Postgres>,
        native: &str,
        amount: U256,
    ) -> BridgeResult<()> {
        let row = sqlx::query(
            r#"
            UPDATE balances SET amount = amount - $2::NUMERIC, updated_at = NOW()
            WHERE native = $1 AND amount >= $2::NUMERIC
            RETURNING amount::TEXT
            "#,
        )
        .bind(native)
        .bind(amount.to_string())
        .fetch_optional(&mut **tx)
        .await?;
        if row.is_none() {
            return Err(BridgeError::InsufficientBalance);
        }
        Ok(())
    }

    async fn audit(
        tx: &mut Transaction<'_, Postgres>,
        audit_key: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> BridgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_records (audit_key, kind, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (audit_key) DO NOTHING
            "#,
        )
        .bind(audit_key)
        .bind(kind)
        .bind(payload)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn store_deposit_locked(
        &self,
        native: &NativeAddress,
        amount: U256,
        ts_ms: i64,
        hash: &str,
    ) -> BridgeResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO deposits (native, tx_hash, amount, ts_ms)
            VALUES ($1, $2, $3::NUMERIC, $4)
            ON CONFLICT (native, tx_hash) DO NOTHING
            "#,
        )
        .bind(native.as_str())
        .bind(hash)
        .bind(amount.to_string())
        .bind(ts_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            // Replayed hash; the first insert already moved the balance.
            tx.rollback().await.map_err(db_err)?;
            return Ok(false);
        }

        Self::credit(&mut tx, native.as_str(), amount).await?;
        Self::audit(
            &mut tx,
            hash,
            "deposit",
            json!({
                "native": native.as_str(),
                "amount": amount.to_string(),
                "ts_ms": ts_ms,
                "hash": hash,
            }),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn store_withdrawal_locked(
        &self,
        native: &NativeAddress,
        amount: U256,
        ts_ms: i64,
        hash: &str,
    ) -> BridgeResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO withdrawals (native, ts_ms, amount, tx_hash)
            VALUES ($1, $2, $3::NUMERIC, $4)
            ON CONFLICT (native, ts_ms) DO NOTHING
            "#,
        )
        .bind(native.as_str())
        .bind(ts_ms)
        .bind(amount.to_string())
        .bind(hash)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Ok(false);
        }

        Self::debit(&mut tx, native.as_str(), amount).await?;
        Self::audit(
            &mut tx,
            &format!("{}-{}", native, ts_ms),
            "withdrawal",
            json!({
                "native": native.as_str(),
                "amount": amount.to_string(),
                "ts_ms": ts_ms,
                "hash": hash,
            }),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn store_swap_to_wrapped_locked(
        &self,
        record: &SwapToWrappedRecord,
    ) -> BridgeResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO swaps_to_wrapped (receipt, native, evm, amount, ts_ms, uuid)
            VALUES ($1, $2, $3, $4::NUMERIC, $5, $6::NUMERIC)
            ON CONFLICT (receipt) DO NOTHING
            "#,
        )
        .bind(&record.receipt)
        .bind(&record.native)
        .bind(&record.evm)
        .bind(record.amount.to_string())
        .bind(record.ts_ms)
        .bind(record.uuid.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Ok(false);
        }

        Self::debit(&mut tx, &record.native, record.amount).await?;
        Self::audit(
            &mut tx,
            &record.receipt,
            "swap-to-wrapped",
            json!({
                "native": record.native,
                "evm": record.evm,
                "amount": record.amount.to_string(),
                "ts_ms": record.ts_ms,
                "uuid": record.uuid.to_string(),
            }),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn store_swap_to_native_locked(
        &self,
        record: &SwapToNativeRecord,
    ) -> BridgeResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO swaps_to_native (evm, tx_hash, native, amount, ts_ms)
            VALUES ($1, $2, $3, $4::NUMERIC, $5)
            ON CONFLICT (evm, tx_hash) DO NOTHING
            "#,
        )
        .bind(&record.evm)
        .bind(&record.hash)
        .bind(&record.native)
        .bind(record.amount.to_string())
        .bind(record.ts_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Ok(false);
        }

        Self::credit(&mut tx, &record.native, record.amount).await?;
        Self::audit(
            &mut tx,
            &record.hash,
            "swap-to-native",
            json!({
                "evm": record.evm,
                "native": record.native,
                "amount": record.amount.to_string(),
                "ts_ms": record.ts_ms,
                "hash": record.hash,
            }),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }
}

fn db_err(e: sqlx::Error) -> BridgeError {
    BridgeError::External(e.into())
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn balance(&self, native: &NativeAddress) -> BridgeResult<U256> {
        let guard = locks::acquire(&self.pool, &locks::balance_lock(native.as_str())).await?;
        let row: Result<Option<(String,)>, BridgeError> =
            sqlx::query_as(r#"SELECT amount::TEXT FROM balances WHERE native = $1"#)
                .bind(native.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err);
        guard.release().await;
        match row? {
            Some((amount,)) => parse_units(&amount).map_err(BridgeError::External),
            None => Ok(U256::ZERO),
        }
    }

    async fn pending_claim(&self, native: &NativeAddress) -> BridgeResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT evm FROM pending_claims WHERE native = $1 AND expires_at > NOW()"#,
        )
        .bind(native.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    async fn store_pending_claim(&self, native: &NativeAddress, evm: &str) -> BridgeResult<bool> {
        // The upsert only steals the slot from an expired claim; a live claim
        // for a different evm leaves the statement rowless.
        let row = sqlx::query(
            r#"
            INSERT INTO pending_claims (native, evm, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (native) DO UPDATE SET
                evm = EXCLUDED.evm,
                expires_at = EXCLUDED.expires_at
            WHERE pending_claims.expires_at <= NOW()
            RETURNING evm
            "#,
        )
        .bind(native.as_str())
        .bind(evm)
        .bind(PENDING_CLAIM_TTL_SECS)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn is_claimed(&self, native: &NativeAddress) -> BridgeResult<bool> {
        let row: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM claims WHERE native = $1)"#)
                .bind(native.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    async fn has_claim(&self, native: &NativeAddress, evm: &str) -> BridgeResult<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"SELECT EXISTS(SELECT 1 FROM claims WHERE native = $1 AND evm = $2)"#,
        )
        .bind(native.as_str())
        .bind(evm)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn confirm_claim(&self, native: &NativeAddress) -> BridgeResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let pending: Option<(String,)> = sqlx::query_as(
            r#"DELETE FROM pending_claims WHERE native = $1 AND expires_at > NOW() RETURNING evm"#,
        )
        .bind(native.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((evm,)) = pending else {
            tx.rollback().await.map_err(db_err)?;
            return Ok(false);
        };

        // A confirmed claim is immutable; a conflicting confirm is a no-op.
        sqlx::query(
            r#"INSERT INTO claims (native, evm) VALUES ($1, $2) ON CONFLICT (native) DO NOTHING"#,
        )
        .bind(native.as_str())
        .bind(&evm)
        .execute(&mut *tx)
        .await?;

        tx.commit().await.map_err(db_err)?;
        tracing::info!(native = %native, evm = %evm, "claim confirmed");
        Ok(true)
    }

    async fn store_deposit(
        &self,
        native: &NativeAddress,
        amount: U256,
        ts_ms: i64,
        hash: &str,
    ) -> BridgeResult<bool> {
        let guard = locks::acquire(&self.pool, &locks::balance_lock(native.as_str())).await?;
        let result = self.store_deposit_locked(native, amount, ts_ms, hash).await;
        guard.release().await;
        result
    }

    async fn has_deposit(&self, native: &NativeAddress, hash: &str) -> BridgeResult<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"SELECT EXISTS(SELECT 1 FROM deposits WHERE native = $1 AND tx_hash = $2)"#,
        )
        .bind(native.as_str())
        .bind(hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn store_withdrawal(
        &self,
        native: &NativeAddress,
        amount: U256,
        ts_ms: i64,
        hash: &str,
    ) -> BridgeResult<bool> {
        let guard = locks::acquire(&self.pool, &locks::balance_lock(native.as_str())).await?;
        let result = self
            .store_withdrawal_locked(native, amount, ts_ms, hash)
            .await;
        guard.release().await;
        result
    }

    async fn has_withdrawal_at(&self, native: &NativeAddress, ts_ms: i64) -> BridgeResult<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"SELECT EXISTS(SELECT 1 FROM withdrawals WHERE native = $1 AND ts_ms = $2)"#,
        )
        .bind(native.as_str())
        .bind(ts_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn store_swap_to_wrapped(&self, record: &SwapToWrappedRecord) -> BridgeResult<bool> {
        let guard = locks::acquire(&self.pool, &locks::swap_lock(&record.native)).await?;
        let result = self.store_swap_to_wrapped_locked(record).await;
        guard.release().await;
        result
    }

    async fn store_swap_to_native(&self, record: &SwapToNativeRecord) -> BridgeResult<bool> {
        let guard = locks::acquire(&self.pool, &locks::balance_lock(&record.native)).await?;
        let result = self.store_swap_to_native_locked(record).await;
        guard.release().await;
        result
    }

    async fn has_swap_to_native(&self, evm: &str, hash: &str) -> BridgeResult<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"SELECT EXISTS(SELECT 1 FROM swaps_to_native WHERE evm = $1 AND tx_hash = $2)"#,
        )
        .bind(evm)
        .bind(hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn scan_cursor(&self) -> BridgeResult<u64> {
        let row: (i64,) = sqlx::query_as(r#"SELECT last_block FROM chain_cursor WHERE id = 1"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    async fn advance_scan_cursor(&self, block: u64) -> BridgeResult<()> {
        sqlx::query(
            r#"
            UPDATE chain_cursor SET last_block = $1, updated_at = NOW()
            WHERE id = 1 AND last_block < $1
            "#,
        )
        .bind(block as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deposit_history(
        &self,
        native: &NativeAddress,
    ) -> BridgeResult<Vec<DepositRecord>> {
        let rows: Vec<(String, String, i64, String)> = sqlx::query_as(
            r#"
            SELECT native, amount::TEXT, ts_ms, tx_hash FROM deposits
            WHERE native = $1 ORDER BY ts_ms DESC LIMIT $2
            "#,
        )
        .bind(native.as_str())
        .bind(HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(native, amount, ts_ms, hash)| {
                Ok(DepositRecord {
                    native,
                    amount: parse_units(&amount).map_err(BridgeError::External)?,
                    ts_ms,
                    hash,
                })
            })
            .collect()
    }

    async fn withdrawal_history(
        &self,
        native: &NativeAddress,
    ) -> BridgeResult<Vec<WithdrawalRecord>> {
        let rows: Vec<(String, String, i64, String)> = sqlx::query_as(
            r#"
            SELECT native, amount::TEXT, ts_ms, tx_hash FROM withdrawals
            WHERE native = $1 ORDER BY ts_ms DESC LIMIT $2
            "#,
        )
        .bind(native.as_str())
        .bind(HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(native, amount, ts_ms, hash)| {
                Ok(WithdrawalRecord {
                    native,
                    amount: parse_units(&amount).map_err(BridgeError::External)?,
                    ts_ms,
                    hash,
                })
            })
            .collect()
    }

    async fn swap_to_wrapped_history(
        &self,
        native: &NativeAddress,
    ) -> BridgeResult<Vec<SwapToWrappedRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT native, evm, amount::TEXT AS amount, ts_ms, receipt, uuid::TEXT AS uuid
            FROM swaps_to_wrapped
            WHERE native = $1 ORDER BY ts_ms DESC LIMIT $2
            "#,
        )
        .bind(native.as_str())
        .bind(HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(SwapToWrappedRecord {
                    native: row.get("native"),
                    evm: row.get("evm"),
                    amount: parse_units(row.get::<&str, _>("amount"))
                        .map_err(BridgeError::External)?,
                    ts_ms: row.get("ts_ms"),
                    receipt: row.get("receipt"),
                    uuid: parse_units(row.get::<&str, _>("uuid"))
                        .map_err(BridgeError::External)?,
                })
            })
            .collect()
    }

    async fn swap_to_native_history(&self, evm: &str) -> BridgeResult<Vec<SwapToNativeRecord>> {
        let rows: Vec<(String, String, String, i64, String)> = sqlx::query_as(
            r#"
            SELECT evm, native, amount::TEXT, ts_ms, tx_hash FROM swaps_to_native
            WHERE evm = $1 ORDER BY ts_ms DESC LIMIT $2
            "#,
        )
        .bind(evm)
        .bind(HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(evm, native, amount, ts_ms, hash)| {
                Ok(SwapToNativeRecord {
                    evm,
                    native,
                    amount: parse_units(&amount).map_err(BridgeError::External)?,
                    ts_ms,
                    hash,
                })
            })
            .collect()
    }
}
