//! Durable multi-topic job queue on Postgres.
//!
//! Jobs carry natural ids (`<topic>-<k1>-<k2>`), so a duplicate enqueue is a
//! no-op at the insert. Each topic runs a single worker that claims due jobs
//! FIFO, runs the registered processor under a 30 s wall timeout, and either
//! completes the row, reschedules it with exponential backoff (retryable
//! errors, 3 attempts), or marks it failed. Completed rows are pruned beyond
//! a retention window; failed rows are kept for inspection unless the job was
//! flagged `remove_on_fail`.
//!
//! Waiting and delayed jobs survive restarts: workers resume from the table.

use alloy::primitives::U256;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};

use pawchain_rs::types::parse_units;

use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::types::{
    DepositJob, EvmScanJob, SwapToNativeJob, SwapToWrappedJob, Topic, WithdrawalJob,
};

/// Wall-clock limit per job execution.
const JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts before a retryable failure becomes terminal.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First retry delay; doubles per attempt.
const BACKOFF_BASE_MS: u64 = 1000;

/// Completed rows kept before pruning.
const COMPLETED_RETENTION: i64 = 100_000;

/// Delay step for pending-withdrawal replacements.
const PENDING_WITHDRAWAL_DELAY: Duration = Duration::from_secs(60);

/// Idle poll interval per worker.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A claimed job handed to a processor.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub topic: Topic,
    pub payload: serde_json::Value,
    pub attempt: u32,
}

impl Job {
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> BridgeResult<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| BridgeError::External(eyre::eyre!("malformed {} payload: {}", self.id, e)))
    }
}

/// Outcome of a finished job, fanned out to listeners (notification bus,
/// metrics).
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed {
        id: String,
        topic: Topic,
        native: Option<String>,
        result: serde_json::Value,
    },
    Failed {
        id: String,
        topic: Topic,
        native: Option<String>,
        code: &'static str,
        message: String,
    },
}

/// Work handler for one topic.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> BridgeResult<serde_json::Value>;
}

/// Enqueue capability used by the API, the watchers, and the bridge service.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue_deposit(&self, job: &DepositJob) -> BridgeResult<()>;
    async fn enqueue_withdrawal(&self, job: &WithdrawalJob) -> BridgeResult<()>;
    async fn enqueue_swap_to_wrapped(&self, job: &SwapToWrappedJob) -> BridgeResult<()>;
    async fn enqueue_swap_to_native(&self, job: &SwapToNativeJob) -> BridgeResult<()>;
    async fn enqueue_evm_scan(&self, job: &EvmScanJob) -> BridgeResult<()>;

    /// Schedule a delayed replacement for a withdrawal the hot wallet cannot
    /// cover yet. Increments the attempt counter; the replacement runs after
    /// `attempt × 60 s` and is deleted outright if it fails.
    async fn enqueue_pending_withdrawal(&self, job: &WithdrawalJob) -> BridgeResult<()>;

    /// Sum of amounts reserved by waiting and delayed pending-withdrawal
    /// jobs, in atomic units.
    async fn pending_withdrawals_amount(&self) -> BridgeResult<U256>;
}

/// Postgres-backed queue with one worker task per registered topic.
pub struct PgQueue {
    pool: PgPool,
    processors: RwLock<HashMap<Topic, Arc<dyn JobProcessor>>>,
    outcomes: broadcast::Sender<JobOutcome>,
}

impl PgQueue {
    pub fn new(pool: PgPool) -> Self {
        let (outcomes, _) = broadcast::channel(1024);
        Self {
            pool,
            processors: RwLock::new(HashMap::new()),
            outcomes,
        }
    }

    /// Install the work handler for a topic. Handlers are installed during
    /// construction, before `start`; at runtime the queue only reads them.
    pub async fn register_processor(&self, topic: Topic, processor: Arc<dyn JobProcessor>) {
        self.processors.write().await.insert(topic, processor);
    }

    /// Listen for job completions and failures.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<JobOutcome> {
        self.outcomes.subscribe()
    }

    /// Spawn one worker per registered topic. Workers stop claiming new jobs
    /// when `shutdown` flips; in-flight jobs complete or time out first.
    pub async fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
        let processors = self.processors.read().await;
        for (&topic, processor) in processors.iter() {
            let queue = Arc::clone(self);
            let processor = Arc::clone(processor);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                queue.worker_loop(topic, processor, shutdown).await;
            });
            tracing::info!(topic = %topic, "queue worker started");
        }
    }

    async fn worker_loop(
        &self,
        topic: Topic,
        processor: Arc<dyn JobProcessor>,
        shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                tracing::info!(topic = %topic, "queue worker stopping");
                return;
            }

            let job = match self.claim_next(topic).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
                Err(e) => {
                    tracing::error!(topic = %topic, error = %e, "failed to claim job");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            let outcome = match tokio::time::timeout(JOB_TIMEOUT, processor.process(&job)).await {
                Ok(Ok(result)) => self.complete(&job, result).await,
                Ok(Err(error)) => self.handle_failure(&job, error).await,
                Err(_) => {
                    self.handle_failure(
                        &job,
                        BridgeError::External(eyre::eyre!(
                            "job timed out after {:?}",
                            JOB_TIMEOUT
                        )),
                    )
                    .await
                }
            };

            if let Err(e) = outcome {
                tracing::error!(topic = %topic, job = %job.id, error = %e, "failed to persist job outcome");
            }
        }
    }

    /// Claim the oldest due job for a topic.
    async fn claim_next(&self, topic: Topic) -> BridgeResult<Option<Job>> {
        let row = sqlx::query(
            r#"
            UPDATE jobs SET status = 'active', updated_at = NOW()
            WHERE id = (
                SELECT id FROM jobs
                WHERE topic = $1 AND status = 'waiting' AND run_at <= NOW()
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload, attempt
            "#,
        )
        .bind(topic.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Job {
            id: row.get("id"),
            topic,
            payload: row.get("payload"),
            attempt: row.get::<i32, _>("attempt") as u32,
        }))
    }

    async fn complete(&self, job: &Job, result: serde_json::Value) -> BridgeResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET status = 'completed', result = $2,
                completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&job.id)
        .bind(&result)
        .execute(&self.pool)
        .await?;

        self.prune_completed().await?;
        metrics::record_job_completed(job.topic.as_str());
        tracing::info!(topic = %job.topic, job = %job.id, "job completed");

        let _ = self.outcomes.send(JobOutcome::Completed {
            id: job.id.clone(),
            topic: job.topic,
            native: payload_native(&job.payload),
            result,
        });
        Ok(())
    }

    async fn handle_failure(&self, job: &Job, error: BridgeError) -> BridgeResult<()> {
        let next_attempt = job.attempt + 1;

        if error.is_retryable() && next_attempt < DEFAULT_MAX_ATTEMPTS {
            let backoff_ms = BACKOFF_BASE_MS * 2u64.pow(job.attempt);
            sqlx::query(
                r#"
                UPDATE jobs SET status = 'waiting', attempt = $2, last_error = $3,
                    run_at = NOW() + make_interval(secs => $4), updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(&job.id)
            .bind(next_attempt as i32)
            .bind(error.to_string())
            .bind(backoff_ms as f64 / 1000.0)
            .execute(&self.pool)
            .await?;

            metrics::record_job_retry(job.topic.as_str());
            tracing::warn!(
                topic = %job.topic,
                job = %job.id,
                attempt = next_attempt,
                backoff_ms,
                error = %error,
                "job failed, retrying with backoff"
            );
            return Ok(());
        }

        let remove: bool = sqlx::query_scalar(r#"SELECT remove_on_fail FROM jobs WHERE id = $1"#)
            .bind(&job.id)
            .fetch_one(&self.pool)
            .await?;

        if remove {
            sqlx::query(r#"DELETE FROM jobs WHERE id = $1"#)
                .bind(&job.id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE jobs SET status = 'failed', attempt = $2, last_error = $3,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(&job.id)
            .bind(next_attempt as i32)
            .bind(error.to_string())
            .execute(&self.pool)
            .await?;
        }

        metrics::record_job_failed(job.topic.as_str(), error.code());
        tracing::warn!(
            topic = %job.topic,
            job = %job.id,
            code = error.code(),
            error = %error,
            "job failed terminally"
        );

        let _ = self.outcomes.send(JobOutcome::Failed {
            id: job.id.clone(),
            topic: job.topic,
            native: payload_native(&job.payload),
            code: error.code(),
            message: error.to_string(),
        });
        Ok(())
    }

    /// Keep the completed set bounded.
    async fn prune_completed(&self) -> BridgeResult<()> {
        sqlx::query(
            r#"
            DELETE FROM jobs WHERE status = 'completed' AND completed_at < (
                SELECT completed_at FROM jobs WHERE status = 'completed'
                ORDER BY completed_at DESC OFFSET $1 LIMIT 1
            )
            "#,
        )
        .bind(COMPLETED_RETENTION)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a job; a duplicate id is a no-op.
    async fn enqueue(
        &self,
        id: &str,
        topic: Topic,
        payload: serde_json::Value,
        delay: Option<Duration>,
        remove_on_fail: bool,
    ) -> BridgeResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (id, topic, payload, max_attempts, remove_on_fail, run_at)
            VALUES ($1, $2, $3, $4, $5, NOW() + make_interval(secs => $6))
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(topic.as_str())
        .bind(&payload)
        .bind(DEFAULT_MAX_ATTEMPTS as i32)
        .bind(remove_on_fail)
        .bind(delay.map(|d| d.as_secs_f64()).unwrap_or(0.0))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            tracing::debug!(job = %id, "duplicate enqueue ignored");
        } else {
            metrics::record_job_enqueued(topic.as_str());
            tracing::debug!(topic = %topic, job = %id, delayed = delay.is_some(), "job enqueued");
        }
        Ok(())
    }
}

fn to_payload<T: serde::Serialize>(job: &T) -> BridgeResult<serde_json::Value> {
    serde_json::to_value(job).map_err(|e| BridgeError::External(e.into()))
}

/// Owner routing key of a payload, when it has one.
fn payload_native(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("native")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl JobQueue for PgQueue {
    async fn enqueue_deposit(&self, job: &DepositJob) -> BridgeResult<()> {
        self.enqueue(
            &job.job_id(),
            Topic::Deposit,
            to_payload(job)?,
            None,
            false,
        )
        .await
    }

    async fn enqueue_withdrawal(&self, job: &WithdrawalJob) -> BridgeResult<()> {
        self.enqueue(
            &job.job_id(),
            Topic::Withdrawal,
            to_payload(job)?,
            None,
            false,
        )
        .await
    }

    async fn enqueue_swap_to_wrapped(&self, job: &SwapToWrappedJob) -> BridgeResult<()> {
        self.enqueue(
            &job.job_id(),
            Topic::SwapToWrapped,
            to_payload(job)?,
            None,
            false,
        )
        .await
    }

    async fn enqueue_swap_to_native(&self, job: &SwapToNativeJob) -> BridgeResult<()> {
        self.enqueue(
            &job.job_id(),
            Topic::SwapToNative,
            to_payload(job)?,
            None,
            false,
        )
        .await
    }

    async fn enqueue_evm_scan(&self, job: &EvmScanJob) -> BridgeResult<()> {
        self.enqueue(
            &job.job_id(),
            Topic::EvmScan,
            to_payload(job)?,
            None,
            false,
        )
        .await
    }

    async fn enqueue_pending_withdrawal(&self, job: &WithdrawalJob) -> BridgeResult<()> {
        let mut replacement = job.clone();
        replacement.attempt += 1;
        // The first attempt already validated the signature
        replacement.signature = None;
        let delay = PENDING_WITHDRAWAL_DELAY * replacement.attempt;

        tracing::info!(
            native = %replacement.native,
            ts_ms = replacement.ts_ms,
            attempt = replacement.attempt,
            delay_secs = delay.as_secs(),
            "scheduling delayed pending withdrawal"
        );

        self.enqueue(
            &replacement.pending_job_id(),
            Topic::Withdrawal,
            to_payload(&replacement)?,
            Some(delay),
            true,
        )
        .await
    }

    async fn pending_withdrawals_amount(&self) -> BridgeResult<U256> {
        let total: String = sqlx::query_scalar(
            r#"
            SELECT (COALESCE(SUM((payload->>'amount')::NUMERIC), 0) * 1000000000)::NUMERIC(78,0)::TEXT
            FROM jobs
            WHERE id LIKE 'pending-withdrawal-%' AND status = 'waiting'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        parse_units(&total).map_err(BridgeError::External)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(BACKOFF_BASE_MS * 2u64.pow(0), 1000);
        assert_eq!(BACKOFF_BASE_MS * 2u64.pow(1), 2000);
        assert_eq!(BACKOFF_BASE_MS * 2u64.pow(2), 4000);
    }

    #[test]
    fn test_pending_withdrawal_delay_scales_with_attempt() {
        assert_eq!(PENDING_WITHDRAWAL_DELAY * 1, Duration::from_secs(60));
        assert_eq!(PENDING_WITHDRAWAL_DELAY * 3, Duration::from_secs(180));
    }

    #[test]
    fn test_payload_native_extraction() {
        let payload = serde_json::json!({"native": "paw_1abc", "amount": "5"});
        assert_eq!(payload_native(&payload), Some("paw_1abc".to_string()));

        let scan = serde_json::json!({"from": 1, "to": 1000});
        assert_eq!(payload_native(&scan), None);
    }
}
