//! Transactional email outbox.
//!
//! Registration and verification resends write a row to `email_outbox` in the
//! same transaction as the account change. A background task claims due rows
//! with `FOR UPDATE SKIP LOCKED`, hands them to an [`EmailSender`] and records
//! the outcome: `sent`, `pending` again with a backoff, or `failed` once the
//! attempt budget is spent.
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

pub const TEMPLATE_VERIFY_EMAIL: &str = "verify_email";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message. An error schedules a retry.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Writes the message to the log instead of delivering it.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email delivered to log"
        );
        Ok(())
    }
}

/// Queue a verification email inside the caller's transaction.
///
/// # Errors
/// Returns an error if the insert fails.
pub async fn enqueue_verification(
    tx: &mut Transaction<'_, Postgres>,
    to_email: &str,
    name: &str,
    verify_url: &str,
) -> Result<(), sqlx::Error> {
    let payload = json!({ "name": name, "verify_url": verify_url });
    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(TEMPLATE_VERIFY_EMAIL)
        .bind(payload)
        .execute(&mut **tx)
        .instrument(span)
        .await?;
    Ok(())
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Base and cap of the retry backoff. The cap never drops below the base.
    #[must_use]
    pub fn with_backoff_seconds(mut self, base: u64, max: u64) -> Self {
        let base = base.max(1);
        self.backoff_base = Duration::from_secs(base);
        self.backoff_max = Duration::from_secs(max.max(base));
        self
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do with a row after a delivery attempt.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Sent,
    Retry(Duration),
    Failed,
}

impl Outcome {
    fn status(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Retry(_) => "pending",
            Self::Failed => "failed",
        }
    }
}

fn outcome(attempt: u32, delivered: bool, config: &EmailWorkerConfig) -> Outcome {
    if delivered {
        Outcome::Sent
    } else if attempt >= config.max_attempts {
        Outcome::Failed
    } else {
        Outcome::Retry(jitter(backoff(attempt, config)))
    }
}

/// `base * 2^(attempt-1)`, capped.
fn backoff(attempt: u32, config: &EmailWorkerConfig) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    config
        .backoff_base
        .checked_mul(1u32 << shift)
        .map_or(config.backoff_max, |delay| delay.min(config.backoff_max))
}

/// Uniform in `[delay/2, delay]`.
fn jitter(delay: Duration) -> Duration {
    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if millis < 2 {
        return delay;
    }
    let half = millis / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
}

/// Spawn the background task that drains the outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match drain_once(&pool, sender.as_ref(), &config).await {
                Ok(0) => {}
                Ok(count) => debug!(count, "email outbox batch processed"),
                Err(err) => error!("email outbox batch failed: {err:#}"),
            }
            sleep(config.poll_interval()).await;
        }
    })
}

/// Claim and process one batch of due messages. Returns how many rows were claimed.
///
/// # Errors
/// Returns an error if the batch cannot be loaded or its outcome cannot be stored.
pub async fn drain_once(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    let claimed = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let message = EmailMessage {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        let result = sender.send(&message).await;
        let attempt = u32::try_from(attempts).unwrap_or(0).saturating_add(1);
        let next = outcome(attempt, result.is_ok(), config);
        let last_error = result.err().map(|err| err.to_string());
        record_outcome(&mut tx, id, attempt, &next, last_error.as_deref()).await?;
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(claimed)
}

async fn record_outcome(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    attempt: u32,
    outcome: &Outcome,
    last_error: Option<&str>,
) -> Result<()> {
    let delay_ms = match outcome {
        Outcome::Retry(delay) => i64::try_from(delay.as_millis()).unwrap_or(i64::MAX),
        Outcome::Sent | Outcome::Failed => 0,
    };
    let query = r"
        UPDATE email_outbox
        SET status = $2,
            attempts = $3,
            last_error = $4,
            sent_at = CASE WHEN $2 = 'sent' THEN NOW() ELSE sent_at END,
            next_attempt_at = NOW() + ($5 * INTERVAL '1 millisecond')
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(outcome.status())
        .bind(i32::try_from(attempt).unwrap_or(i32::MAX))
        .bind(last_error)
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .with_context(|| format!("failed to record email outbox outcome for {id}"))?;
    Ok(())
}
