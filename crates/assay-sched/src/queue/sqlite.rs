//! Durable task queue stored in SQLite.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::{SchedError, SchedResult};
use crate::persistence::open_sqlite;
use crate::queue::{Delivery, QueueStats, RetryDecision, Task, TaskQueue};

/// SQLite-backed task queue.
///
/// Claims happen inside immediate transactions, so several worker
/// processes can poll the same file and each row is handed out once.
pub struct SqliteQueue {
    conn: Arc<Mutex<Connection>>,
    config: QueueConfig,
}

impl SqliteQueue {
    /// Open (or create) a queue at the given path.
    pub fn new(path: impl AsRef<Path>, config: QueueConfig) -> SchedResult<Self> {
        Self::from_connection(open_sqlite(Some(path.as_ref()))?, config)
    }

    /// Create a private in-memory queue.
    pub fn in_memory(config: QueueConfig) -> SchedResult<Self> {
        Self::from_connection(open_sqlite(None)?, config)
    }

    fn from_connection(conn: Connection, config: QueueConfig) -> SchedResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 1,
                available_at INTEGER NOT NULL,
                enqueued_at TEXT NOT NULL,
                claimed_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_ready ON tasks(claimed_at, available_at);
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    fn lock(&self) -> SchedResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SchedError::DatabaseError(e.to_string()))
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(delay: Duration) -> i64 {
    i64::try_from(delay.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl TaskQueue for SqliteQueue {
    async fn enqueue(&self, task: Task, delay: Duration) -> SchedResult<()> {
        let conn = self.lock()?;
        let payload = serde_json::to_string(&task)?;
        conn.execute(
            r#"
            INSERT INTO tasks (kind, payload, available_at, enqueued_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            rusqlite::params![
                task.kind(),
                payload,
                now_millis().saturating_add(millis(delay)),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| SchedError::QueueUnavailable(e.to_string()))?;
        debug!(kind = task.kind(), ?delay, "Enqueued task");
        Ok(())
    }

    async fn dequeue(&self) -> SchedResult<Option<Delivery>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_millis();
        let stale_before = now.saturating_sub(millis(self.config.visibility_timeout));

        loop {
            let row: Option<(i64, String, u32, String, Option<i64>)> = tx
                .query_row(
                    r#"
                    SELECT id, payload, attempt, enqueued_at, claimed_at FROM tasks
                    WHERE (claimed_at IS NULL AND available_at <= ?1)
                       OR (claimed_at IS NOT NULL AND claimed_at <= ?2)
                    ORDER BY available_at, id
                    LIMIT 1
                    "#,
                    rusqlite::params![now, stale_before],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, payload, mut attempt, enqueued_at, claimed_at)) = row else {
                tx.commit()?;
                return Ok(None);
            };

            let task: Task = match serde_json::from_str(&payload) {
                Ok(task) => task,
                Err(e) => {
                    warn!(id, "Dropping undecodable task: {}", e);
                    tx.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?;
                    continue;
                }
            };

            if claimed_at.is_some() {
                attempt += 1;
                warn!(id, attempt, "Reclaiming unacknowledged task");
            }

            tx.execute(
                "UPDATE tasks SET claimed_at = ?2, attempt = ?3 WHERE id = ?1",
                rusqlite::params![id, now, attempt],
            )?;
            tx.commit()?;

            let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            return Ok(Some(Delivery {
                id: u64::try_from(id).unwrap_or_default(),
                task,
                attempt,
                enqueued_at,
            }));
        }
    }

    async fn ack(&self, delivery: &Delivery) -> SchedResult<()> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND attempt = ?2",
            rusqlite::params![delivery.id as i64, delivery.attempt],
        )?;
        if removed == 0 {
            debug!(id = delivery.id, "Ack for a delivery no longer held");
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, error: &str) -> SchedResult<RetryDecision> {
        let conn = self.lock()?;
        let not_held =
            || SchedError::Internal(format!("delivery {} is not in flight", delivery.id));

        match self.config.retry_delay(delivery.attempt) {
            Some(delay) => {
                let next_attempt = delivery.attempt + 1;
                let updated = conn.execute(
                    r#"
                    UPDATE tasks
                    SET claimed_at = NULL, attempt = ?3, available_at = ?4
                    WHERE id = ?1 AND attempt = ?2
                    "#,
                    rusqlite::params![
                        delivery.id as i64,
                        delivery.attempt,
                        next_attempt,
                        now_millis().saturating_add(millis(delay)),
                    ],
                )?;
                if updated == 0 {
                    return Err(not_held());
                }
                debug!(id = delivery.id, next_attempt, ?delay, error, "Retrying task");
                Ok(RetryDecision::Retry {
                    delay,
                    next_attempt,
                })
            }
            None => {
                let removed = conn.execute(
                    "DELETE FROM tasks WHERE id = ?1 AND attempt = ?2",
                    rusqlite::params![delivery.id as i64, delivery.attempt],
                )?;
                if removed == 0 {
                    return Err(not_held());
                }
                debug!(id = delivery.id, error, "Giving up on task");
                Ok(RetryDecision::GiveUp)
            }
        }
    }

    async fn stats(&self) -> SchedResult<QueueStats> {
        let conn = self.lock()?;
        let now = now_millis();
        let stale_before = now.saturating_sub(millis(self.config.visibility_timeout));
        let (ready, scheduled, in_flight): (i64, i64, i64) = conn.query_row(
            r#"
            SELECT
                COALESCE(SUM(
                    (claimed_at IS NULL AND available_at <= ?1)
                    OR (claimed_at IS NOT NULL AND claimed_at <= ?2)
                ), 0),
                COALESCE(SUM(claimed_at IS NULL AND available_at > ?1), 0),
                COALESCE(SUM(claimed_at IS NOT NULL AND claimed_at > ?2), 0)
            FROM tasks
            "#,
            rusqlite::params![now, stale_before],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(QueueStats {
            ready: usize::try_from(ready).unwrap_or_default(),
            scheduled: usize::try_from(scheduled).unwrap_or_default(),
            in_flight: usize::try_from(in_flight).unwrap_or_default(),
        })
    }
}
