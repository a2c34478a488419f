//! In-process task queue.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::{SchedError, SchedResult};
use crate::queue::{Delivery, QueueStats, RetryDecision, Task, TaskQueue};

#[derive(Debug)]
struct Waiting {
    delivery: Delivery,
    available_at: Instant,
}

#[derive(Debug)]
struct Claimed {
    delivery: Delivery,
    claimed_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    waiting: Vec<Waiting>,
    in_flight: FxHashMap<u64, Claimed>,
    next_id: u64,
    closed: bool,
}

impl State {
    /// Put deliveries claimed longer than `timeout` ago back in line.
    fn reclaim_expired(&mut self, now: Instant, timeout: Duration) {
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, c)| now.duration_since(c.claimed_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(Claimed { mut delivery, .. }) = self.in_flight.remove(&id) {
                delivery.attempt += 1;
                warn!(id, attempt = delivery.attempt, "Reclaiming unacknowledged task");
                self.waiting.push(Waiting {
                    delivery,
                    available_at: now,
                });
            }
        }
    }

    /// Remove the claim matching `delivery`. Stale copies of a reclaimed
    /// delivery do not match.
    fn take_claim(&mut self, delivery: &Delivery) -> Option<Delivery> {
        let current = self.in_flight.get(&delivery.id)?;
        if current.delivery.attempt != delivery.attempt {
            return None;
        }
        self.in_flight.remove(&delivery.id).map(|c| c.delivery)
    }
}

/// In-memory task queue.
///
/// Suitable for tests and single-process deployments. Delays follow
/// `tokio::time`, so paused-clock tests can fast-forward countdowns.
#[derive(Debug)]
pub struct InMemoryQueue {
    state: Mutex<State>,
    config: QueueConfig,
}

impl InMemoryQueue {
    /// Create a queue with the default retry policy (no retries).
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            config,
        }
    }

    /// Stop accepting work. Later enqueues and stats fail with
    /// `QueueUnavailable`, which is how tests simulate a lost backend.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
    }

    fn lock(&self) -> SchedResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| SchedError::Internal(format!("queue lock poisoned: {e}")))
    }

    fn open(&self) -> SchedResult<MutexGuard<'_, State>> {
        let state = self.lock()?;
        if state.closed {
            return Err(SchedError::QueueUnavailable("queue is closed".to_string()));
        }
        Ok(state)
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn enqueue(&self, task: Task, delay: Duration) -> SchedResult<()> {
        let mut state = self.open()?;
        state.next_id += 1;
        let id = state.next_id;
        debug!(id, kind = task.kind(), ?delay, "Enqueued task");
        state.waiting.push(Waiting {
            delivery: Delivery {
                id,
                task,
                attempt: 1,
                enqueued_at: Utc::now(),
            },
            available_at: Instant::now() + delay,
        });
        Ok(())
    }

    async fn dequeue(&self) -> SchedResult<Option<Delivery>> {
        let mut state = self.lock()?;
        if state.closed {
            return Ok(None);
        }

        let now = Instant::now();
        state.reclaim_expired(now, self.config.visibility_timeout);
        let next = state
            .waiting
            .iter()
            .enumerate()
            .filter(|(_, w)| w.available_at <= now)
            .min_by_key(|(_, w)| (w.available_at, w.delivery.id))
            .map(|(idx, _)| idx);

        Ok(next.map(|idx| {
            let delivery = state.waiting.remove(idx).delivery;
            state.in_flight.insert(
                delivery.id,
                Claimed {
                    delivery: delivery.clone(),
                    claimed_at: now,
                },
            );
            delivery
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> SchedResult<()> {
        let mut state = self.lock()?;
        if state.take_claim(delivery).is_none() {
            debug!(id = delivery.id, "Ack for a delivery no longer held");
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, error: &str) -> SchedResult<RetryDecision> {
        let mut state = self.lock()?;
        let Some(mut failed) = state.take_claim(delivery) else {
            return Err(SchedError::Internal(format!(
                "delivery {} is not in flight",
                delivery.id
            )));
        };

        match self.config.retry_delay(failed.attempt) {
            Some(delay) => {
                failed.attempt += 1;
                let next_attempt = failed.attempt;
                debug!(id = failed.id, next_attempt, ?delay, error, "Retrying task");
                state.waiting.push(Waiting {
                    delivery: failed,
                    available_at: Instant::now() + delay,
                });
                Ok(RetryDecision::Retry {
                    delay,
                    next_attempt,
                })
            }
            None => {
                debug!(id = failed.id, error, "Giving up on task");
                Ok(RetryDecision::GiveUp)
            }
        }
    }

    async fn stats(&self) -> SchedResult<QueueStats> {
        let mut state = self.open()?;
        let now = Instant::now();
        state.reclaim_expired(now, self.config.visibility_timeout);
        let ready = state
            .waiting
            .iter()
            .filter(|w| w.available_at <= now)
            .count();
        Ok(QueueStats {
            ready,
            scheduled: state.waiting.len() - ready,
            in_flight: state.in_flight.len(),
        })
    }
}
