//! In-process broker for tests and single-process runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::queue::{Delivery, TaskBroker, TaskQueue};
use crate::task::{QueueName, Task, TaskEnvelope, TaskId};

/// A dead-lettered task and the last error it failed with.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub envelope: TaskEnvelope,
    pub error: String,
}

#[derive(Default)]
struct State {
    ready: HashMap<QueueName, VecDeque<(Instant, TaskEnvelope)>>,
    in_flight: HashMap<String, (Instant, TaskEnvelope)>,
    dead: Vec<DeadLetter>,
    history: VecDeque<(QueueName, Task)>,
}

/// Oldest entries are dropped from the history past this length.
pub const HISTORY_LIMIT: usize = 10_000;

/// When an unsettled delivery counts as abandoned, and how many attempts a
/// task gets before an abandoned one is dead-lettered instead of redelivered.
#[derive(Debug, Clone, Copy)]
struct Reclaim {
    min_idle: Duration,
    max_attempts: u32,
}

/// Broker holding everything in memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
    receipts: AtomicU64,
    reject_enqueue: AtomicBool,
    reclaim: Option<Reclaim>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let [`recover`](TaskBroker::recover) redeliver tasks left unsettled
    /// for `min_idle`, dead-lettering those already on `max_attempts`.
    pub fn with_reclaim(mut self, min_idle: Duration, max_attempts: u32) -> Self {
        self.reclaim = Some(Reclaim {
            min_idle,
            max_attempts,
        });
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every following enqueue fail.
    pub fn set_reject_enqueue(&self, reject: bool) {
        self.reject_enqueue.store(reject, Ordering::SeqCst);
    }

    /// Tasks waiting on `queue`, due or not, in delivery order.
    pub fn pending(&self, queue: QueueName) -> Vec<Task> {
        self.state()
            .ready
            .get(&queue)
            .map(|q| q.iter().map(|(_, e)| e.task.clone()).collect())
            .unwrap_or_default()
    }

    /// The last [`HISTORY_LIMIT`] tasks accepted, with the queue each went to.
    pub fn history(&self) -> Vec<(QueueName, Task)> {
        self.state().history.iter().cloned().collect()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state().dead.clone()
    }

    /// Tasks waiting or in flight.
    pub fn len(&self) -> usize {
        let state = self.state();
        state.ready.values().map(VecDeque::len).sum::<usize>() + state.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, envelope: TaskEnvelope, not_before: Instant) {
        let mut state = self.state();
        state
            .ready
            .entry(envelope.queue)
            .or_default()
            .push_back((not_before, envelope));
    }

    fn settle(&self, delivery: &Delivery) -> QueueResult<TaskEnvelope> {
        self.state()
            .in_flight
            .remove(&delivery.receipt)
            .map(|(_, envelope)| envelope)
            .ok_or_else(|| QueueError::dequeue_failed(format!("unknown receipt {}", delivery.receipt)))
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, queue: QueueName, task: Task) -> QueueResult<TaskId> {
        if self.reject_enqueue.load(Ordering::SeqCst) {
            return Err(QueueError::enqueue_failed("queue is rejecting work"));
        }
        let envelope = TaskEnvelope::new(queue, task.clone());
        let id = envelope.id.clone();
        {
            let mut state = self.state();
            if state.history.len() >= HISTORY_LIMIT {
                state.history.pop_front();
            }
            state.history.push_back((queue, task));
        }
        self.push(envelope, Instant::now());
        debug!(queue = %queue, task_id = %id, "Enqueued task in memory");
        Ok(id)
    }
}

#[async_trait]
impl TaskBroker for MemoryQueue {
    async fn fetch(&self, _consumer: &str, max: usize) -> QueueResult<Vec<Delivery>> {
        let now = Instant::now();
        let mut state = self.state();
        let mut taken = Vec::new();

        for queue in QueueName::ALL {
            let Some(q) = state.ready.get_mut(&queue) else {
                continue;
            };
            let mut waiting = VecDeque::with_capacity(q.len());
            while let Some((not_before, envelope)) = q.pop_front() {
                if taken.len() < max && not_before <= now {
                    taken.push(envelope);
                } else {
                    waiting.push_back((not_before, envelope));
                }
            }
            *q = waiting;
        }

        let deliveries: Vec<Delivery> = taken
            .into_iter()
            .map(|envelope| Delivery {
                receipt: self.receipts.fetch_add(1, Ordering::SeqCst).to_string(),
                envelope,
            })
            .collect();
        for d in &deliveries {
            state
                .in_flight
                .insert(d.receipt.clone(), (now, d.envelope.clone()));
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.settle(delivery).map(|_| ())
    }

    async fn retry(&self, delivery: &Delivery, delay: Duration, error: &str) -> QueueResult<()> {
        let envelope = self.settle(delivery)?;
        debug!(task_id = %envelope.id, attempt = envelope.attempt, error, "Scheduling retry in memory");
        self.push(envelope.next_attempt(), Instant::now() + delay);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let envelope = self.settle(delivery)?;
        warn!(task_id = %envelope.id, task = %envelope.task.name(), error, "Dead-lettered task");
        self.state().dead.push(DeadLetter {
            envelope,
            error: error.to_string(),
        });
        Ok(())
    }

    async fn recover(&self, _consumer: &str) -> QueueResult<usize> {
        let Some(reclaim) = self.reclaim else {
            return Ok(0);
        };
        let now = Instant::now();
        let mut state = self.state();

        let stale: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, (fetched, _))| now.duration_since(*fetched) >= reclaim.min_idle)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        let mut requeued = 0;
        for receipt in stale {
            let Some((_, envelope)) = state.in_flight.remove(&receipt) else {
                continue;
            };
            if envelope.attempt >= reclaim.max_attempts {
                warn!(task_id = %envelope.id, attempt = envelope.attempt, "Abandoned task is out of attempts");
                let error = format!("abandoned on attempt {}", envelope.attempt);
                state.dead.push(DeadLetter { envelope, error });
            } else {
                debug!(task_id = %envelope.id, "Reclaimed abandoned task");
                let next = envelope.next_attempt();
                state.ready.entry(next.queue).or_default().push_back((now, next));
                requeued += 1;
            }
        }
        Ok(requeued)
    }
}
