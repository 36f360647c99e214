//! Task broker on Redis Streams.
//!
//! Each named queue is one stream read through a shared consumer group.
//! Retries wait in a sorted set scored by due time until `recover` moves
//! them back onto their stream. Exhausted or malformed tasks go to a
//! per-queue dead-letter stream.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::queue::{Delivery, TaskBroker, TaskQueue};
use crate::task::{QueueName, Task, TaskEnvelope, TaskId};

const PAYLOAD_FIELD: &str = "task";
const PROMOTE_BATCH: isize = 100;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix of every key the broker touches
    pub key_prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// How long a fetch blocks waiting for work
    pub block_timeout: Duration,
    /// Pending entries idle longer than this are reclaimed
    pub claim_min_idle: Duration,
    /// Max entries reclaimed per recovery pass
    pub claim_batch: usize,
    /// Reclaimed entries already on this attempt are dead-lettered
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "yj".to_string(),
            consumer_group: "yj:workers".to_string(),
            block_timeout: Duration::from_secs(1),
            claim_min_idle: Duration::from_secs(600), // 10 minutes
            claim_batch: 50,
            max_attempts: 5,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            block_timeout: std::env::var("QUEUE_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.block_timeout),
            claim_min_idle: std::env::var("QUEUE_CLAIM_MIN_IDLE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            claim_batch: std::env::var("QUEUE_CLAIM_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.claim_batch),
            max_attempts: std::env::var("TASK_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
        }
    }

    pub fn stream_key(&self, queue: QueueName) -> String {
        format!("{}:queue:{}", self.key_prefix, queue)
    }

    pub fn dlq_key(&self, queue: QueueName) -> String {
        format!("{}:dlq:{}", self.key_prefix, queue)
    }

    pub fn delayed_key(&self) -> String {
        format!("{}:delayed", self.key_prefix)
    }

    fn queue_for_stream(&self, stream: &str) -> Option<QueueName> {
        QueueName::ALL
            .into_iter()
            .find(|q| self.stream_key(*q) == stream)
    }
}

/// Whether a task abandoned on its current attempt has no attempts left.
fn exhausted_on_reclaim(envelope: &TaskEnvelope, max_attempts: u32) -> bool {
    envelope.attempt >= max_attempts
}

/// Redis Streams broker.
pub struct RedisTaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisTaskQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Create the consumer group on every queue stream if missing.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        for queue in QueueName::ALL {
            let stream = self.config.stream_key(queue);
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!(stream = %stream, "Created consumer group {}", self.config.consumer_group),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(stream = %stream, "Consumer group already exists");
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    async fn publish(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        envelope: &TaskEnvelope,
    ) -> QueueResult<String> {
        let payload = serde_json::to_string(envelope)?;
        let message_id: String = redis::cmd("XADD")
            .arg(self.config.stream_key(envelope.queue))
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&payload)
            .query_async(conn)
            .await?;
        Ok(message_id)
    }

    async fn settle(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: QueueName,
        message_id: &str,
    ) -> QueueResult<()> {
        let stream = self.config.stream_key(queue);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;

        Ok(())
    }

    /// Raw payload of a stream entry that could not be decoded goes
    /// straight to the dead-letter stream.
    async fn dead_letter_raw(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: QueueName,
        message_id: &str,
        payload: &str,
        error: &str,
    ) -> QueueResult<()> {
        redis::cmd("XADD")
            .arg(self.config.dlq_key(queue))
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;
        self.settle(conn, queue, message_id).await
    }

    async fn decode_entry(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: QueueName,
        entry: &redis::streams::StreamId,
    ) -> QueueResult<Option<TaskEnvelope>> {
        let payload = match entry.map.get(PAYLOAD_FIELD) {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            _ => {
                warn!(queue = %queue, message_id = %entry.id, "Stream entry has no task payload");
                self.dead_letter_raw(conn, queue, &entry.id, "", "missing payload")
                    .await?;
                return Ok(None);
            }
        };

        match serde_json::from_str::<TaskEnvelope>(&payload) {
            Ok(mut envelope) => {
                envelope.queue = queue;
                Ok(Some(envelope))
            }
            Err(e) => {
                // Unknown task names land here too
                warn!(queue = %queue, message_id = %entry.id, "Failed to parse task payload: {}", e);
                self.dead_letter_raw(conn, queue, &entry.id, &payload, &e.to_string())
                    .await?;
                Ok(None)
            }
        }
    }

    /// Move retries whose due time has passed back onto their streams.
    ///
    /// A member is published before it leaves the delayed set, so a failure
    /// in between leaves it to the next pass. A consumer that loses the race
    /// to remove it deletes its own copy from the stream.
    async fn promote_due(&self, conn: &mut redis::aio::MultiplexedConnection) -> QueueResult<usize> {
        let delayed = self.config.delayed_key();
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(&delayed, "-inf", now_ms, 0, PROMOTE_BATCH)
            .await?;

        let mut promoted = 0;
        for member in due {
            let envelope = match serde_json::from_str::<TaskEnvelope>(&member) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Dropping unparseable delayed task: {}", e);
                    conn.zrem::<_, _, ()>(&delayed, &member).await?;
                    continue;
                }
            };

            let message_id = self.publish(conn, &envelope).await?;
            let removed: i64 = conn.zrem(&delayed, &member).await?;
            if removed == 0 {
                debug!(task_id = %envelope.id, "Delayed task promoted by another consumer");
                redis::cmd("XDEL")
                    .arg(self.config.stream_key(envelope.queue))
                    .arg(&message_id)
                    .query_async::<()>(conn)
                    .await?;
                continue;
            }
            promoted += 1;
        }
        Ok(promoted)
    }

    /// Reclaim entries left pending by consumers that stopped responding and
    /// publish them again as their next attempt. Entries already on their
    /// last attempt are dead-lettered instead.
    async fn reclaim_stale(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        consumer: &str,
    ) -> QueueResult<usize> {
        let min_idle = self.config.claim_min_idle.as_millis() as u64;
        let mut reclaimed = 0;

        for queue in QueueName::ALL {
            let stream = self.config.stream_key(queue);
            let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg("IDLE")
                .arg(min_idle)
                .arg("-")
                .arg("+")
                .arg(self.config.claim_batch)
                .query_async(conn)
                .await?;

            if pending.ids.is_empty() {
                continue;
            }

            let mut claim = redis::cmd("XCLAIM");
            claim
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg(consumer)
                .arg(min_idle);
            for p in &pending.ids {
                claim.arg(&p.id);
            }
            let claimed: redis::streams::StreamClaimReply = claim.query_async(conn).await?;

            for entry in &claimed.ids {
                let Some(envelope) = self.decode_entry(conn, queue, entry).await? else {
                    continue;
                };
                if exhausted_on_reclaim(&envelope, self.config.max_attempts) {
                    warn!(
                        task_id = %envelope.id,
                        queue = %queue,
                        attempt = envelope.attempt,
                        "Stale task is out of attempts"
                    );
                    let payload = serde_json::to_string(&envelope)?;
                    let error = format!("abandoned on attempt {}", envelope.attempt);
                    self.dead_letter_raw(conn, queue, &entry.id, &payload, &error)
                        .await?;
                    continue;
                }
                info!(task_id = %envelope.id, queue = %queue, "Reclaimed stale task");
                self.publish(conn, &envelope.next_attempt()).await?;
                self.settle(conn, queue, &entry.id).await?;
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }

    /// Entries currently in a queue's stream.
    pub async fn len(&self, queue: QueueName) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(self.config.stream_key(queue)).await?;
        Ok(len)
    }

    /// Entries in a queue's dead-letter stream.
    pub async fn dlq_len(&self, queue: QueueName) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(self.config.dlq_key(queue)).await?;
        Ok(len)
    }

    /// Retries waiting for their due time.
    pub async fn delayed_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.zcard(self.config.delayed_key()).await?;
        Ok(len)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, queue: QueueName, task: Task) -> QueueResult<TaskId> {
        let mut conn = self.conn().await?;
        let envelope = TaskEnvelope::new(queue, task);
        let message_id = self
            .publish(&mut conn, &envelope)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!(
            task_id = %envelope.id,
            task = %envelope.task.name(),
            queue = %queue,
            "Enqueued task with message ID {}",
            message_id
        );
        Ok(envelope.id)
    }
}

#[async_trait]
impl TaskBroker for RedisTaskQueue {
    async fn fetch(&self, consumer: &str, max: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(max)
            .arg("BLOCK")
            .arg(self.config.block_timeout.as_millis() as u64)
            .arg("STREAMS");
        for queue in QueueName::ALL {
            cmd.arg(self.config.stream_key(queue));
        }
        for _ in QueueName::ALL {
            cmd.arg(">"); // Only new messages
        }

        let reply: Option<redis::streams::StreamReadReply> = cmd.query_async(&mut conn).await?;
        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut deliveries = Vec::new();
        for stream in reply.keys {
            let Some(queue) = self.config.queue_for_stream(&stream.key) else {
                warn!(stream = %stream.key, "Read from an unexpected stream");
                continue;
            };
            for entry in &stream.ids {
                if let Some(envelope) = self.decode_entry(&mut conn, queue, entry).await? {
                    debug!(task_id = %envelope.id, queue = %queue, "Consumed task from stream");
                    deliveries.push(Delivery {
                        receipt: entry.id.clone(),
                        envelope,
                    });
                }
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        self.settle(&mut conn, delivery.envelope.queue, &delivery.receipt)
            .await?;
        debug!(task_id = %delivery.envelope.id, "Acknowledged task");
        Ok(())
    }

    async fn retry(&self, delivery: &Delivery, delay: Duration, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let next = delivery.envelope.next_attempt();
        let due_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let payload = serde_json::to_string(&next)?;

        // Schedule before settling so a crash in between duplicates rather than loses
        conn.zadd::<_, _, _, ()>(self.config.delayed_key(), &payload, due_ms)
            .await?;
        self.settle(&mut conn, delivery.envelope.queue, &delivery.receipt)
            .await?;

        debug!(
            task_id = %next.id,
            attempt = next.attempt,
            delay_ms = delay.as_millis() as u64,
            error,
            "Scheduled task retry"
        );
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&delivery.envelope)?;
        self.dead_letter_raw(
            &mut conn,
            delivery.envelope.queue,
            &delivery.receipt,
            &payload,
            error,
        )
        .await?;

        warn!(task_id = %delivery.envelope.id, queue = %delivery.envelope.queue, "Moved task to DLQ: {}", error);
        Ok(())
    }

    async fn recover(&self, consumer: &str) -> QueueResult<usize> {
        let mut conn = self.conn().await?;
        let promoted = self.promote_due(&mut conn).await?;
        let reclaimed = self.reclaim_stale(&mut conn, consumer).await?;
        if promoted + reclaimed > 0 {
            debug!(promoted, reclaimed, "Recovered tasks");
        }
        Ok(promoted + reclaimed)
    }
}
