//! Task executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use yj_queue::{Delivery, RetryPolicy, TaskBroker};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::TaskRegistry;
use crate::logging::TaskLogger;
use crate::metrics;

/// How one delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Retried,
    DeadLettered,
}

/// Executor that pulls tasks from a broker and runs their handlers.
pub struct TaskExecutor {
    config: WorkerConfig,
    broker: Arc<dyn TaskBroker>,
    registry: Arc<TaskRegistry>,
    task_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl TaskExecutor {
    /// Create a new task executor.
    pub fn new(config: WorkerConfig, broker: Arc<dyn TaskBroker>, registry: TaskRegistry) -> Self {
        let task_semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            broker,
            registry: Arc::new(registry),
            task_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting task executor '{}' with {} max concurrent tasks",
            self.consumer_name, self.config.max_concurrent_tasks
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        // Release due retries and reclaim tasks abandoned by dead consumers
        let broker = Arc::clone(&self.broker);
        let consumer_name = self.consumer_name.clone();
        let recovery_interval = self.config.recovery_interval;
        let mut shutdown_rx_recovery = self.shutdown.subscribe();

        let recovery_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(recovery_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_recovery.changed() => {
                        if *shutdown_rx_recovery.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match broker.recover(&consumer_name).await {
                            Ok(0) => {}
                            Ok(n) => info!("Recovered {} tasks", n),
                            Err(e) => warn!("Failed to recover tasks: {}", e),
                        }
                    }
                }
            }
        });

        // Main consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_tasks() => {
                    if let Err(e) = result {
                        error!("Error consuming tasks: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        recovery_task.abort();

        info!("Waiting for in-flight tasks to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_tasks())
            .await
            .is_err()
        {
            warn!(
                "In-flight tasks still running after {:?}, they will be redelivered",
                self.config.shutdown_timeout
            );
        }

        info!("Task executor stopped");
        Ok(())
    }

    /// Fetch as many tasks as there are free slots and spawn them.
    async fn consume_tasks(&self) -> WorkerResult<()> {
        let available = self.task_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .broker
            .fetch(&self.consumer_name, available.min(self.config.fetch_batch))
            .await?;

        if deliveries.is_empty() {
            tokio::time::sleep(Duration::from_millis(200)).await;
            return Ok(());
        }

        debug!("Fetched {} tasks from broker", deliveries.len());

        for delivery in deliveries {
            let broker = Arc::clone(&self.broker);
            let registry = Arc::clone(&self.registry);
            let retry = self.config.retry.clone();
            let permit = self
                .task_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_task(&registry, broker.as_ref(), &retry, delivery).await;
            });
        }

        Ok(())
    }

    /// Run one delivery and settle it with the broker.
    pub async fn execute_task(
        registry: &TaskRegistry,
        broker: &dyn TaskBroker,
        retry: &RetryPolicy,
        delivery: Delivery,
    ) -> Settlement {
        let envelope = &delivery.envelope;
        let task = envelope.task.name();
        let logger = TaskLogger::for_envelope(envelope);
        let span = logger.create_span();

        async {
            if envelope.attempt > retry.max_attempts {
                // Redelivered by a broker after its consumer stopped responding
                metrics::record_task(task, "failed", 0.0);
                metrics::record_dead_letter(task);
                let reason = format!(
                    "attempt {} exceeds the limit of {}",
                    envelope.attempt, retry.max_attempts
                );
                logger.log_error(&format!("not running task: {}", reason));
                if let Err(e) = broker.dead_letter(&delivery, &reason).await {
                    logger.log_error(&format!("failed to settle task: {}", e));
                }
                return Settlement::DeadLettered;
            }

            logger.log_start(envelope.task.entity_key());
            let started = Instant::now();
            let result = registry.dispatch(&envelope.task).await;
            let elapsed = started.elapsed().as_secs_f64();

            let (settlement, settled) = match result {
                Ok(outcome) => {
                    metrics::record_task(task, outcome.as_str(), elapsed);
                    logger.log_completion(outcome.as_str());
                    (Settlement::Acked, broker.ack(&delivery).await)
                }
                Err(e) if e.is_retryable() && retry.should_retry(envelope.attempt) => {
                    let delay = retry.delay_for(envelope.attempt);
                    metrics::record_task(task, "retry", elapsed);
                    metrics::record_retry_scheduled(task);
                    logger.log_warning(&format!(
                        "attempt {}/{} failed, retrying in {:?}: {}",
                        envelope.attempt, retry.max_attempts, delay, e
                    ));
                    (
                        Settlement::Retried,
                        broker.retry(&delivery, delay, &e.to_string()).await,
                    )
                }
                Err(e) => {
                    metrics::record_task(task, "failed", elapsed);
                    metrics::record_dead_letter(task);
                    logger.log_error(&format!(
                        "giving up after attempt {}: {}",
                        envelope.attempt, e
                    ));
                    (
                        Settlement::DeadLettered,
                        broker.dead_letter(&delivery, &e.to_string()).await,
                    )
                }
            };

            if let Err(e) = settled {
                // The broker redelivers unsettled tasks after the claim timeout
                logger.log_error(&format!("failed to settle task: {}", e));
            }
            settlement
        }
        .instrument(span)
        .await
    }

    /// Run tasks one at a time until the broker has nothing due.
    ///
    /// Returns how many deliveries were processed.
    pub async fn run_until_idle(&self) -> WorkerResult<usize> {
        let mut processed = 0;
        loop {
            let deliveries = self
                .broker
                .fetch(&self.consumer_name, self.config.fetch_batch.max(1))
                .await?;
            if deliveries.is_empty() {
                return Ok(processed);
            }
            for delivery in deliveries {
                Self::execute_task(&self.registry, self.broker.as_ref(), &self.config.retry, delivery)
                    .await;
                processed += 1;
            }
        }
    }

    /// Wait for all in-flight tasks to complete.
    async fn wait_for_tasks(&self) {
        loop {
            let available = self.task_semaphore.available_permits();
            if available == self.config.max_concurrent_tasks {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Handle that stops the executor from another task.
    pub fn shutdown_handle(&self) -> tokio::sync::watch::Sender<bool> {
        self.shutdown.clone()
    }
}
