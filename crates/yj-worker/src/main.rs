//! Pipeline worker binary.

use std::sync::Arc;

use tracing::{error, info};

use yj_language::NaturalLanguageClient;
use yj_queue::{QueueConfig, RedisTaskQueue};
use yj_store::{FirestoreClient, FirestoreStore};
use yj_worker::{
    init_tracing, metrics, TaskContext, TaskExecutor, TaskRegistry, WorkerConfig,
    DEFAULT_LOG_DIRECTIVE,
};
use yj_youtube::YouTubeClient;

fn exit_with(message: &str, err: &dyn std::fmt::Display) -> ! {
    error!("{}: {}", message, err);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing(DEFAULT_LOG_DIRECTIVE);

    info!("Starting yj-worker");

    let config = match WorkerConfig::from_env() {
        Ok(c) => c,
        Err(e) => exit_with("Invalid worker configuration", &e),
    };
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!("Serving metrics on port {}", port),
            Err(e) => exit_with("Failed to start metrics exporter", &e),
        }
    }

    let store = match FirestoreClient::from_env().await {
        Ok(client) => Arc::new(FirestoreStore::new(client)),
        Err(e) => exit_with("Failed to create Firestore client", &e),
    };

    let queue_config = QueueConfig {
        max_attempts: config.retry.max_attempts,
        ..QueueConfig::from_env()
    };
    let queue = match RedisTaskQueue::new(queue_config) {
        Ok(q) => Arc::new(q),
        Err(e) => exit_with("Failed to create task queue", &e),
    };
    if let Err(e) = queue.init().await {
        exit_with("Failed to initialize task queue", &e);
    }

    let media = match YouTubeClient::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => exit_with("Failed to create YouTube client", &e),
    };

    let sentiment = match NaturalLanguageClient::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => exit_with("Failed to create Natural Language client", &e),
    };

    let ctx = TaskContext::new(store, queue.clone(), media, sentiment)
        .with_comment_query(config.comment_query);
    let registry = TaskRegistry::standard(Arc::new(ctx));

    let executor = Arc::new(TaskExecutor::new(config, queue, registry));

    // Stop on Ctrl-C
    let shutdown = executor.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown.send(true);
    });

    if let Err(e) = executor.run().await {
        exit_with("Executor error", &e);
    }

    info!("Worker shutdown complete");
}
