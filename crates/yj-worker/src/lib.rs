//! Background pipeline for imported videos.
//!
//! This crate provides:
//! - Handlers for comment and transcript import and sentiment analysis
//! - A registry that looks handlers up by task name
//! - The creation trigger and the ingestion flow that fires it
//! - The executor that pulls tasks from a broker, with retries and dead-lettering
//! - Logging and metrics setup for the binaries

pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod trigger;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{Settlement, TaskExecutor};
pub use handlers::{SkipReason, TaskContext, TaskHandler, TaskOutcome, TaskRegistry};
pub use ingest::VideoIngestor;
pub use logging::{init_tracing, TaskLogger};
pub use trigger::{EventTrigger, TriggerReport};

/// Default log directive for the pipeline binaries.
pub const DEFAULT_LOG_DIRECTIVE: &str = "yj=info";
