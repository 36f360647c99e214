//! Persistence for videos and comments.
//!
//! This crate provides:
//! - The [`EntityStore`] interface with versioned reads and conditional writes
//! - A Firestore REST implementation with service account authentication
//! - An in-memory implementation for tests and local runs
//! - Conflict-retrying patch helpers

pub mod client;
pub mod codec;
pub mod conditional;
pub mod error;
pub mod firestore;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use conditional::{patch_comment, patch_video, PatchOutcome, MAX_CONFLICT_RETRIES};
pub use error::{StoreError, StoreResult};
pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use retry::RetryConfig;
pub use store::{CreateOutcome, EntityStore, UpdateOutcome, Version, Versioned};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
