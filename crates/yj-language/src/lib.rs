//! Client for the Cloud Natural Language sentiment API.

pub mod client;
pub mod error;
pub mod types;

pub use client::{LanguageConfig, NaturalLanguageClient, SentimentClient};
pub use error::{SentimentError, SentimentResult};

#[cfg(any(test, feature = "mock"))]
pub use client::MockSentimentClient;
