//! Communication with the remote graph service. The service keeps one floating point value per
//! day for every `(username, graph)` pair and is the record of truth for tracked time.

pub mod client;
pub mod parse;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

pub use client::HttpGraphClient;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request to graph service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("graph service responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Representation the service renders a graph in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Json,
    Yaml,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Json => "json",
            DataType::Yaml => "yaml",
        }
    }
}

/// The two remote operations the tracker depends on. Implementations must not retry, retry
/// policy belongs to callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphApi: Send + Sync + 'static {
    /// Value stored for `date`, `0.0` when the graph has no entry for it.
    async fn fetch_value(
        &self,
        graph_name: &str,
        username: &str,
        date: NaiveDate,
    ) -> Result<f64, SyncError>;

    /// Overwrites the value for `date` on the caller's own graph.
    async fn post_value(
        &self,
        graph_name: &str,
        date: NaiveDate,
        value_seconds: f64,
    ) -> Result<(), SyncError>;
}
