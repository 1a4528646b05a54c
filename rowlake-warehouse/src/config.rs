//! Warehouse configuration.

use serde::Deserialize;

use crate::insert::DEFAULT_CHUNK_SIZE;
use crate::poll::PollPolicy;

/// Configuration for a warehouse connection.
///
/// Mirrors the JSON config file the transport is created from: the cloud
/// project and the default dataset every unqualified table reference
/// resolves against.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Cloud project identifier.
    pub project_id: String,
    /// Dataset used when a call does not name one.
    pub default_dataset: String,
    /// Completion polling policy for query jobs.
    #[serde(default)]
    pub poll: PollPolicy,
    /// Rows per insert chunk for bulk loads.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl WarehouseConfig {
    /// Create a configuration with default polling and chunking.
    pub fn new(project_id: impl Into<String>, default_dataset: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            default_dataset: default_dataset.into(),
            poll: PollPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the poll policy.
    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Set the bulk-load chunk size.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Resolve a dataset override against the default.
    pub fn dataset<'a>(&'a self, dataset: Option<&'a str>) -> &'a str {
        dataset.unwrap_or(&self.default_dataset)
    }
}
