//! Configuration schema and loader.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::ConsistencyLevel;

/// Process-level settings for pools, views and the HTTP adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Namespace → `host:port` addresses.
    #[serde(default)]
    pub pools: BTreeMap<String, Vec<String>>,

    /// Consistency level used when an operation is not given one.
    #[serde(default)]
    pub consistency: ConsistencyLevel,

    /// Page size for regular views.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Page size for batch-loading views.
    #[serde(default = "default_batch_chunk_size")]
    pub batch_chunk_size: usize,

    /// Addresses the HTTP adapter registers for namespaces it has not seen.
    #[serde(default = "default_http_servers")]
    pub http_servers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pools: BTreeMap::new(),
            consistency: ConsistencyLevel::default(),
            chunk_size: default_chunk_size(),
            batch_chunk_size: default_batch_chunk_size(),
            http_servers: default_http_servers(),
        }
    }
}

impl Config {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.chunk_size == 0 || self.batch_chunk_size == 0 {
            return Err(StoreError::Config("chunk sizes must be positive".into()));
        }
        Ok(())
    }
}

pub(crate) fn default_chunk_size() -> usize {
    100
}

pub(crate) fn default_batch_chunk_size() -> usize {
    5000
}

fn default_http_servers() -> Vec<String> {
    vec!["127.0.0.1:9160".to_string()]
}
