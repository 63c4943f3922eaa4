//! StateStore: pluggable persistence for the registry snapshot.
//!
//! The whole registry is serialized and overwritten after every mutation and
//! read back once at startup. There is no append log: the last successful
//! save wins.
//!
//! Backends:
//!   - [`file::FileStateStore`]: JSON file, replaced atomically via rename.
//!   - [`memory::MemoryStateStore`]: in-process, for tests and dry runs.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::application::Application;
use crate::models::request::TrackedRequest;

/// Bumped when the snapshot layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub version: u32,
    #[serde(default)]
    pub apps: BTreeMap<String, Application>,
    #[serde(default)]
    pub requests: BTreeMap<String, TrackedRequest>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            apps: BTreeMap::new(),
            requests: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("failed to serialize state snapshot")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_slice(bytes).context("failed to parse state snapshot")?;
        if snapshot.version != SNAPSHOT_VERSION {
            anyhow::bail!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        Ok(snapshot)
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<Snapshot>>;

    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}
