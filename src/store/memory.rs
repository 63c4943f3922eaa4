use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Snapshot, StateStore};

/// Keeps the last saved snapshot in memory.
#[derive(Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<Option<Snapshot>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot, as if it had been saved by a prior run.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    pub async fn current(&self) -> Option<Snapshot> {
        self.snapshot.lock().await.clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
