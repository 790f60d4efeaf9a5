//! Checkpoint persistence for suspend/resume across the review boundary.
//!
//! Session state is keyed by thread id. A persistent backend lets a
//! suspended review survive process restarts; the in-memory backend is for
//! tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::graph::SessionState;
use crate::Result;

/// Persisted graph execution state, addressed by thread id.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, thread_id: &str, state: &SessionState) -> Result<()>;

    async fn load(&self, thread_id: &str) -> Result<Option<SessionState>>;

    async fn remove(&self, thread_id: &str) -> Result<()>;
}

struct Entry {
    state: SessionState,
    saved_at: DateTime<Utc>,
}

/// In-memory checkpoint store.
#[derive(Default)]
pub struct MemoryCheckpointer {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every session last saved before the cutoff.
    ///
    /// Abandoned reviews otherwise stay dormant forever; callers decide the
    /// retention window and when to sweep.
    pub fn expire_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.saved_at >= cutoff);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, thread_id: &str, state: &SessionState) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            thread_id.to_string(),
            Entry {
                state: state.clone(),
                saved_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<SessionState>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(thread_id).map(|entry| entry.state.clone()))
    }

    async fn remove(&self, thread_id: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(thread_id);
        Ok(())
    }
}
