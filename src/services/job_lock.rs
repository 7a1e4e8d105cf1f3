use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::SeriesKey;

pub const TRAINING_JOB: &str = "training";

pub fn extraction_job(key: &SeriesKey) -> String {
    format!("extraction:{}", key)
}

/// At-most-one-running guard per job kind.
#[derive(Clone, Default)]
pub struct JobLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when a run of the same kind is already in progress.
    pub fn try_acquire(&self, kind: impl Into<String>) -> Option<JobGuard> {
        let kind = kind.into();
        let mut held = self.held.lock();
        if !held.insert(kind.clone()) {
            return None;
        }
        Some(JobGuard {
            kind,
            held: self.held.clone(),
        })
    }

    pub fn is_held(&self, kind: &str) -> bool {
        self.held.lock().contains(kind)
    }
}

/// Releases the job kind on drop.
pub struct JobGuard {
    kind: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl JobGuard {
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.kind);
    }
}
