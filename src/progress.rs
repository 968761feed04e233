//! Process-wide job status, shared by every running job and the control
//! surface.

use crate::models::JobProgress;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Holds the current [`JobProgress`] and broadcasts every change
#[derive(Clone)]
pub struct StatusBoard {
    state: Arc<Mutex<JobProgress>>,
    tx: broadcast::Sender<JobProgress>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(JobProgress::default())),
            tx,
        }
    }

    /// Replace the status. `in_progress` is derived from the text.
    pub fn update(&self, status: impl Into<String>, current: usize, total: usize) {
        let status = status.into();
        let progress = JobProgress {
            in_progress: !JobProgress::is_terminal_status(&status),
            status,
            current,
            total,
        };
        log::debug!(
            "Status: {} ({}/{})",
            progress.status,
            progress.current,
            progress.total
        );

        match self.state.lock() {
            Ok(mut state) => *state = progress.clone(),
            Err(poisoned) => *poisoned.into_inner() = progress.clone(),
        }

        // nobody listening is fine
        if self.tx.send(progress).is_err() {
            log::debug!("No status listeners");
        }
    }

    /// Record a terminal error for the running job
    pub fn error(&self, message: impl std::fmt::Display) {
        self.update(format!("Error: {}", message), 0, 1);
    }

    pub fn snapshot(&self) -> JobProgress {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgress> {
        self.tx.subscribe()
    }
}
