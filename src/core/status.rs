//! Synchronized holder of the current run's state, message and log.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::core::models::{SliceRecord, StatusSnapshot};
use crate::core::state::ExperimentState;

/// One timestamped line of the experiment log.
#[derive(Debug, Clone)]
struct LogEntry {
    timestamp: DateTime<Utc>,
    line: String,
}

#[derive(Debug, Default)]
struct StatusInner {
    id: Option<i64>,
    state: ExperimentState,
    message: Option<String>,
    log: Vec<LogEntry>,
    start_time: Option<DateTime<Utc>>,
    stop_time: Option<DateTime<Utc>>,
    slices: Vec<SliceRecord>,
    apps: Vec<String>,
}

/// All run fields live behind one lock so a reader never observes a state
/// without its matching message, or a torn slice list.
#[derive(Debug, Default)]
pub struct StatusStore {
    inner: RwLock<StatusInner>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole context for a freshly loaded experiment.
    /// Clears the log and any leftover terminal state.
    pub async fn load(
        &self,
        id: i64,
        start_time: DateTime<Utc>,
        stop_time: DateTime<Utc>,
        slices: Vec<SliceRecord>,
        apps: Vec<String>,
    ) {
        let mut inner = self.inner.write().await;
        *inner = StatusInner {
            id: Some(id),
            state: ExperimentState::Ready,
            message: None,
            log: Vec::new(),
            start_time: Some(start_time),
            stop_time: Some(stop_time),
            slices,
            apps,
        };
    }

    /// Clear every field back to the idle defaults.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        *inner = StatusInner::default();
    }

    /// Set state and message together.
    pub async fn set_status(&self, state: ExperimentState, message: Option<String>) {
        let mut inner = self.inner.write().await;
        inner.state = state;
        inner.message = message;
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().await;
        StatusSnapshot {
            id: inner.id,
            state: inner.state,
            message: inner.message.clone(),
        }
    }

    /// Append a timestamped line to the experiment log.
    pub async fn append_log(&self, line: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            line: line.into(),
        };
        self.inner.write().await.log.push(entry);
    }

    /// Render the accumulated log as text and clear it.
    pub async fn drain_log(&self) -> String {
        let mut inner = self.inner.write().await;
        let text = inner
            .log
            .iter()
            .map(|entry| {
                format!(
                    "{}: {}\n",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                    entry.line
                )
            })
            .collect();
        inner.log.clear();
        text
    }

    pub async fn slices(&self) -> Vec<SliceRecord> {
        self.inner.read().await.slices.clone()
    }

    /// Store the slices enriched with their measurement session identifiers.
    pub async fn set_slices(&self, slices: Vec<SliceRecord>) {
        self.inner.write().await.slices = slices;
    }

    pub async fn apps(&self) -> Vec<String> {
        self.inner.read().await.apps.clone()
    }

    pub async fn schedule(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let inner = self.inner.read().await;
        inner.start_time.zip(inner.stop_time)
    }
}
