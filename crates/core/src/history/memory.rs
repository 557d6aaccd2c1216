use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::HistorySink;
use crate::types::{MetricSnapshot, TimelineEvent, TimelineRange};

/// Max events kept in memory.
pub const MAX_EVENTS: usize = 5000;
/// Max metric snapshots kept in memory.
pub const MAX_SNAPSHOTS: usize = 20_000;

#[derive(Debug, Default)]
struct Inner {
    /// Newest first.
    events: VecDeque<TimelineEvent>,
    /// Newest first.
    snapshots: VecDeque<MetricSnapshot>,
}

/// In-process history with a retention window and hard caps.
/// Used alone in ephemeral mode and as the query side next to the database.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: Mutex<Inner>,
    retention: chrono::Duration,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::with_retention(chrono::Duration::days(7))
    }

    pub fn with_retention(retention: chrono::Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Events inside `range`, newest first.
    pub fn events_in(&self, range: TimelineRange) -> Vec<TimelineEvent> {
        let cutoff = Utc::now() - range.duration();
        self.lock()
            .events
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Snapshots inside `range`, newest first.
    pub fn snapshots_in(&self, range: TimelineRange) -> Vec<MetricSnapshot> {
        let cutoff = Utc::now() - range.duration();
        self.lock()
            .snapshots
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    fn prune(inner: &mut Inner, cutoff: DateTime<Utc>) {
        inner.events.retain(|e| e.timestamp >= cutoff);
        inner.snapshots.retain(|s| s.timestamp >= cutoff);
        inner.events.truncate(MAX_EVENTS);
        inner.snapshots.truncate(MAX_SNAPSHOTS);
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl HistorySink for MemoryHistory {
    fn record_event(&self, event: TimelineEvent) {
        let cutoff = Utc::now() - self.retention;
        let mut inner = self.lock();
        inner.events.push_front(event);
        Self::prune(&mut inner, cutoff);
    }

    fn record_snapshot(&self, snapshot: MetricSnapshot) {
        let cutoff = Utc::now() - self.retention;
        let mut inner = self.lock();
        inner.snapshots.push_front(snapshot);
        Self::prune(&mut inner, cutoff);
    }
}
