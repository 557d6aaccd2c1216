//! Durable timeline and metric history.
//!
//! Writers only ever append through [`HistorySink`]; calls must return
//! without waiting on storage.

pub mod db;
mod memory;
pub mod recorder;

use std::sync::Arc;

pub use db::PgHistory;
pub use memory::MemoryHistory;

use crate::types::{MetricSnapshot, TimelineEvent};

/// Fire-and-forget history writer.
pub trait HistorySink: Send + Sync {
    fn record_event(&self, event: TimelineEvent);
    fn record_snapshot(&self, snapshot: MetricSnapshot);
}

/// Error type for history storage.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}

/// Writes every record to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutHistory {
    sinks: Vec<Arc<dyn HistorySink>>,
}

impl FanoutHistory {
    pub fn new(sinks: Vec<Arc<dyn HistorySink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn HistorySink>) {
        self.sinks.push(sink);
    }
}

impl HistorySink for FanoutHistory {
    fn record_event(&self, event: TimelineEvent) {
        for sink in &self.sinks {
            sink.record_event(event.clone());
        }
    }

    fn record_snapshot(&self, snapshot: MetricSnapshot) {
        for sink in &self.sinks {
            sink.record_snapshot(snapshot.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Severity, TimelineRange};

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(MemoryHistory::new());
        let b = Arc::new(MemoryHistory::new());
        let fanout = FanoutHistory::new(vec![a.clone(), b.clone()]);
        fanout.record_event(TimelineEvent::new(Severity::Info, Category::System, "Started", "hello"));
        assert_eq!(a.events_in(TimelineRange::Last24h).len(), 1);
        assert_eq!(b.events_in(TimelineRange::Last24h).len(), 1);
    }
}
