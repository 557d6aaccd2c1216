use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{HistoryError, HistorySink};
use crate::types::{Category, MetricSnapshot, Severity, TimelineEvent};

const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

enum HistoryWrite {
    Event(TimelineEvent),
    Snapshot(MetricSnapshot),
}

/// Postgres-backed sink. Records are queued and written by a background
/// task so callers never wait on the database.
#[derive(Clone)]
pub struct PgHistory {
    tx: mpsc::UnboundedSender<HistoryWrite>,
}

impl PgHistory {
    /// Spawn the writer. It drains the queue until `cancel` fires, flushes
    /// what is left, and prunes rows older than `retention_days` once an hour.
    pub fn spawn(
        pool: PgPool,
        retention_days: i64,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer_loop(pool, rx, retention_days, cancel));
        (Self { tx }, handle)
    }

    fn enqueue(&self, write: HistoryWrite) {
        if self.tx.send(write).is_err() {
            tracing::warn!("history writer stopped, record dropped");
        }
    }
}

impl HistorySink for PgHistory {
    fn record_event(&self, event: TimelineEvent) {
        self.enqueue(HistoryWrite::Event(event));
    }

    fn record_snapshot(&self, snapshot: MetricSnapshot) {
        self.enqueue(HistoryWrite::Snapshot(snapshot));
    }
}

async fn writer_loop(
    pool: PgPool,
    mut rx: mpsc::UnboundedReceiver<HistoryWrite>,
    retention_days: i64,
    cancel: CancellationToken,
) {
    let mut prune_tick = tokio::time::interval(PRUNE_INTERVAL);
    prune_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            write = rx.recv() => {
                let Some(write) = write else { break };
                write_one(&pool, write).await;
            }
            _ = prune_tick.tick() => {
                let cutoff = Utc::now() - chrono::Duration::days(retention_days);
                match prune(&pool, cutoff).await {
                    Ok(removed) if removed > 0 => tracing::info!(removed, "pruned history"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "history prune failed"),
                }
            }
        }
    }

    // flush whatever was queued before shutdown
    while let Ok(write) = rx.try_recv() {
        write_one(&pool, write).await;
    }
    tracing::debug!("history writer stopped");
}

async fn write_one(pool: &PgPool, write: HistoryWrite) {
    let result = match &write {
        HistoryWrite::Event(e) => insert_event(pool, e).await,
        HistoryWrite::Snapshot(s) => insert_snapshot(pool, s).await,
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "history write failed");
    }
}

/// Write a timeline event.
pub async fn insert_event(pool: &PgPool, event: &TimelineEvent) -> Result<(), HistoryError> {
    sqlx::query(
        "INSERT INTO timeline_event (id, occurred_at, severity, category, title, message)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(event.id)
    .bind(event.timestamp)
    .bind(event.severity.as_db_str())
    .bind(event.category.as_db_str())
    .bind(&event.title)
    .bind(&event.message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Write a metric snapshot. The full record is kept as a JSON payload.
pub async fn insert_snapshot(pool: &PgPool, snapshot: &MetricSnapshot) -> Result<(), HistoryError> {
    let payload =
        serde_json::to_value(snapshot).map_err(|e| HistoryError::InvalidRow(e.to_string()))?;
    sqlx::query("INSERT INTO metric_snapshot (id, taken_at, payload) VALUES ($1, $2, $3)")
        .bind(snapshot.id)
        .bind(snapshot.timestamp)
        .bind(payload)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete events and snapshots older than `cutoff`. Returns rows removed.
pub async fn prune(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, HistoryError> {
    let events = sqlx::query("DELETE FROM timeline_event WHERE occurred_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    let snapshots = sqlx::query("DELETE FROM metric_snapshot WHERE taken_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(events.rows_affected() + snapshots.rows_affected())
}

/// Timeline events since `since`, newest first.
pub async fn fetch_events_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<TimelineEvent>, HistoryError> {
    let rows: Vec<(Uuid, DateTime<Utc>, String, String, String, String)> = sqlx::query_as(
        "SELECT id, occurred_at, severity, category, title, message FROM timeline_event
         WHERE occurred_at >= $1 ORDER BY occurred_at DESC",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, timestamp, severity, category, title, message)| {
            Ok(TimelineEvent {
                id,
                timestamp,
                severity: Severity::from_db(&severity)
                    .ok_or_else(|| HistoryError::InvalidRow(format!("severity {severity}")))?,
                category: Category::from_db(&category)
                    .ok_or_else(|| HistoryError::InvalidRow(format!("category {category}")))?,
                title,
                message,
            })
        })
        .collect()
}

/// Metric snapshots since `since`, newest first.
pub async fn fetch_snapshots_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<MetricSnapshot>, HistoryError> {
    let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
        "SELECT payload FROM metric_snapshot WHERE taken_at >= $1 ORDER BY taken_at DESC",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(payload,)| {
            serde_json::from_value(payload).map_err(|e| HistoryError::InvalidRow(e.to_string()))
        })
        .collect()
}
