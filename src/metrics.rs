use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    chunks_ingested: AtomicU64,
    ingest_failures: AtomicU64,
    queries_started: AtomicU64,
    queries_completed: AtomicU64,
    queries_failed: AtomicU64,
    queries_cancelled: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks written for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_ingested
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an ingestion that ended in an error.
    pub fn record_ingest_failure(&self) {
        self.ingest_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query whose answer stream has been opened.
    pub fn record_query_started(&self) {
        self.queries_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query stream that ended with its citations message.
    pub fn record_query_completed(&self) {
        self.queries_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query stream that ended with an error message.
    pub fn record_query_failed(&self) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query stream dropped by its consumer before a terminal message.
    pub fn record_query_cancelled(&self) {
        self.queries_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
            ingest_failures: self.ingest_failures.load(Ordering::Relaxed),
            queries_started: self.queries_started.load(Ordering::Relaxed),
            queries_completed: self.queries_completed.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            queries_cancelled: self.queries_cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents ingested since startup.
    pub documents_ingested: u64,
    /// Total chunk count written across all ingested documents.
    pub chunks_ingested: u64,
    /// Ingestion requests that failed.
    pub ingest_failures: u64,
    /// Queries whose answer stream was opened.
    pub queries_started: u64,
    /// Queries that finished with citations.
    pub queries_completed: u64,
    /// Queries that finished with an error message.
    pub queries_failed: u64,
    /// Queries abandoned by the client mid-answer.
    pub queries_cancelled: u64,
}

/// Tracks one answer stream from start to its terminal message.
///
/// Dropping the tracker before [`QueryOutcome::completed`] or [`QueryOutcome::failed`] counts the
/// query as cancelled, so every started query lands in exactly one outcome counter.
pub struct QueryOutcome {
    metrics: Arc<PipelineMetrics>,
    settled: bool,
}

impl QueryOutcome {
    /// Record a started query and track its outcome.
    pub fn begin(metrics: Arc<PipelineMetrics>) -> Self {
        metrics.record_query_started();
        Self {
            metrics,
            settled: false,
        }
    }

    /// Record that the stream delivered its citations.
    pub fn completed(&mut self) {
        if !std::mem::replace(&mut self.settled, true) {
            self.metrics.record_query_completed();
        }
    }

    /// Record that the stream ended with an error message.
    pub fn failed(&mut self) {
        if !std::mem::replace(&mut self.settled, true) {
            self.metrics.record_query_failed();
        }
    }
}

impl Drop for QueryOutcome {
    fn drop(&mut self) {
        if !self.settled {
            tracing::info!("Answer stream dropped before completion");
            self.metrics.record_query_cancelled();
        }
    }
}
