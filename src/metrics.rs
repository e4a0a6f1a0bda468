use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and question-answering activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_ingested: AtomicU64,
    documents_deleted: AtomicU64,
    questions_answered: AtomicU64,
    provider_retries: AtomicU64,
    provider_overloads: AtomicU64,
    provider_failures: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully stored upload.
    pub fn record_ingest(&self) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a removed document.
    pub fn record_delete(&self) {
        self.documents_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a persisted question/answer turn.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one backoff caused by provider overload.
    pub fn record_retry(&self) {
        self.provider_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call that stayed overloaded through every attempt.
    pub fn record_overload_exhausted(&self) {
        self.provider_overloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a non-retryable provider failure.
    pub fn record_provider_failure(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            documents_deleted: self.documents_deleted.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            provider_retries: self.provider_retries.load(Ordering::Relaxed),
            provider_overloads: self.provider_overloads.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Documents accepted since startup.
    pub documents_ingested: u64,
    /// Documents removed since startup.
    pub documents_deleted: u64,
    /// Question/answer turns persisted since startup.
    pub questions_answered: u64,
    /// Backoff sleeps taken because the provider was overloaded.
    pub provider_retries: u64,
    /// Calls that exhausted every retry while overloaded.
    pub provider_overloads: u64,
    /// Provider failures surfaced without retrying.
    pub provider_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_activity_counters() {
        let metrics = ServiceMetrics::new();
        metrics.record_ingest();
        metrics.record_ingest();
        metrics.record_answer();
        metrics.record_retry();
        metrics.record_retry();
        metrics.record_overload_exhausted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.questions_answered, 1);
        assert_eq!(snapshot.provider_retries, 2);
        assert_eq!(snapshot.provider_overloads, 1);
        assert_eq!(snapshot.provider_failures, 0);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(ServiceMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
