//! Engine metrics.
//!
//! Counters and histograms for ingestion, curation, search, and the
//! metamodel cache. These complement the structured logging; dashboards
//! alert on the counters, logs explain the spikes.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Ingestion runs counter.
pub const INGEST_RUNS: &str = "metahub_ingest_runs_total";

/// Ingested documents counter.
pub const INGEST_DOCUMENTS: &str = "metahub_ingest_documents_total";

/// Ingestion failures counter.
pub const INGEST_ERRORS: &str = "metahub_ingest_errors_total";

/// Curation runs counter.
pub const CURATION_RUNS: &str = "metahub_curation_runs_total";

/// Per-document curation failures counter.
pub const CURATION_DOCUMENT_ERRORS: &str = "metahub_curation_document_errors_total";

/// Curation run duration histogram.
pub const CURATION_RUN_DURATION: &str = "metahub_curation_run_duration_seconds";

/// Search queries counter.
pub const SEARCH_QUERIES: &str = "metahub_search_queries_total";

/// Search query duration histogram.
pub const SEARCH_DURATION: &str = "metahub_search_duration_seconds";

/// Metamodel cache invalidation counter.
pub const CACHE_INVALIDATIONS: &str = "metahub_cache_invalidations_total";

/// Version activation counter.
pub const VERSION_ACTIVATIONS: &str = "metahub_version_activations_total";

/// Registers all metric descriptions.
///
/// Call this once at application startup after initializing the metrics
/// recorder.
pub fn register_metrics() {
    describe_counter!(INGEST_RUNS, "Total ingestion runs started");
    describe_counter!(INGEST_DOCUMENTS, "Total documents ingested");
    describe_counter!(INGEST_ERRORS, "Total failed ingestion runs");
    describe_counter!(CURATION_RUNS, "Total curation runs started");
    describe_counter!(
        CURATION_DOCUMENT_ERRORS,
        "Total documents whose curation failed"
    );
    describe_histogram!(CURATION_RUN_DURATION, "Duration of curation runs in seconds");
    describe_counter!(SEARCH_QUERIES, "Total search queries executed");
    describe_histogram!(SEARCH_DURATION, "Duration of search queries in seconds");
    describe_counter!(CACHE_INVALIDATIONS, "Total metamodel cache invalidations");
    describe_counter!(VERSION_ACTIVATIONS, "Total version activations");
}

/// Records completion of a curation run.
pub fn record_curation_run(duration_secs: f64, failed_documents: u64) {
    counter!(CURATION_RUNS).increment(1);
    counter!(CURATION_DOCUMENT_ERRORS).increment(failed_documents);
    histogram!(CURATION_RUN_DURATION).record(duration_secs);
}

/// Records completion of a search query.
pub fn record_search(duration_secs: f64) {
    counter!(SEARCH_QUERIES).increment(1);
    histogram!(SEARCH_DURATION).record(duration_secs);
}
