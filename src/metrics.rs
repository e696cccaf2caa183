use lazy_static::lazy_static;
use prometheus::{Counter, Histogram, register_counter, register_histogram};

lazy_static! {
    pub static ref ADMITTED_TOTAL: Counter =
        register_counter!("admission_allowed_total", "Requests admitted").unwrap();
    pub static ref BLOCKED_TOTAL: Counter =
        register_counter!("admission_blocked_total", "Requests rejected by a full window").unwrap();
    pub static ref SUSPICIOUS_TOTAL: Counter =
        register_counter!("admission_suspicious_total", "Admitted requests flagged as suspicious").unwrap();
    pub static ref STORE_CONFLICTS: Counter =
        register_counter!("admission_store_conflicts_total", "Optimistic commits that hit a write conflict").unwrap();
    pub static ref ADMISSION_FAILURES: Counter =
        register_counter!("admission_failures_total", "Admission checks that failed closed").unwrap();
    pub static ref ADMISSION_LATENCY: Histogram = register_histogram!(
        "admission_latency_seconds",
        "Time spent deciding one admission"
    )
    .unwrap();
}
