pub mod admission;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod state;
pub mod store;
pub mod trust;

pub use admission::AdmissionController;
pub use config::{Args, LimiterConfig, TrustPolicy};
pub use error::{AdmissionError, ConfigError, StoreError};
pub use models::{AdmissionResult, IdentityTrustRecord, RateLimitRecord, RequestIdentity};
pub use retry::RetryPolicy;
pub use store::{MemoryStore, TransactionalStore};
pub use trust::TrustEvaluator;
