// One admission is one optimistic transaction. A lost commit is retried from a fresh read.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::LimiterConfig;
use crate::error::{AdmissionError, StoreResult};
use crate::metrics::{ADMISSION_FAILURES, ADMISSION_LATENCY, ADMITTED_TOTAL, BLOCKED_TOTAL, SUSPICIOUS_TOTAL};
use crate::models::{AdmissionResult, RateLimitRecord, RequestIdentity};
use crate::rate_limit::{prune, retry_after_secs, snapshot};
use crate::retry::{RetryPolicy, with_retry};
use crate::store::{TransactionalStore, Versioned, WriteSet};
use crate::trust::TrustEvaluator;

pub struct AdmissionController {
    store: Arc<dyn TransactionalStore>,
    config: RwLock<LimiterConfig>,
    trust: TrustEvaluator,
    retry: RetryPolicy,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn TransactionalStore>, config: LimiterConfig) -> Self {
        Self {
            store,
            config: RwLock::new(config),
            trust: TrustEvaluator::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_trust(mut self, trust: TrustEvaluator) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> LimiterConfig {
        *self.config.read()
    }

    /// Swap in a new configuration. Admissions already running keep the one they started with.
    pub fn reload_config(&self, config: LimiterConfig) {
        let previous = std::mem::replace(&mut *self.config.write(), config);
        info!(
            max = config.max(),
            window_ms = config.window().as_millis() as u64,
            enabled = config.enabled(),
            previous_max = previous.max(),
            "rate limit configuration reloaded"
        );
    }

    /// Count a request against `key`, or reject it if the window is full.
    /// Errors are fail-closed.
    pub async fn admit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        identity: Option<&RequestIdentity>,
    ) -> Result<AdmissionResult, AdmissionError> {
        let config = self.config();
        if !config.enabled() {
            return Ok(AdmissionResult::Allowed {
                suspicious: false,
                remaining: config.max(),
            });
        }

        let started = Instant::now();
        let outcome = with_retry(&self.retry, move || self.try_admit(config, key, now, identity)).await;
        ADMISSION_LATENCY.observe(started.elapsed().as_secs_f64());

        match &outcome {
            Ok(AdmissionResult::Allowed { suspicious, remaining }) => {
                ADMITTED_TOTAL.inc();
                if *suspicious {
                    SUSPICIOUS_TOTAL.inc();
                    warn!(key, identity = identity.map(|i| i.identity_id.as_str()), "admitted suspicious request");
                } else {
                    debug!(key, remaining, "admitted");
                }
            }
            Ok(AdmissionResult::Blocked { retry_after_secs }) => {
                BLOCKED_TOTAL.inc();
                info!(key, retry_after_secs, "rate limit exceeded");
            }
            Err(err) => {
                ADMISSION_FAILURES.inc();
                error!(key, error = %err, "rate limit check failed");
            }
        }
        outcome
    }

    /// Decide without counting. Never writes and never evaluates trust.
    pub async fn preview(&self, key: &str, now: DateTime<Utc>) -> Result<AdmissionResult, AdmissionError> {
        let config = self.config();
        if !config.enabled() {
            return Ok(AdmissionResult::Allowed {
                suspicious: false,
                remaining: config.max(),
            });
        }

        let timestamps = self
            .store
            .load_bucket(key)
            .await?
            .map(|doc| doc.value.timestamps)
            .unwrap_or_default();
        let valid = prune(&timestamps, now, config.window_delta());

        Ok(blocked(&config, &valid, now).unwrap_or(AdmissionResult::Allowed {
            suspicious: false,
            remaining: remaining(&config, valid.len()),
        }))
    }

    async fn try_admit(
        &self,
        config: LimiterConfig,
        key: &str,
        now: DateTime<Utc>,
        identity: Option<&RequestIdentity>,
    ) -> StoreResult<AdmissionResult> {
        let (mut record, version) = match self.store.load_bucket(key).await? {
            Some(doc) => (doc.value, doc.version),
            None => (RateLimitRecord::empty(key, now), 0),
        };

        let mut valid = prune(&record.timestamps, now, config.window_delta());
        if let Some(result) = blocked(&config, &valid, now) {
            return Ok(result);
        }

        // Another instance may have committed a later timestamp already.
        let at = valid.partition_point(|t| *t <= now);
        valid.insert(at, now);

        let mut writes = WriteSet::new();
        let suspicious = match identity {
            Some(identity) => self.evaluate_identity(identity, now, &mut writes).await?,
            None => false,
        };

        let remaining = remaining(&config, valid.len());
        record.timestamps = valid;
        record.last_updated = now;
        record.suspicious = suspicious;
        writes.put_bucket(version, record);

        self.store.commit(writes).await?;
        Ok(AdmissionResult::Allowed { suspicious, remaining })
    }

    async fn evaluate_identity(
        &self,
        identity: &RequestIdentity,
        now: DateTime<Utc>,
        writes: &mut WriteSet,
    ) -> StoreResult<bool> {
        let Some(Versioned { value: mut record, version }) = self.store.load_identity(&identity.identity_id).await?
        else {
            debug!(identity = %identity.identity_id, "no trust record, treating as no history");
            return Ok(false);
        };

        let verdict = self.trust.evaluate(&mut record, &identity.ip, now);
        if verdict.mutated {
            writes.put_identity(version, record);
        }
        Ok(verdict.suspicious)
    }
}

fn blocked(config: &LimiterConfig, valid: &[DateTime<Utc>], now: DateTime<Utc>) -> Option<AdmissionResult> {
    let window = snapshot(valid);
    if window.count < config.max() as usize {
        return None;
    }
    let retry_after_secs = window
        .oldest
        .map(|oldest| retry_after_secs(oldest, now, config.window_delta()))
        .unwrap_or(1);
    Some(AdmissionResult::Blocked { retry_after_secs })
}

fn remaining(config: &LimiterConfig, count: usize) -> u32 {
    config.max().saturating_sub(count.min(u32::MAX as usize) as u32)
}
