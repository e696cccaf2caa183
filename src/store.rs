// Optimistic store seam. Version 0 means the document is absent.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::models::{IdentityTrustRecord, RateLimitRecord};

pub const RATE_LIMITS: &str = "rate_limits";
pub const IDENTITIES: &str = "identities";

/// A document as read, with the version a later commit must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[derive(Debug, Clone)]
enum Write {
    Bucket { expected: u64, record: RateLimitRecord },
    Identity { expected: u64, record: IdentityTrustRecord },
}

/// Documents to commit atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    writes: Vec<Write>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_bucket(&mut self, expected_version: u64, record: RateLimitRecord) {
        self.writes.push(Write::Bucket {
            expected: expected_version,
            record,
        });
    }

    pub fn put_identity(&mut self, expected_version: u64, record: IdentityTrustRecord) {
        self.writes.push(Write::Identity {
            expected: expected_version,
            record,
        });
    }
}

#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn load_bucket(&self, key: &str) -> StoreResult<Option<Versioned<RateLimitRecord>>>;

    async fn load_identity(&self, identity_id: &str) -> StoreResult<Option<Versioned<IdentityTrustRecord>>>;

    /// Apply every write or none. Fails with [`StoreError::Conflict`] when any
    /// document moved past its expected version.
    async fn commit(&self, writes: WriteSet) -> StoreResult<()>;
}

/// In-process store. Reads are lock-free, commits are serialized.
#[derive(Default)]
pub struct MemoryStore {
    buckets: DashMap<String, Versioned<RateLimitRecord>>,
    identities: DashMap<String, Versioned<IdentityTrustRecord>>,
    commit_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stand-in for the identity registration flow. Existing identities are left alone.
    pub fn register_identity(&self, record: IdentityTrustRecord) {
        let _guard = self.commit_lock.lock();
        self.identities
            .entry(record.identity_id.clone())
            .or_insert(Versioned { value: record, version: 1 });
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn current_version(&self, write: &Write) -> u64 {
        let version = match write {
            Write::Bucket { record, .. } => self.buckets.get(&record.key).map(|d| d.version),
            Write::Identity { record, .. } => self.identities.get(&record.identity_id).map(|d| d.version),
        };
        version.unwrap_or(0)
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    async fn load_bucket(&self, key: &str) -> StoreResult<Option<Versioned<RateLimitRecord>>> {
        Ok(self.buckets.get(key).map(|d| d.value().clone()))
    }

    async fn load_identity(&self, identity_id: &str) -> StoreResult<Option<Versioned<IdentityTrustRecord>>> {
        Ok(self.identities.get(identity_id).map(|d| d.value().clone()))
    }

    async fn commit(&self, writes: WriteSet) -> StoreResult<()> {
        let _guard = self.commit_lock.lock();

        for write in &writes.writes {
            let (expected, collection, key) = match write {
                Write::Bucket { expected, record } => (*expected, RATE_LIMITS, &record.key),
                Write::Identity { expected, record } => (*expected, IDENTITIES, &record.identity_id),
            };
            if self.current_version(write) != expected {
                return Err(StoreError::Conflict {
                    collection,
                    key: key.clone(),
                });
            }
        }

        for write in writes.writes {
            match write {
                Write::Bucket { expected, record } => {
                    self.buckets.insert(
                        record.key.clone(),
                        Versioned { value: record, version: expected + 1 },
                    );
                }
                Write::Identity { expected, record } => {
                    self.identities.insert(
                        record.identity_id.clone(),
                        Versioned { value: record, version: expected + 1 },
                    );
                }
            }
        }
        Ok(())
    }
}
