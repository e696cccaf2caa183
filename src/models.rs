use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// Rate limit bucket document - one per admission key ("ip:<address>")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    pub key: String,
    pub timestamps: Vec<DateTime<Utc>>, // chronological, duplicates allowed
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub suspicious: bool,
}

impl RateLimitRecord {
    pub fn empty(key: &str, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            timestamps: Vec::new(),
            last_updated: now,
            suspicious: false,
        }
    }
}

// Per-IP history nested under an identity document as `ipMetadata`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpMetadata {
    #[serde(default)]
    pub ip_frequency: BTreeMap<String, u64>,
    #[serde(default)]
    pub last_seen_at: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub primary_ip: Option<String>,
    // Only ever grows.
    #[serde(default)]
    pub suspicious_ips: BTreeSet<String>,
}

// Identity trust document. `created_at` belongs to the registration flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityTrustRecord {
    pub identity_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ip_metadata: IpMetadata,
}

impl IdentityTrustRecord {
    pub fn new(identity_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            identity_id: identity_id.to_string(),
            created_at,
            ip_metadata: IpMetadata::default(),
        }
    }

    pub fn is_suspicious(&self, ip: &str) -> bool {
        self.ip_metadata.suspicious_ips.contains(ip)
    }
}

// Who is calling, as resolved by the auth and request-parsing layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub identity_id: String,
    pub ip: String,
}

impl RequestIdentity {
    pub fn new(identity_id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            identity_id: identity_id.into(),
            ip: ip.into(),
        }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionResult {
    /// The request was counted. `suspicious` is a soft signal for the caller, never a block.
    Allowed { suspicious: bool, remaining: u32 },
    /// The window is full. Nothing was written.
    Blocked { retry_after_secs: u64 },
}

impl AdmissionResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionResult::Allowed { .. })
    }

    pub fn is_suspicious(&self) -> bool {
        matches!(self, AdmissionResult::Allowed { suspicious: true, .. })
    }
}

// Bucket key for a client address
pub fn ip_key(ip: &str) -> String {
    format!("ip:{}", ip)
}
