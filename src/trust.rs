// Flags ratchet one way: an ip flagged for an identity stays flagged.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::TrustPolicy;
use crate::models::{IdentityTrustRecord, IpMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustVerdict {
    pub suspicious: bool,
    /// Whether the record changed and must be written back.
    pub mutated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TrustEvaluator {
    policy: TrustPolicy,
}

impl TrustEvaluator {
    pub fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }

    /// Record a request from `ip` and decide whether it looks out of place.
    pub fn evaluate(&self, record: &mut IdentityTrustRecord, ip: &str, now: DateTime<Utc>) -> TrustVerdict {
        if record.is_suspicious(ip) {
            debug!(identity = %record.identity_id, ip, "ip already flagged");
            return TrustVerdict {
                suspicious: true,
                mutated: false,
            };
        }

        let meta = &mut record.ip_metadata;
        *meta.ip_frequency.entry(ip.to_string()).or_insert(0) += 1;
        meta.last_seen_at.insert(ip.to_string(), now);
        meta.primary_ip = elect_primary(meta);

        let primary = meta.primary_ip.as_deref().unwrap_or(ip);
        let primary_frequency = meta.ip_frequency.get(primary).copied().unwrap_or(0);
        let established = primary_frequency >= self.policy.threshold();
        let within_grace = now - record.created_at <= self.policy.grace_delta();

        let suspicious = established && !within_grace && ip != primary;
        if suspicious {
            warn!(
                identity = %record.identity_id,
                ip,
                primary_ip = primary,
                primary_frequency,
                "request from unfamiliar ip"
            );
            meta.suspicious_ips.insert(ip.to_string());
        }

        TrustVerdict {
            suspicious,
            mutated: true,
        }
    }
}

// Highest frequency wins. Ties keep the current primary, then prefer the most
// recently seen ip, then the lexicographically smallest.
fn elect_primary(meta: &IpMetadata) -> Option<String> {
    let max = meta.ip_frequency.values().copied().max()?;

    if let Some(current) = meta.primary_ip.as_deref() {
        if meta.ip_frequency.get(current) == Some(&max) {
            return Some(current.to_string());
        }
    }

    let mut best: Option<(&str, Option<&DateTime<Utc>>)> = None;
    for (ip, _) in meta.ip_frequency.iter().filter(|(_, count)| **count == max) {
        let seen = meta.last_seen_at.get(ip);
        match best {
            Some((_, best_seen)) if seen <= best_seen => {}
            _ => best = Some((ip, seen)),
        }
    }
    best.map(|(ip, _)| ip.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn established(evaluator: &TrustEvaluator, home: &str, count: u64) -> IdentityTrustRecord {
        let mut record = IdentityTrustRecord::new("user-1", t0());
        for i in 0..count {
            evaluator.evaluate(&mut record, home, t0() + TimeDelta::minutes(i as i64));
        }
        record
    }

    #[test]
    fn first_request_sets_primary() {
        let evaluator = TrustEvaluator::default();
        let mut record = IdentityTrustRecord::new("user-1", t0());

        let verdict = evaluator.evaluate(&mut record, "10.0.0.1", t0());

        assert_eq!(verdict, TrustVerdict { suspicious: false, mutated: true });
        assert_eq!(record.ip_metadata.primary_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(record.ip_metadata.ip_frequency["10.0.0.1"], 1);
        assert_eq!(record.ip_metadata.last_seen_at["10.0.0.1"], t0());
    }

    #[test]
    fn grace_period_suppresses_flags() {
        let evaluator = TrustEvaluator::default();
        let mut record = established(&evaluator, "10.0.0.1", 12);

        let verdict = evaluator.evaluate(&mut record, "10.0.0.2", t0() + TimeDelta::hours(2));

        assert!(!verdict.suspicious);
        assert!(record.ip_metadata.suspicious_ips.is_empty());
    }

    #[test]
    fn new_ip_after_grace_is_flagged() {
        let evaluator = TrustEvaluator::default();
        let mut record = established(&evaluator, "10.0.0.1", 12);

        let verdict = evaluator.evaluate(&mut record, "10.0.0.2", t0() + TimeDelta::hours(25));

        assert!(verdict.suspicious);
        assert!(record.is_suspicious("10.0.0.2"));
        assert_eq!(record.ip_metadata.primary_ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn primary_ip_is_never_flagged() {
        let evaluator = TrustEvaluator::default();
        let mut record = established(&evaluator, "10.0.0.1", 12);

        let verdict = evaluator.evaluate(&mut record, "10.0.0.1", t0() + TimeDelta::days(3));

        assert!(!verdict.suspicious);
    }

    #[test]
    fn unestablished_primary_flags_nothing() {
        let evaluator = TrustEvaluator::default();
        let mut record = established(&evaluator, "10.0.0.1", 9);

        let verdict = evaluator.evaluate(&mut record, "10.0.0.2", t0() + TimeDelta::days(3));

        assert!(!verdict.suspicious);
    }

    #[test]
    fn flagged_ip_stays_flagged() {
        let evaluator = TrustEvaluator::default();
        let mut record = established(&evaluator, "10.0.0.1", 10);
        let later = t0() + TimeDelta::days(2);
        assert!(evaluator.evaluate(&mut record, "10.0.0.2", later).suspicious);

        // Drive the flagged ip's count far past the old primary.
        record.ip_metadata.ip_frequency.insert("10.0.0.2".into(), 500);
        let snapshot = record.clone();

        let verdict = evaluator.evaluate(&mut record, "10.0.0.2", later + TimeDelta::hours(1));
        assert_eq!(verdict, TrustVerdict { suspicious: true, mutated: false });
        assert_eq!(record, snapshot);
    }

    #[test]
    fn tie_keeps_current_primary() {
        let mut meta = IpMetadata::default();
        meta.ip_frequency.insert("a".into(), 3);
        meta.ip_frequency.insert("b".into(), 3);
        meta.last_seen_at.insert("a".into(), t0());
        meta.last_seen_at.insert("b".into(), t0() + TimeDelta::hours(1));
        meta.primary_ip = Some("a".into());

        assert_eq!(elect_primary(&meta).as_deref(), Some("a"));
    }

    #[test]
    fn tie_without_current_prefers_most_recent() {
        let mut meta = IpMetadata::default();
        meta.ip_frequency.insert("a".into(), 3);
        meta.ip_frequency.insert("b".into(), 3);
        meta.ip_frequency.insert("c".into(), 1);
        meta.last_seen_at.insert("a".into(), t0());
        meta.last_seen_at.insert("b".into(), t0() + TimeDelta::hours(1));
        meta.primary_ip = Some("c".into());

        assert_eq!(elect_primary(&meta).as_deref(), Some("b"));
    }

    #[test]
    fn tie_with_equal_recency_picks_smallest() {
        let mut meta = IpMetadata::default();
        meta.ip_frequency.insert("b".into(), 2);
        meta.ip_frequency.insert("a".into(), 2);

        assert_eq!(elect_primary(&meta).as_deref(), Some("a"));
    }

    #[test]
    fn custom_threshold_and_grace() {
        let policy = TrustPolicy::new(2, std::time::Duration::from_secs(60)).unwrap();
        let evaluator = TrustEvaluator::new(policy);
        let mut record = established(&evaluator, "10.0.0.1", 2);

        let verdict = evaluator.evaluate(&mut record, "10.0.0.9", t0() + TimeDelta::minutes(5));
        assert!(verdict.suspicious);
    }
}
