use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub count: usize,
    pub oldest: Option<DateTime<Utc>>,
}

/// Keep only the timestamps with `t > now - window`, in their original order.
pub fn prune(timestamps: &[DateTime<Utc>], now: DateTime<Utc>, window: TimeDelta) -> Vec<DateTime<Utc>> {
    match now.checked_sub_signed(window) {
        Some(cutoff) => timestamps.iter().copied().filter(|t| *t > cutoff).collect(),
        None => timestamps.to_vec(),
    }
}

pub fn snapshot(valid: &[DateTime<Utc>]) -> WindowSnapshot {
    WindowSnapshot {
        count: valid.len(),
        oldest: valid.first().copied(),
    }
}

// Rounded up, and capped at one window in case `now` lags behind `oldest`.
pub fn retry_after_secs(oldest: DateTime<Utc>, now: DateTime<Utc>, window: TimeDelta) -> u64 {
    let window_ms = window.num_milliseconds().max(0) as u64;
    let remaining_ms = (oldest + window - now).num_milliseconds().max(0) as u64;
    remaining_ms.min(window_ms).div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn prune_drops_entries_at_or_before_cutoff() {
        let window = TimeDelta::seconds(60);
        let ts = vec![at(0), at(10), at(30), at(70)];
        // cutoff = 70 - 60 = 10, so 10 itself is out
        assert_eq!(prune(&ts, at(70), window), vec![at(30), at(70)]);
    }

    #[test]
    fn prune_keeps_order_and_duplicates() {
        let window = TimeDelta::seconds(60);
        let ts = vec![at(5), at(5), at(6)];
        assert_eq!(prune(&ts, at(7), window), ts);
    }

    #[test]
    fn prune_of_empty_list_is_empty() {
        assert!(prune(&[], at(0), TimeDelta::seconds(1)).is_empty());
    }

    #[test]
    fn snapshot_reports_oldest() {
        let snap = snapshot(&[at(3), at(4)]);
        assert_eq!(snap.count, 2);
        assert_eq!(snap.oldest, Some(at(3)));
        assert_eq!(snapshot(&[]).oldest, None);
    }

    #[test]
    fn retry_after_rounds_up() {
        let window = TimeDelta::seconds(60);
        assert_eq!(retry_after_secs(at(0), at(15), window), 45);

        let now = at(15) + TimeDelta::milliseconds(200);
        assert_eq!(retry_after_secs(at(0), now, window), 45);
    }

    #[test]
    fn retry_after_is_capped_when_now_lags_behind_oldest() {
        let window = TimeDelta::seconds(60);
        assert_eq!(retry_after_secs(at(30), at(0), window), 60);

        let window = TimeDelta::milliseconds(1500);
        assert_eq!(retry_after_secs(at(10), at(0), window), 2);
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let window = TimeDelta::milliseconds(500);
        let oldest = at(0);
        let now = oldest + TimeDelta::milliseconds(499);
        assert_eq!(retry_after_secs(oldest, now, window), 1);
    }
}
