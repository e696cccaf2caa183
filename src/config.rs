use chrono::TimeDelta;
use clap::{ArgAction, Parser};
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

const MAX_WINDOW_DAYS: u64 = 365;
const MAX_GRACE_DAYS: u64 = 3650;
const SECS_PER_DAY: u64 = 86_400;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "admission-gateway")]
#[command(about = "Per-key admission control with sliding windows and suspicious-IP detection")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Max admitted requests per window and key
    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 100)]
    pub rate_limit_max: u32,

    // Window length in milliseconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value_t = 900_000)]
    pub rate_limit_window_ms: u64,

    // Global kill switch, `--rate-limit-enabled false` admits everything
    #[arg(long, env = "RATE_LIMIT_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub rate_limit_enabled: bool,

    // Requests from one ip before it counts as an identity's home
    #[arg(long, env = "SUSPICIOUS_IP_THRESHOLD", default_value_t = 10)]
    pub suspicious_ip_threshold: u64,

    // Hours after identity creation during which nothing is flagged
    #[arg(long, env = "SUSPICIOUS_TIME_WINDOW_HOURS", default_value_t = 24)]
    pub suspicious_time_window_hours: u64,

    // Attempts per admission before giving up on write conflicts
    #[arg(long, env = "RATE_LIMIT_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    // First backoff delay, doubled on each conflict
    #[arg(long, env = "RATE_LIMIT_RETRY_BASE_MS", default_value_t = 100)]
    pub retry_base_ms: u64,
}

impl Args {
    pub fn limiter_config(&self) -> Result<LimiterConfig, ConfigError> {
        LimiterConfig::new(
            self.rate_limit_max,
            Duration::from_millis(self.rate_limit_window_ms),
            self.rate_limit_enabled,
        )
    }

    pub fn trust_policy(&self) -> Result<TrustPolicy, ConfigError> {
        TrustPolicy::new(
            self.suspicious_ip_threshold,
            Duration::from_secs(self.suspicious_time_window_hours.saturating_mul(3600)),
        )
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_ms))
    }
}

/// Validated sliding window settings. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    max: u32,
    window: Duration,
    enabled: bool,
}

impl LimiterConfig {
    pub fn new(max: u32, window: Duration, enabled: bool) -> Result<Self, ConfigError> {
        if max == 0 {
            return Err(ConfigError::InvalidMax);
        }
        if window.as_millis() == 0 || window.as_secs() > MAX_WINDOW_DAYS * SECS_PER_DAY {
            return Err(ConfigError::InvalidWindow {
                got_ms: window.as_millis(),
                max_days: MAX_WINDOW_DAYS,
            });
        }
        Ok(Self {
            max,
            window,
            enabled,
        })
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    // Bounded by validation, the conversion cannot overflow.
    pub(crate) fn window_delta(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.window.as_millis() as i64)
    }
}

/// Thresholds for the suspicious-ip heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    threshold: u64,
    grace: Duration,
}

impl TrustPolicy {
    pub const DEFAULT_THRESHOLD: u64 = 10;
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(24 * 3600);

    pub fn new(threshold: u64, grace: Duration) -> Result<Self, ConfigError> {
        if threshold == 0 {
            return Err(ConfigError::InvalidThreshold);
        }
        if grace.as_secs() > MAX_GRACE_DAYS * SECS_PER_DAY {
            return Err(ConfigError::InvalidGrace {
                max_days: MAX_GRACE_DAYS,
            });
        }
        Ok(Self { threshold, grace })
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub(crate) fn grace_delta(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.grace.as_millis() as i64)
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            grace: Self::DEFAULT_GRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_max() {
        assert_eq!(
            LimiterConfig::new(0, Duration::from_secs(60), true),
            Err(ConfigError::InvalidMax)
        );
    }

    #[test]
    fn rejects_empty_and_oversized_windows() {
        assert!(matches!(
            LimiterConfig::new(5, Duration::ZERO, true),
            Err(ConfigError::InvalidWindow { got_ms: 0, .. })
        ));
        let too_long = Duration::from_secs((MAX_WINDOW_DAYS + 1) * SECS_PER_DAY);
        assert!(LimiterConfig::new(5, too_long, true).is_err());
    }

    #[test]
    fn rejects_sub_millisecond_window() {
        assert!(matches!(
            LimiterConfig::new(1, Duration::from_micros(500), true),
            Err(ConfigError::InvalidWindow { got_ms: 0, .. })
        ));
        assert!(LimiterConfig::new(1, Duration::from_millis(1), true).is_ok());
    }

    #[test]
    fn window_delta_matches_window() {
        let config = LimiterConfig::new(5, Duration::from_millis(60_500), true).unwrap();
        assert_eq!(config.window_delta(), TimeDelta::milliseconds(60_500));
    }

    #[test]
    fn trust_policy_validation() {
        assert_eq!(
            TrustPolicy::new(0, TrustPolicy::DEFAULT_GRACE),
            Err(ConfigError::InvalidThreshold)
        );
        let policy = TrustPolicy::default();
        assert_eq!(policy.threshold(), 10);
        assert_eq!(policy.grace_delta(), TimeDelta::hours(24));
    }

    #[test]
    fn args_parse_from_flags() {
        let args = Args::parse_from([
            "admission-gateway",
            "--rate-limit-max",
            "5",
            "--rate-limit-window-ms",
            "60000",
            "--rate-limit-enabled",
            "false",
        ]);
        let config = args.limiter_config().unwrap();
        assert_eq!(config.max(), 5);
        assert_eq!(config.window(), Duration::from_secs(60));
        assert!(!config.enabled());
        assert_eq!(args.trust_policy().unwrap(), TrustPolicy::default());
    }
}
