use chrono::{DateTime, Duration, Utc};

/// Longest span accepted from configuration, a century in seconds
const MAX_CONFIG_SECONDS: u64 = 100 * 365 * 24 * 3600;

/// Seconds elapsed from `earlier` to `later`; negative when the clock went backwards
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    match (later - earlier).num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => (later - earlier).num_milliseconds() as f64 / 1_000.0,
    }
}

/// Configured number of seconds as a duration, clamped to a century
pub fn config_duration(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_CONFIG_SECONDS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_between() {
        let t0 = Utc::now();
        assert_eq!(seconds_between(t0, t0 + Duration::milliseconds(2500)), 2.5);
        assert!(seconds_between(t0 + Duration::seconds(1), t0) < 0.0);
    }

    #[test]
    fn test_config_duration_clamps_huge_values() {
        assert_eq!(config_duration(30), Duration::seconds(30));
        assert_eq!(config_duration(u64::MAX), Duration::seconds(MAX_CONFIG_SECONDS as i64));
        assert!(config_duration(u64::MAX) > Duration::zero());
    }
}
