use std::time::{Duration, Instant};

/// Human-readable duration with automatic unit scaling, e.g. `1.94ms` or `2.34s`.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Warn when more than `threshold` has passed since `start`. Returns whether it did.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) -> bool {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(duration = fmt_duration(elapsed), "slow operation: {label}");
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_scale_units() {
        assert_eq!(fmt_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(fmt_duration(Duration::from_micros(250)), "250.00µs");
    }

    #[test]
    fn fast_operations_are_not_flagged() {
        assert!(!log_if_slow(Instant::now(), Duration::from_secs(60), "noop"));
    }
}
