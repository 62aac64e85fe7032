//! # Metrics
//!
//! Prometheus metrics for the refresh loop.
//!
//! ## Metrics Exposed
//!
//! - `ksm_agent_fetch_success_total` - Successful fetches per reference
//! - `ksm_agent_fetch_failures_total` - Failed fetches per reference
//! - `ksm_agent_fetch_duration_seconds` - Fetch latency per reference
//! - `ksm_agent_degraded_total` - Degraded serves per reference and kind
//! - `ksm_agent_cache_age_seconds` - Age of the payload served last cycle
//! - `ksm_agent_secrets_active` - Number of materialized references
//! - `ksm_agent_last_refresh_timestamp_seconds` - Last successful cycle
//! - `ksm_agent_cycles_total` / `ksm_agent_cycle_failures_total`

use anyhow::Result;
use prometheus::{GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static FETCH_SUCCESS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ksm_agent_fetch_success_total",
            "Total number of successful reference fetches",
        ),
        &["reference"],
    )
    .expect("Failed to create FETCH_SUCCESS_TOTAL metric - this should never happen")
});

static FETCH_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ksm_agent_fetch_failures_total",
            "Total number of failed reference fetches (after retries)",
        ),
        &["reference"],
    )
    .expect("Failed to create FETCH_FAILURES_TOTAL metric - this should never happen")
});

static FETCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "ksm_agent_fetch_duration_seconds",
            "Duration of reference fetches in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["reference"],
    )
    .expect("Failed to create FETCH_DURATION metric - this should never happen")
});

static DEGRADED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ksm_agent_degraded_total",
            "Total number of degraded serves by reference and kind",
        ),
        &["reference", "kind"],
    )
    .expect("Failed to create DEGRADED_TOTAL metric - this should never happen")
});

static CACHE_AGE_SECONDS: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        prometheus::Opts::new(
            "ksm_agent_cache_age_seconds",
            "Age of the payload served for each reference in the last cycle",
        ),
        &["reference"],
    )
    .expect("Failed to create CACHE_AGE_SECONDS metric - this should never happen")
});

static SECRETS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "ksm_agent_secrets_active",
        "Number of references materialized in the last cycle",
    )
    .expect("Failed to create SECRETS_ACTIVE metric - this should never happen")
});

static LAST_REFRESH_TIMESTAMP: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "ksm_agent_last_refresh_timestamp_seconds",
        "Unix timestamp of the last successful refresh cycle",
    )
    .expect("Failed to create LAST_REFRESH_TIMESTAMP metric - this should never happen")
});

static CYCLES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("ksm_agent_cycles_total", "Total number of refresh cycles")
        .expect("Failed to create CYCLES_TOTAL metric - this should never happen")
});

static CYCLE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ksm_agent_cycle_failures_total",
        "Total number of refresh cycles with at least one failed reference",
    )
    .expect("Failed to create CYCLE_FAILURES_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    // Prometheus metrics internally share their data via Arc, so cloning
    // the LazyLock handles for registration is cheap and happens once.
    REGISTRY.register(Box::new(FETCH_SUCCESS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_DURATION.clone()))?;
    REGISTRY.register(Box::new(DEGRADED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_AGE_SECONDS.clone()))?;
    REGISTRY.register(Box::new(SECRETS_ACTIVE.clone()))?;
    REGISTRY.register(Box::new(LAST_REFRESH_TIMESTAMP.clone()))?;
    REGISTRY.register(Box::new(CYCLES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CYCLE_FAILURES_TOTAL.clone()))?;
    Ok(())
}

pub fn record_fetch_success(reference: &str, duration: f64) {
    FETCH_SUCCESS_TOTAL.with_label_values(&[reference]).inc();
    FETCH_DURATION
        .with_label_values(&[reference])
        .observe(duration);
}

pub fn record_fetch_failure(reference: &str, duration: f64) {
    FETCH_FAILURES_TOTAL.with_label_values(&[reference]).inc();
    FETCH_DURATION
        .with_label_values(&[reference])
        .observe(duration);
}

pub fn record_degraded(reference: &str, kind: &str) {
    DEGRADED_TOTAL.with_label_values(&[reference, kind]).inc();
}

pub fn set_cache_age(reference: &str, age_seconds: f64) {
    CACHE_AGE_SECONDS
        .with_label_values(&[reference])
        .set(age_seconds);
}

pub fn set_secrets_active(count: i64) {
    SECRETS_ACTIVE.set(count);
}

pub fn record_cycle(failed: bool) {
    CYCLES_TOTAL.inc();
    if failed {
        CYCLE_FAILURES_TOTAL.inc();
    } else {
        LAST_REFRESH_TIMESTAMP.set(chrono::Utc::now().timestamp());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_record_fetch_success() {
        let before = FETCH_SUCCESS_TOTAL.with_label_values(&["r1"]).get();
        record_fetch_success("r1", 0.2);
        let after = FETCH_SUCCESS_TOTAL.with_label_values(&["r1"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_record_fetch_failure() {
        let before = FETCH_FAILURES_TOTAL.with_label_values(&["r1"]).get();
        record_fetch_failure("r1", 0.2);
        let after = FETCH_FAILURES_TOTAL.with_label_values(&["r1"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_record_degraded_by_kind() {
        let before = DEGRADED_TOTAL.with_label_values(&["r1", "from_cache"]).get();
        record_degraded("r1", "from_cache");
        let after = DEGRADED_TOTAL.with_label_values(&["r1", "from_cache"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_cache_age_gauge() {
        set_cache_age("r1", 15.0);
        assert!((CACHE_AGE_SECONDS.with_label_values(&["r1"]).get() - 15.0).abs() < f64::EPSILON);
        set_cache_age("r1", 0.0);
        assert!(CACHE_AGE_SECONDS.with_label_values(&["r1"]).get().abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_cycle_sets_timestamp_on_success() {
        record_cycle(false);
        assert!(LAST_REFRESH_TIMESTAMP.get() > 0);
    }

    #[test]
    fn test_secrets_active_gauge() {
        set_secrets_active(4);
        assert_eq!(SECRETS_ACTIVE.get(), 4);
    }
}
