//! Counter-delta to rate conversion.
//!
//! Deltas are computed with explicit modulo arithmetic over the counter's
//! declared bit-width, so a 32-bit wrap and a 64-bit wrap both come out
//! right and native integer overflow is never involved. A wrap and a
//! counter reset are arithmetically identical near zero; the two are told
//! apart by a plausibility ceiling — a delta implying a rate far beyond the
//! interface's nominal capacity is judged a reset and recorded as a gap.

use tracing::debug;

use crate::sample::{RatePoint, RawSample};

/// Elapsed intervals below this are rejected outright (division-by-near-zero
/// guard); the scheduler never legitimately polls this fast.
const MIN_ELAPSED_SECS: f64 = 1e-3;

/// Derive a rate point from two time-ordered samples of the same
/// (interface, metric). `ceiling` is the maximum plausible rate in the
/// metric's own unit; anything above it yields an invalid point.
pub fn derive(previous: &RawSample, current: &RawSample, ceiling: f64) -> RatePoint {
    debug_assert_eq!(previous.handle, current.handle);
    debug_assert_eq!(previous.metric, current.metric);

    let gap = RatePoint {
        at: current.at,
        rate: 0.0,
        valid: false,
    };

    // A width change mid-series (HC fallback kicked in between polls) makes
    // the two values incomparable.
    if previous.width != current.width {
        debug!(handle = %current.handle, metric = %current.metric, "counter width changed between samples");
        return gap;
    }

    let elapsed = current
        .mono
        .saturating_duration_since(previous.mono)
        .as_secs_f64();
    if elapsed < MIN_ELAPSED_SECS {
        debug!(handle = %current.handle, metric = %current.metric, "non-positive sample interval");
        return gap;
    }

    let modulus = current.width.modulus();
    let delta = (u128::from(current.value) + modulus - u128::from(previous.value)) % modulus;

    let rate = delta as f64 * current.metric.unit_factor() / elapsed;
    if rate > ceiling {
        debug!(
            handle = %current.handle,
            metric = %current.metric,
            rate,
            ceiling,
            "implausible delta, treating as counter reset"
        );
        return gap;
    }

    RatePoint {
        at: current.at,
        rate: current.metric.round_rate(rate),
        valid: true,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use tokio::time::Instant;

    use super::*;
    use crate::sample::{CounterWidth, InterfaceHandle, MetricKind};

    const WIDE_OPEN: f64 = f64::MAX;

    fn sample(
        value: u64,
        width: CounterWidth,
        metric: MetricKind,
        base: Instant,
        offset_secs: f64,
    ) -> RawSample {
        RawSample {
            handle: InterfaceHandle {
                target: "router".into(),
                if_index: 1,
            },
            metric,
            value,
            width,
            at: Utc::now(),
            mono: base + Duration::from_secs_f64(offset_secs),
        }
    }

    #[test]
    fn plain_delta_in_bits_per_second() {
        let base = Instant::now();
        let prev = sample(1000, CounterWidth::Bits64, MetricKind::InOctets, base, 0.0);
        let cur = sample(2000, CounterWidth::Bits64, MetricKind::InOctets, base, 5.0);

        let point = derive(&prev, &cur, WIDE_OPEN);
        assert!(point.valid);
        assert_eq!(point.rate, 1600.0);
    }

    #[test]
    fn wrap_at_32_bits() {
        let base = Instant::now();
        let prev = sample(
            (1u64 << 32) - 10,
            CounterWidth::Bits32,
            MetricKind::InOctets,
            base,
            0.0,
        );
        let cur = sample(5, CounterWidth::Bits32, MetricKind::InOctets, base, 1.0);

        // 10 octets up to the maximum, then 5 more: delta 15, not negative.
        let point = derive(&prev, &cur, WIDE_OPEN);
        assert!(point.valid);
        assert_eq!(point.rate, 120.0);
    }

    #[test]
    fn wrap_at_64_bits() {
        let base = Instant::now();
        let prev = sample(
            u64::MAX - 9,
            CounterWidth::Bits64,
            MetricKind::InOctets,
            base,
            0.0,
        );
        let cur = sample(5, CounterWidth::Bits64, MetricKind::InOctets, base, 1.0);

        let point = derive(&prev, &cur, WIDE_OPEN);
        assert!(point.valid);
        assert_eq!(point.rate, 120.0);
    }

    #[test]
    fn counter_reset_is_a_gap_not_a_huge_rate() {
        let base = Instant::now();
        // An administratively-cleared counter: big value down to near zero.
        // Wrapped arithmetic would fabricate an astronomical delta.
        let prev = sample(
            10_000_000_000,
            CounterWidth::Bits64,
            MetricKind::InOctets,
            base,
            0.0,
        );
        let cur = sample(100, CounterWidth::Bits64, MetricKind::InOctets, base, 5.0);

        let ceiling = 2.0 * 10_000_000_000.0; // 2x a 10G interface
        let point = derive(&prev, &cur, ceiling);
        assert!(!point.valid);
    }

    #[test]
    fn zero_elapsed_is_a_gap() {
        let base = Instant::now();
        let prev = sample(1000, CounterWidth::Bits64, MetricKind::InOctets, base, 0.0);
        let cur = sample(2000, CounterWidth::Bits64, MetricKind::InOctets, base, 0.0);

        assert!(!derive(&prev, &cur, WIDE_OPEN).valid);
    }

    #[test]
    fn width_change_is_a_gap() {
        let base = Instant::now();
        let prev = sample(1000, CounterWidth::Bits64, MetricKind::InOctets, base, 0.0);
        let cur = sample(2000, CounterWidth::Bits32, MetricKind::InOctets, base, 5.0);

        assert!(!derive(&prev, &cur, WIDE_OPEN).valid);
    }

    #[test]
    fn packet_rates_keep_a_tenth_precision() {
        let base = Instant::now();
        let prev = sample(0, CounterWidth::Bits64, MetricKind::InUcastPkts, base, 0.0);
        let cur = sample(7, CounterWidth::Bits64, MetricKind::InUcastPkts, base, 3.0);

        let point = derive(&prev, &cur, WIDE_OPEN);
        assert!(point.valid);
        assert_eq!(point.rate, 2.3);
    }
}
