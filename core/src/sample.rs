use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::snmp::{oids, Oid};

/// Bit-width of the counter a sample was read from. Determines the modulus
/// used for wraparound arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterWidth {
    Bits32,
    Bits64,
}

impl CounterWidth {
    pub fn modulus(self) -> u128 {
        match self {
            CounterWidth::Bits32 => 1u128 << 32,
            CounterWidth::Bits64 => 1u128 << 64,
        }
    }
}

/// Which interface counter a sample or rate series refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    InOctets,
    OutOctets,
    InUcastPkts,
    OutUcastPkts,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::InOctets,
        MetricKind::OutOctets,
        MetricKind::InUcastPkts,
        MetricKind::OutUcastPkts,
    ];

    /// The 64-bit ifXTable column for this metric.
    pub fn hc_column(self) -> Oid {
        match self {
            MetricKind::InOctets => Oid::new(oids::IF_HC_IN_OCTETS),
            MetricKind::OutOctets => Oid::new(oids::IF_HC_OUT_OCTETS),
            MetricKind::InUcastPkts => Oid::new(oids::IF_HC_IN_UCAST_PKTS),
            MetricKind::OutUcastPkts => Oid::new(oids::IF_HC_OUT_UCAST_PKTS),
        }
    }

    /// The 32-bit ifTable column for this metric.
    pub fn legacy_column(self) -> Oid {
        match self {
            MetricKind::InOctets => Oid::new(oids::IF_IN_OCTETS),
            MetricKind::OutOctets => Oid::new(oids::IF_OUT_OCTETS),
            MetricKind::InUcastPkts => Oid::new(oids::IF_IN_UCAST_PKTS),
            MetricKind::OutUcastPkts => Oid::new(oids::IF_OUT_UCAST_PKTS),
        }
    }

    pub fn column(self, width: CounterWidth) -> Oid {
        match width {
            CounterWidth::Bits64 => self.hc_column(),
            CounterWidth::Bits32 => self.legacy_column(),
        }
    }

    /// Octet metrics are reported in bits/sec, packet metrics in pkts/sec.
    pub fn is_octets(self) -> bool {
        matches!(self, MetricKind::InOctets | MetricKind::OutOctets)
    }

    /// Multiplier applied to the counter delta before dividing by elapsed
    /// time: 8 for octet counters (bits), 1 for packet counters.
    pub fn unit_factor(self) -> f64 {
        if self.is_octets() {
            8.0
        } else {
            1.0
        }
    }

    /// Round a derived rate to the metric's declared unit precision:
    /// whole bits/sec for octet metrics, 0.1 pkt/sec for packet metrics.
    pub fn round_rate(self, rate: f64) -> f64 {
        if self.is_octets() {
            rate.round()
        } else {
            (rate * 10.0).round() / 10.0
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::InOctets => "in-octets",
            MetricKind::OutOctets => "out-octets",
            MetricKind::InUcastPkts => "in-ucast-pkts",
            MetricKind::OutUcastPkts => "out-ucast-pkts",
        }
    }

    pub fn parse(s: &str) -> Option<MetricKind> {
        MetricKind::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One interface on one monitored target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceHandle {
    pub target: String,
    pub if_index: u32,
}

impl fmt::Display for InterfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.if_index)
    }
}

/// A raw counter reading. Immutable once recorded; at most one previous and
/// one current sample exist per (interface, metric) at any time.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub handle: InterfaceHandle,
    pub metric: MetricKind,
    pub value: u64,
    pub width: CounterWidth,
    /// Wall-clock completion time of the poll that produced this sample.
    pub at: DateTime<Utc>,
    /// Monotonic completion time; all elapsed-interval arithmetic uses this,
    /// so wall-clock skew cannot produce negative intervals.
    pub mono: Instant,
}

/// A derived rate. Invalid points are retained in history as explicit gaps
/// so a chart renders a break rather than a false zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatePoint {
    pub at: DateTime<Utc>,
    /// Rate in the metric's unit (bits/sec or pkts/sec). Always >= 0;
    /// meaningless when `valid` is false.
    pub rate: f64,
    pub valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_kind_round_trips_through_its_name() {
        for metric in MetricKind::ALL {
            assert_eq!(MetricKind::parse(metric.as_str()), Some(metric));
        }
        assert_eq!(MetricKind::parse("bogus"), None);
    }

    #[test]
    fn octet_metrics_scale_to_bits() {
        assert_eq!(MetricKind::InOctets.unit_factor(), 8.0);
        assert_eq!(MetricKind::OutUcastPkts.unit_factor(), 1.0);
    }

    #[test]
    fn rounding_matches_unit_precision() {
        assert_eq!(MetricKind::InOctets.round_rate(1599.7), 1600.0);
        assert_eq!(MetricKind::InUcastPkts.round_rate(2.333), 2.3);
    }

    #[test]
    fn width_moduli() {
        assert_eq!(CounterWidth::Bits32.modulus(), 1u128 << 32);
        assert_eq!(CounterWidth::Bits64.modulus(), 1u128 << 64);
    }
}
