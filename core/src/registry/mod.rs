//! Interface registry and per-(interface, metric) time-series buffers.
//!
//! The registry is the only shared mutable state in the engine. The
//! coordinator task is its single writer; the rendering layer reads through
//! [`Registry::snapshot`] and the health/listing accessors, which take only
//! short-lived shard locks and never block a concurrent write for long.

pub mod ring;

use std::collections::HashMap;

use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::config::TargetConfig;
use crate::rate;
use crate::sample::{InterfaceHandle, MetricKind, RatePoint, RawSample};
use crate::scheduler::health::{HealthSnapshot, TargetHealth};
use ring::Ring;

/// What discovery learned about one interface.
#[derive(Debug, Clone)]
pub struct DiscoveredInterface {
    pub if_index: u32,
    pub label: Option<String>,
    /// Nominal capacity from ifHighSpeed, in bits/sec.
    pub capacity_bps: Option<u64>,
}

/// Listing entry for the rendering layer.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceInfo {
    pub if_index: u32,
    pub label: Option<String>,
    pub capacity_bps: Option<u64>,
    /// Set while the owning target is Down; cleared on the next good poll.
    pub stale: bool,
}

/// Listing entry for one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetOverview {
    pub id: String,
    pub host: String,
    pub health: HealthSnapshot,
}

struct TargetState {
    host: String,
    plausibility_factor: f64,
    fallback_capacity_bps: u64,
    retention_points: usize,
    retention_max_age: Option<ChronoDuration>,
    health: HealthSnapshot,
}

struct MetricSeries {
    prev: Option<RawSample>,
    points: Ring<RatePoint>,
}

#[derive(Default)]
struct InterfaceState {
    label: Option<String>,
    capacity_bps: Option<u64>,
    stale: bool,
    series: HashMap<MetricKind, MetricSeries>,
}

#[derive(Default)]
pub struct Registry {
    targets: DashMap<String, TargetState>,
    interfaces: DashMap<InterfaceHandle, InterfaceState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_target(&self, cfg: &TargetConfig) {
        self.targets.insert(
            cfg.id.clone(),
            TargetState {
                host: cfg.host.clone(),
                plausibility_factor: cfg.plausibility_factor,
                fallback_capacity_bps: cfg.fallback_capacity_bps,
                retention_points: cfg.retention_points,
                retention_max_age: cfg
                    .retention_max_age_secs
                    .map(|s| ChronoDuration::seconds(s as i64)),
                health: HealthSnapshot::initial(),
            },
        );
    }

    /// Remove a target and every interface it owns. Used when monitoring of
    /// a target is cancelled; other targets' entries are untouched.
    pub fn deregister_target(&self, id: &str) {
        self.targets.remove(id);
        self.interfaces.retain(|handle, _| handle.target != id);
    }

    pub fn contains_target(&self, id: &str) -> bool {
        self.targets.contains_key(id)
    }

    /// Idempotent: registering an interface that already exists only fills
    /// in a label or capacity it was missing.
    pub fn register_interface(
        &self,
        handle: InterfaceHandle,
        label: Option<String>,
        capacity_bps: Option<u64>,
    ) {
        let mut entry = self.interfaces.entry(handle).or_default();
        if label.is_some() {
            entry.label = label;
        }
        if capacity_bps.is_some() {
            entry.capacity_bps = capacity_bps;
        }
    }

    pub fn deregister_interface(&self, handle: &InterfaceHandle) {
        self.interfaces.remove(handle);
    }

    pub fn apply_discovery(&self, target_id: &str, found: &[DiscoveredInterface]) {
        for item in found {
            let handle = InterfaceHandle {
                target: target_id.to_string(),
                if_index: item.if_index,
            };
            self.register_interface(handle, item.label.clone(), item.capacity_bps);
        }
    }

    /// Fold one poll round's raw samples into the buffers. The first sample
    /// of a series only seeds the "previous" slot; every later one derives a
    /// rate point against its predecessor.
    pub fn ingest(&self, target_id: &str, samples: Vec<RawSample>) {
        // Target may have been stopped while this round was in flight.
        let Some(target) = self.targets.get(target_id) else {
            return;
        };
        let factor = target.plausibility_factor;
        let fallback = target.fallback_capacity_bps;
        let capacity_cap = target.retention_points;
        let max_age = target.retention_max_age;
        drop(target);

        for sample in samples {
            let mut entry = self.interfaces.entry(sample.handle.clone()).or_default();
            entry.stale = false;
            let capacity = entry.capacity_bps.unwrap_or(fallback);
            let series = entry
                .series
                .entry(sample.metric)
                .or_insert_with(|| MetricSeries {
                    prev: None,
                    points: Ring::new(capacity_cap),
                });

            if let Some(prev) = series.prev.take() {
                let ceiling = plausibility_ceiling(sample.metric, capacity, factor);
                let point = rate::derive(&prev, &sample, ceiling);
                if !point.valid {
                    debug!(handle = %sample.handle, metric = %sample.metric, "recorded gap");
                }
                series.points.push(point);
                if let Some(age) = max_age {
                    let cutoff = sample.at - age;
                    series.points.evict_front_while(|p| p.at < cutoff);
                }
            }
            series.prev = Some(sample);
        }
    }

    pub fn set_health(&self, target_id: &str, health: HealthSnapshot) {
        let down = health.state == TargetHealth::Down;
        if let Some(mut target) = self.targets.get_mut(target_id) {
            target.health = health;
        }
        if down {
            for mut entry in self.interfaces.iter_mut() {
                if entry.key().target == target_id {
                    entry.stale = true;
                }
            }
        }
    }

    /// Read-only copy of one series for rendering. `None` means the
    /// interface is unknown; an empty vec means no rate has been derived yet.
    pub fn snapshot(&self, handle: &InterfaceHandle, metric: MetricKind) -> Option<Vec<RatePoint>> {
        let entry = self.interfaces.get(handle)?;
        Some(
            entry
                .series
                .get(&metric)
                .map(|s| s.points.to_vec())
                .unwrap_or_default(),
        )
    }

    pub fn target_health(&self, id: &str) -> Option<HealthSnapshot> {
        self.targets.get(id).map(|t| t.health.clone())
    }

    pub fn targets(&self) -> Vec<TargetOverview> {
        let mut out: Vec<TargetOverview> = self
            .targets
            .iter()
            .map(|entry| TargetOverview {
                id: entry.key().clone(),
                host: entry.host.clone(),
                health: entry.health.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn interfaces_of(&self, target_id: &str) -> Vec<InterfaceInfo> {
        let mut out: Vec<InterfaceInfo> = self
            .interfaces
            .iter()
            .filter(|entry| entry.key().target == target_id)
            .map(|entry| InterfaceInfo {
                if_index: entry.key().if_index,
                label: entry.label.clone(),
                capacity_bps: entry.capacity_bps,
                stale: entry.stale,
            })
            .collect();
        out.sort_by_key(|i| i.if_index);
        out
    }

    pub fn interface_info(&self, handle: &InterfaceHandle) -> Option<InterfaceInfo> {
        self.interfaces.get(handle).map(|entry| InterfaceInfo {
            if_index: handle.if_index,
            label: entry.label.clone(),
            capacity_bps: entry.capacity_bps,
            stale: entry.stale,
        })
    }
}

/// Maximum plausible rate for a metric, in the metric's own unit. Octet
/// rates cap at `factor x capacity`; packet rates assume minimum-size
/// (64-byte) frames at the same line rate.
fn plausibility_ceiling(metric: MetricKind, capacity_bps: u64, factor: f64) -> f64 {
    let bps = factor * capacity_bps as f64;
    if metric.is_octets() {
        bps
    } else {
        bps / (8.0 * 64.0)
    }
}
