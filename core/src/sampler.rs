//! One polling round per target: counter column fetches plus first-round
//! interface discovery.
//!
//! Each monitored counter column is fetched with one GETBULK walk covering
//! every interface; if the walk fails the round falls back to one GET per
//! instance OID and reports partial success instead of failing atomically.
//! Devices without ifXTable are handled by dropping from the 64-bit HC
//! columns to the 32-bit legacy columns, remembered across rounds.

use std::collections::HashMap;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::TargetConfig;
use crate::registry::DiscoveredInterface;
use crate::sample::{CounterWidth, InterfaceHandle, MetricKind, RawSample};
use crate::snmp::{oids, Oid, SnmpClient, SnmpError};

/// Sampler state carried across rounds for one target.
#[derive(Debug)]
pub struct PollPlan {
    width: CounterWidth,
    monitored: Option<Vec<u32>>,
    labels_resolved: bool,
}

impl PollPlan {
    pub fn new(target: &TargetConfig) -> Self {
        Self {
            width: CounterWidth::Bits64,
            monitored: if target.interfaces.is_empty() {
                None
            } else {
                Some(target.interfaces.clone())
            },
            labels_resolved: false,
        }
    }

    pub fn width(&self) -> CounterWidth {
        self.width
    }
}

/// Result of one successful (possibly partial) polling round.
#[derive(Debug)]
pub struct PollRound {
    pub samples: Vec<RawSample>,
    /// Present on the round that completed interface discovery.
    pub discovered: Option<Vec<DiscoveredInterface>>,
    /// Metric columns that failed this round while others succeeded.
    pub failed_metrics: Vec<(MetricKind, SnmpError)>,
}

/// Run one polling round. Errors only when nothing could be sampled at all;
/// per-metric and per-interface failures surface as partial results.
pub async fn poll_round(
    client: &dyn SnmpClient,
    target: &TargetConfig,
    plan: &mut PollPlan,
) -> Result<PollRound, SnmpError> {
    let mut discovered = None;
    if !plan.labels_resolved {
        match discover(client).await {
            Ok(mut found) => {
                if plan.monitored.is_none() {
                    plan.monitored = Some(found.iter().map(|i| i.if_index).collect());
                } else if !target.interfaces.is_empty() {
                    found.retain(|i| target.interfaces.contains(&i.if_index));
                }
                plan.labels_resolved = true;
                discovered = Some(found);
            }
            Err(err) if plan.monitored.is_none() => {
                // Without a configured index list there is nothing to poll
                // until discovery succeeds.
                return Err(err);
            }
            Err(err) => {
                debug!(target_id = %target.id, error = %err, "interface discovery failed, will retry next round");
            }
        }
    }
    let monitored = plan.monitored.clone().unwrap_or_default();

    let mut rows: Vec<(u32, MetricKind, u64, CounterWidth)> = Vec::new();
    let mut failed_metrics = Vec::new();
    for &metric in &target.metrics {
        match fetch_column(client, target, plan, metric, &monitored).await {
            Ok(fetched) => rows.extend(fetched),
            Err(err) => {
                warn!(target_id = %target.id, metric = %metric, error = %err, "counter column fetch failed");
                failed_metrics.push((metric, err));
            }
        }
    }

    if rows.is_empty() {
        if let Some((_, err)) = failed_metrics.pop() {
            return Err(err);
        }
    }

    // Stamp with the poll completion time, not the nominal schedule time, so
    // derived rates reflect the actual elapsed interval.
    let at = Utc::now();
    let mono = Instant::now();
    let samples = rows
        .into_iter()
        .map(|(if_index, metric, value, width)| RawSample {
            handle: InterfaceHandle {
                target: target.id.clone(),
                if_index,
            },
            metric,
            value,
            width,
            at,
            mono,
        })
        .collect();

    Ok(PollRound {
        samples,
        discovered,
        failed_metrics,
    })
}

async fn fetch_column(
    client: &dyn SnmpClient,
    target: &TargetConfig,
    plan: &mut PollPlan,
    metric: MetricKind,
    monitored: &[u32],
) -> Result<Vec<(u32, MetricKind, u64, CounterWidth)>, SnmpError> {
    match fetch_width(client, target, metric, monitored, plan.width).await {
        Ok(rows) => Ok(rows),
        Err(SnmpError::NoSuchObject) if plan.width == CounterWidth::Bits64 => {
            debug!(
                target_id = %target.id,
                metric = %metric,
                "HC counters unsupported, falling back to 32-bit columns"
            );
            plan.width = CounterWidth::Bits32;
            fetch_width(client, target, metric, monitored, plan.width).await
        }
        Err(err) => Err(err),
    }
}

async fn fetch_width(
    client: &dyn SnmpClient,
    target: &TargetConfig,
    metric: MetricKind,
    monitored: &[u32],
    width: CounterWidth,
) -> Result<Vec<(u32, MetricKind, u64, CounterWidth)>, SnmpError> {
    let column = metric.column(width);
    if target.prefer_getbulk {
        match walk_rows(client, &column, metric, monitored, width).await {
            Ok(rows) => return Ok(rows),
            Err(SnmpError::NoSuchObject) => return Err(SnmpError::NoSuchObject),
            Err(err) => {
                debug!(target_id = %target.id, metric = %metric, error = %err, "bulk walk failed, falling back to per-OID gets");
            }
        }
    }
    get_rows(client, &column, metric, monitored, width).await
}

async fn walk_rows(
    client: &dyn SnmpClient,
    column: &Oid,
    metric: MetricKind,
    monitored: &[u32],
    width: CounterWidth,
) -> Result<Vec<(u32, MetricKind, u64, CounterWidth)>, SnmpError> {
    let rows = client.walk(column).await?;
    if rows.is_empty() {
        // Some stacks answer a walk of an absent table with nothing rather
        // than an error.
        return Err(SnmpError::NoSuchObject);
    }
    Ok(rows
        .into_iter()
        .filter(|(idx, _)| monitored.contains(idx))
        .filter_map(|(idx, value)| value.as_unsigned().map(|v| (idx, metric, v, width)))
        .collect())
}

async fn get_rows(
    client: &dyn SnmpClient,
    column: &Oid,
    metric: MetricKind,
    monitored: &[u32],
    width: CounterWidth,
) -> Result<Vec<(u32, MetricKind, u64, CounterWidth)>, SnmpError> {
    let instance_oids: Vec<Oid> = monitored.iter().map(|&i| column.child(i)).collect();
    let results = client.get(&instance_oids).await?;

    let mut rows = Vec::new();
    let mut missing = 0usize;
    let mut first_error = None;
    for (&if_index, result) in monitored.iter().zip(results) {
        match result {
            Ok(value) => {
                if let Some(v) = value.as_unsigned() {
                    rows.push((if_index, metric, v, width));
                }
            }
            Err(SnmpError::NoSuchObject) => missing += 1,
            Err(err) => {
                debug!(if_index, error = %err, "per-interface fetch failed");
                first_error.get_or_insert(err);
            }
        }
    }

    if !rows.is_empty() {
        Ok(rows)
    } else if missing == monitored.len() && !monitored.is_empty() {
        Err(SnmpError::NoSuchObject)
    } else {
        Err(first_error.unwrap_or(SnmpError::NoSuchObject))
    }
}

/// Walk the IF-MIB name columns and build labeled interface entries, the
/// label being `"name (alias)"` when an operator description is set.
/// ifAlias and ifHighSpeed are optional on old stacks; only ifDescr is
/// required.
async fn discover(client: &dyn SnmpClient) -> Result<Vec<DiscoveredInterface>, SnmpError> {
    let names = client.walk(&Oid::new(oids::IF_DESCR)).await?;
    let aliases: HashMap<u32, String> = client
        .walk(&Oid::new(oids::IF_ALIAS))
        .await
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(idx, v)| v.as_text().map(|s| (idx, s.trim().to_string())))
        .collect();
    let speeds: HashMap<u32, u64> = client
        .walk(&Oid::new(oids::IF_HIGH_SPEED))
        .await
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(idx, v)| v.as_unsigned().map(|mbps| (idx, mbps)))
        .collect();

    let mut found: Vec<DiscoveredInterface> = names
        .into_iter()
        .filter_map(|(if_index, value)| {
            let name = value.as_text()?.trim().to_string();
            let label = match aliases.get(&if_index) {
                Some(alias) if !alias.is_empty() => format!("{name} ({alias})"),
                _ => name,
            };
            let capacity_bps = speeds
                .get(&if_index)
                .filter(|&&mbps| mbps > 0)
                .map(|&mbps| mbps * 1_000_000);
            Some(DiscoveredInterface {
                if_index,
                label: Some(label),
                capacity_bps,
            })
        })
        .collect();
    found.sort_by_key(|i| i.if_index);
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::fake::FakeSnmpClient;
    use crate::snmp::SnmpValue;

    fn fake_with_hc_counters() -> FakeSnmpClient {
        let fake = FakeSnmpClient::new();
        fake.set_text(oids::IF_DESCR, 1, "eth0");
        fake.set_text(oids::IF_DESCR, 2, "eth1");
        fake.set_counter(oids::IF_HC_IN_OCTETS, 1, 1000);
        fake.set_counter(oids::IF_HC_IN_OCTETS, 2, 5000);
        fake.set_counter(oids::IF_HC_OUT_OCTETS, 1, 2000);
        fake.set_counter(oids::IF_HC_OUT_OCTETS, 2, 6000);
        fake
    }

    fn in_octets_target(id: &str, interfaces: Vec<u32>) -> TargetConfig {
        let mut cfg = TargetConfig::new(id, "192.0.2.1");
        cfg.interfaces = interfaces;
        cfg.metrics = vec![MetricKind::InOctets];
        cfg
    }

    #[tokio::test]
    async fn bulk_round_samples_monitored_interfaces() {
        let fake = fake_with_hc_counters();
        let target = in_octets_target("r1", vec![1]);
        let mut plan = PollPlan::new(&target);

        let round = poll_round(&fake, &target, &mut plan).await.unwrap();
        assert_eq!(round.samples.len(), 1);
        let sample = &round.samples[0];
        assert_eq!(sample.handle.if_index, 1);
        assert_eq!(sample.value, 1000);
        assert_eq!(sample.width, CounterWidth::Bits64);
        assert!(round.failed_metrics.is_empty());
    }

    #[tokio::test]
    async fn discovery_monitors_everything_when_config_lists_nothing() {
        let fake = fake_with_hc_counters();
        fake.set_text(oids::IF_ALIAS, 1, "uplink to core");
        fake.set_counter(oids::IF_HIGH_SPEED, 1, 10_000); // 10G in Mb/s

        let target = in_octets_target("r1", vec![]);
        let mut plan = PollPlan::new(&target);

        let round = poll_round(&fake, &target, &mut plan).await.unwrap();
        assert_eq!(round.samples.len(), 2, "both discovered interfaces sampled");

        let found = round.discovered.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].label.as_deref(), Some("eth0 (uplink to core)"));
        assert_eq!(found[0].capacity_bps, Some(10_000_000_000));
        assert_eq!(found[1].label.as_deref(), Some("eth1"));
        assert_eq!(found[1].capacity_bps, None);
    }

    #[tokio::test]
    async fn discovery_runs_once() {
        let fake = fake_with_hc_counters();
        let target = in_octets_target("r1", vec![]);
        let mut plan = PollPlan::new(&target);

        let first = poll_round(&fake, &target, &mut plan).await.unwrap();
        assert!(first.discovered.is_some());
        let second = poll_round(&fake, &target, &mut plan).await.unwrap();
        assert!(second.discovered.is_none());
    }

    #[tokio::test]
    async fn hc_fallback_switches_the_plan_to_32_bits() {
        let fake = FakeSnmpClient::new();
        fake.set_text(oids::IF_DESCR, 1, "eth0");
        // No ifXTable at all; only the legacy 32-bit column exists.
        fake.set_counter(oids::IF_IN_OCTETS, 1, 700);

        let target = in_octets_target("r1", vec![1]);
        let mut plan = PollPlan::new(&target);

        let round = poll_round(&fake, &target, &mut plan).await.unwrap();
        assert_eq!(round.samples.len(), 1);
        assert_eq!(round.samples[0].value, 700);
        assert_eq!(round.samples[0].width, CounterWidth::Bits32);
        assert_eq!(plan.width(), CounterWidth::Bits32);
    }

    #[tokio::test]
    async fn per_oid_gets_report_partial_success() {
        let fake = fake_with_hc_counters();
        let mut target = in_octets_target("r1", vec![1, 7]); // 7 does not exist
        target.prefer_getbulk = false;
        let mut plan = PollPlan::new(&target);

        let round = poll_round(&fake, &target, &mut plan).await.unwrap();
        assert_eq!(round.samples.len(), 1, "existing interface still sampled");
        assert_eq!(round.samples[0].handle.if_index, 1);
    }

    #[tokio::test]
    async fn unreachable_device_fails_the_round() {
        let fake = fake_with_hc_counters();
        fake.fail_with(SnmpError::Timeout);

        let target = in_octets_target("r1", vec![1]);
        let mut plan = PollPlan::new(&target);

        let err = poll_round(&fake, &target, &mut plan).await.unwrap_err();
        assert_eq!(err, SnmpError::Timeout);
    }

    #[tokio::test]
    async fn one_bad_column_does_not_sink_the_round() {
        let fake = fake_with_hc_counters();
        let mut target = in_octets_target("r1", vec![1]);
        target.metrics = vec![MetricKind::InOctets, MetricKind::InUcastPkts];
        let mut plan = PollPlan::new(&target);

        // Packet columns are missing entirely: the octet metric still lands,
        // the packet metric is reported failed.
        let round = poll_round(&fake, &target, &mut plan).await.unwrap();
        assert_eq!(round.samples.len(), 1);
        assert_eq!(round.samples[0].metric, MetricKind::InOctets);
        assert_eq!(round.failed_metrics.len(), 1);
        assert_eq!(round.failed_metrics[0].0, MetricKind::InUcastPkts);
    }

    #[tokio::test]
    async fn text_valued_counter_rows_are_skipped() {
        let fake = FakeSnmpClient::new();
        fake.set_text(oids::IF_DESCR, 1, "eth0");
        fake.set_counter(oids::IF_HC_IN_OCTETS, 1, 1000);
        fake.set_row(oids::IF_HC_IN_OCTETS, 2, SnmpValue::Text("garbage".into()));

        let target = in_octets_target("r1", vec![1, 2]);
        let mut plan = PollPlan::new(&target);

        let round = poll_round(&fake, &target, &mut plan).await.unwrap();
        assert_eq!(round.samples.len(), 1);
        assert_eq!(round.samples[0].handle.if_index, 1);
    }
}
