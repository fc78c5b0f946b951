//! Poll scheduling: one task per target, a bounded session pool, and a
//! coordinator that owns all registry writes.
//!
//! Each target polls, tracks its own health, and messages completed rounds
//! over a channel; the coordinator derives rates and records them. One
//! target's failures never block another's cadence, and no shared scan
//! state exists between targets.

pub mod health;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, TargetConfig};
use crate::registry::Registry;
use crate::sample::InterfaceHandle;
use crate::sampler::{self, PollPlan, PollRound};
use crate::snmp::{Snmp2cAdapter, SnmpClient, SnmpError};
use health::{HealthSnapshot, HealthTracker};

/// One message from a target task to the coordinator.
enum PollEvent {
    Round {
        target: String,
        round: PollRound,
        health: HealthSnapshot,
    },
    Failed {
        target: String,
        error: SnmpError,
        health: HealthSnapshot,
    },
}

/// The running engine. Dropping it does not stop polling; call
/// [`Engine::shutdown`] for an orderly stop.
pub struct Engine {
    registry: Arc<Registry>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    coordinator: JoinHandle<()>,
}

impl Engine {
    /// Spawn the coordinator and one polling task per target. `clients`
    /// pairs each target with its SNMP transport — built by the caller so
    /// tests can inject fakes (see [`connect_clients`] for production use).
    pub fn start(config: &EngineConfig, clients: Vec<(TargetConfig, Arc<dyn SnmpClient>)>) -> Engine {
        let registry = Arc::new(Registry::new());
        let (tx, rx) = mpsc::channel(64);
        let coordinator = tokio::spawn(run_coordinator(registry.clone(), rx));
        let permits = Arc::new(Semaphore::new(config.max_concurrent_polls.max(1)));

        let mut tasks = HashMap::new();
        for (target, client) in clients {
            registry.register_target(&target);
            // Statically configured interfaces are visible before the first
            // poll, so "no data yet" is distinguishable from "unknown".
            for &if_index in &target.interfaces {
                registry.register_interface(
                    InterfaceHandle {
                        target: target.id.clone(),
                        if_index,
                    },
                    None,
                    None,
                );
            }

            let id = target.id.clone();
            info!(target_id = %id, host = %target.host, interval = target.poll_interval_secs, "polling started");
            let handle = tokio::spawn(run_target(target, client, tx.clone(), permits.clone()));
            tasks.insert(id, handle);
        }

        Engine {
            registry,
            tasks: Mutex::new(tasks),
            coordinator,
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Stop polling one target and drop its registry entries. An in-flight
    /// request is bounded by the per-request timeout; other targets are
    /// untouched.
    pub async fn stop_target(&self, id: &str) {
        if let Some(handle) = self.tasks.lock().await.remove(id) {
            handle.abort();
            self.registry.deregister_target(id);
            info!(target_id = %id, "polling stopped");
        }
    }

    /// Abort every polling task and the coordinator.
    pub async fn shutdown(self) {
        for (_, handle) in self.tasks.lock().await.drain() {
            handle.abort();
        }
        self.coordinator.abort();
    }
}

/// Build a production SNMPv2c transport for every configured target.
pub async fn connect_clients(
    config: &EngineConfig,
) -> Result<Vec<(TargetConfig, Arc<dyn SnmpClient>)>> {
    let mut clients: Vec<(TargetConfig, Arc<dyn SnmpClient>)> = Vec::new();
    for target in &config.targets {
        let adapter =
            Snmp2cAdapter::connect(&target.host, &target.community, target.request_timeout())
                .await
                .with_context(|| format!("target `{}`: SNMP transport setup failed", target.id))?;
        clients.push((target.clone(), Arc::new(adapter)));
    }
    Ok(clients)
}

async fn run_target(
    target: TargetConfig,
    client: Arc<dyn SnmpClient>,
    tx: mpsc::Sender<PollEvent>,
    permits: Arc<Semaphore>,
) {
    let mut tracker = HealthTracker::new(target.resilience());
    let mut plan = PollPlan::new(&target);

    loop {
        let outcome = {
            // Bound concurrent SNMP sessions across all targets.
            let Ok(_permit) = permits.acquire().await else {
                return;
            };
            sampler::poll_round(client.as_ref(), &target, &mut plan).await
        };

        let previous = tracker.state();
        let event = match outcome {
            Ok(round) => {
                tracker.on_success();
                PollEvent::Round {
                    target: target.id.clone(),
                    round,
                    health: tracker.snapshot(),
                }
            }
            Err(error) => {
                tracker.on_failure(&error);
                warn!(target_id = %target.id, error = %error, failures = tracker.snapshot().consecutive_failures, "poll failed");
                PollEvent::Failed {
                    target: target.id.clone(),
                    error,
                    health: tracker.snapshot(),
                }
            }
        };
        if tracker.state() != previous {
            info!(target_id = %target.id, from = ?previous, to = ?tracker.state(), "health transition");
        }

        // Coordinator gone means the engine is shutting down.
        if tx.send(event).await.is_err() {
            return;
        }

        tokio::time::sleep(tracker.next_delay()).await;
    }
}

async fn run_coordinator(registry: Arc<Registry>, mut rx: mpsc::Receiver<PollEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            PollEvent::Round {
                target,
                round,
                health,
            } => {
                if let Some(found) = round.discovered {
                    registry.apply_discovery(&target, &found);
                }
                for (metric, error) in &round.failed_metrics {
                    debug!(target_id = %target, metric = %metric, error = %error, "metric column missing from round");
                }
                registry.ingest(&target, round.samples);
                registry.set_health(&target, health);
            }
            PollEvent::Failed {
                target,
                error,
                health,
            } => {
                // A failed poll records nothing: no phantom zero-rate points.
                debug!(target_id = %target, error = %error, "poll failure recorded");
                registry.set_health(&target, health);
            }
        }
    }
}
