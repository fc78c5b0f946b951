//! Ifwatch core — SNMP interface polling and rate-derivation engine.
//!
//! The engine periodically fetches raw monotonic interface counters from
//! network devices, converts successive samples into bandwidth rates
//! (handling counter wraparound, resets, missed polls, and variable poll
//! latency), and keeps a bounded in-memory window of derived points per
//! interface for live display.
//!
//! Module map:
//! - [`snmp`] — the adapter boundary: a [`SnmpClient`] trait with an
//!   SNMPv2c/UDP implementation and a scripted fake for tests.
//! - [`sampler`] — one polling round per target: bulk counter fetches with
//!   per-OID fallback and first-round interface discovery.
//! - [`rate`] — counter-delta to rate conversion with explicit modulo
//!   wraparound arithmetic and reset detection.
//! - [`registry`] — the interface registry and per-(interface, metric)
//!   ring-buffered series; the engine's read surface.
//! - [`scheduler`] — task-per-target polling, the bounded session pool,
//!   per-target health/backoff, and the coordinator that owns all writes.
//! - [`config`] — the TOML configuration consumed once at startup.

pub mod config;
pub mod rate;
pub mod registry;
pub mod sample;
pub mod sampler;
pub mod scheduler;
pub mod snmp;

pub use config::{ConfigError, EngineConfig, TargetConfig};
pub use registry::{DiscoveredInterface, InterfaceInfo, Registry, TargetOverview};
pub use sample::{CounterWidth, InterfaceHandle, MetricKind, RatePoint, RawSample};
pub use scheduler::health::{HealthSnapshot, TargetHealth};
pub use scheduler::{connect_clients, Engine};
pub use snmp::{Oid, SnmpClient, SnmpError, SnmpValue};
