//! Per-target health state machine and poll cadence.
//!
//! `Healthy -> Degraded -> Down` on consecutive failures, back to `Healthy`
//! on any success. While Down the poll interval backs off exponentially up
//! to a ceiling; an authentication failure pins the target Down with its own
//! long retry interval, since hammering a device that rejects our
//! credentials cannot help.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::snmp::SnmpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetHealth {
    Healthy,
    Degraded,
    Down,
}

/// Read-only view of a tracker, stored in the registry for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub state: TargetHealth,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_poll_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    /// State before the first poll has completed.
    pub fn initial() -> Self {
        Self {
            state: TargetHealth::Healthy,
            consecutive_failures: 0,
            last_error: None,
            last_poll_at: None,
        }
    }
}

/// Thresholds and intervals driving one target's tracker.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub poll_interval: Duration,
    /// Consecutive failures before Healthy -> Degraded (T1).
    pub degraded_after: u32,
    /// Consecutive failures before Degraded -> Down (T2).
    pub down_after: u32,
    pub backoff_ceiling: Duration,
    pub auth_retry: Duration,
}

#[derive(Debug)]
pub struct HealthTracker {
    cfg: ResilienceConfig,
    state: TargetHealth,
    consecutive_failures: u32,
    backoff: Duration,
    auth_locked: bool,
    last_error: Option<String>,
    last_poll_at: Option<DateTime<Utc>>,
}

impl HealthTracker {
    pub fn new(cfg: ResilienceConfig) -> Self {
        let backoff = cfg.poll_interval;
        Self {
            cfg,
            state: TargetHealth::Healthy,
            consecutive_failures: 0,
            backoff,
            auth_locked: false,
            last_error: None,
            last_poll_at: None,
        }
    }

    pub fn state(&self) -> TargetHealth {
        self.state
    }

    /// A single success from any state restores Healthy and clears the
    /// failure counter and backoff.
    pub fn on_success(&mut self) {
        self.state = TargetHealth::Healthy;
        self.consecutive_failures = 0;
        self.backoff = self.cfg.poll_interval;
        self.auth_locked = false;
        self.last_error = None;
        self.last_poll_at = Some(Utc::now());
    }

    pub fn on_failure(&mut self, error: &SnmpError) {
        self.last_poll_at = Some(Utc::now());
        self.last_error = Some(error.to_string());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if matches!(error, SnmpError::AuthFailure) {
            self.state = TargetHealth::Down;
            self.auth_locked = true;
            return;
        }
        self.auth_locked = false;

        if self.consecutive_failures >= self.cfg.down_after {
            if self.state == TargetHealth::Down {
                self.backoff = (self.backoff * 2).min(self.cfg.backoff_ceiling);
            } else {
                self.state = TargetHealth::Down;
                self.backoff = (self.cfg.poll_interval * 2).min(self.cfg.backoff_ceiling);
            }
        } else if self.consecutive_failures >= self.cfg.degraded_after {
            self.state = TargetHealth::Degraded;
        }
    }

    /// How long to wait before the next poll. Healthy and Degraded targets
    /// keep the configured cadence; Down targets use the current backoff.
    pub fn next_delay(&self) -> Duration {
        if self.auth_locked {
            return self.cfg.auth_retry;
        }
        match self.state {
            TargetHealth::Down => self.backoff,
            _ => self.cfg.poll_interval,
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            last_poll_at: self.last_poll_at,
        }
    }
}
