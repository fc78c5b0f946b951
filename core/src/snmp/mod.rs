//! The SNMP adapter boundary.
//!
//! The engine depends only on the [`SnmpClient`] contract — fetch a list of
//! OIDs or walk a table column, get typed values or a typed failure back.
//! Protocol version details live behind it: [`client::Snmp2cAdapter`] speaks
//! SNMPv2c over UDP, [`fake::FakeSnmpClient`] is a scripted in-memory agent
//! for tests.

pub mod client;
pub mod fake;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use client::Snmp2cAdapter;

/// Typed failures at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnmpError {
    /// No response within the per-request timeout.
    #[error("request timed out")]
    Timeout,
    /// The device rejected our credentials. Retrying at short intervals
    /// cannot help, so the scheduler treats this distinctly.
    #[error("authentication failed")]
    AuthFailure,
    /// The requested OID does not exist on the device.
    #[error("no such object")]
    NoSuchObject,
    /// The device could not be reached at all.
    #[error("target unreachable: {0}")]
    Unreachable(String),
    /// Any other protocol-level failure.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A decoded SNMP value, reduced to what the engine consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    /// Counter32/Counter64/Gauge32/TimeTicks collapse to an unsigned integer.
    Unsigned(u64),
    /// OCTET STRING values (ifDescr, ifAlias), lossily UTF-8 decoded.
    Text(String),
    /// A type the engine has no use for.
    Other,
}

impl SnmpValue {
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            SnmpValue::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SnmpValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Dotted object identifier, e.g. `1.3.6.1.2.1.2.2.1.10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(String);

impl Oid {
    pub fn new(dotted: impl Into<String>) -> Self {
        Oid(dotted.into())
    }

    /// Append a sub-identifier, turning a table column into an instance OID.
    pub fn child(&self, sub: u32) -> Oid {
        Oid(format!("{}.{sub}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// IF-MIB columns the engine reads.
pub mod oids {
    pub const IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";
    pub const IF_IN_OCTETS: &str = "1.3.6.1.2.1.2.2.1.10";
    pub const IF_IN_UCAST_PKTS: &str = "1.3.6.1.2.1.2.2.1.11";
    pub const IF_OUT_OCTETS: &str = "1.3.6.1.2.1.2.2.1.16";
    pub const IF_OUT_UCAST_PKTS: &str = "1.3.6.1.2.1.2.2.1.17";

    pub const IF_HC_IN_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.6";
    pub const IF_HC_IN_UCAST_PKTS: &str = "1.3.6.1.2.1.31.1.1.1.7";
    pub const IF_HC_OUT_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.10";
    pub const IF_HC_OUT_UCAST_PKTS: &str = "1.3.6.1.2.1.31.1.1.1.11";
    /// Nominal interface capacity in Mb/s.
    pub const IF_HIGH_SPEED: &str = "1.3.6.1.2.1.31.1.1.1.15";
    pub const IF_ALIAS: &str = "1.3.6.1.2.1.31.1.1.1.18";
}

/// The capability the engine consumes. One implementation per transport.
#[async_trait]
pub trait SnmpClient: Send + Sync {
    /// One GET round over an explicit OID list. Each binding carries its own
    /// result so a single missing object does not discard the rest of the
    /// round; the outer error is for transport-level failures only.
    async fn get(&self, oids: &[Oid]) -> Result<Vec<Result<SnmpValue, SnmpError>>, SnmpError>;

    /// Bulk walk of one table column. Rows come back keyed by the instance
    /// sub-identifier (the ifIndex for IF-MIB columns).
    async fn walk(&self, column: &Oid) -> Result<Vec<(u32, SnmpValue)>, SnmpError>;
}
