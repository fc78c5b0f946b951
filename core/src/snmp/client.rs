//! SNMPv2c transport backed by the `csnmp` async client.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use csnmp::{ObjectIdentifier, ObjectValue, Snmp2cClient};
use tokio::net::lookup_host;

use super::{Oid, SnmpClient, SnmpError, SnmpValue};

/// How many repetitions to request per GETBULK PDU when walking a column.
const BULK_REPETITIONS: u32 = 50;

/// A UDP SNMPv2c session with one device.
pub struct Snmp2cAdapter {
    inner: Snmp2cClient,
    timeout: Duration,
}

impl Snmp2cAdapter {
    /// Open a session. `host` is `addr` or `addr:port`; the SNMP default
    /// port 161 is appended when none is given.
    pub async fn connect(host: &str, community: &str, timeout: Duration) -> Result<Self, SnmpError> {
        let addr = resolve(host).await?;
        let inner = Snmp2cClient::new(
            addr,
            community.as_bytes().to_vec(),
            None,
            Some(timeout),
        )
        .await
        .map_err(|e| SnmpError::Unreachable(e.to_string()))?;

        Ok(Self { inner, timeout })
    }
}

async fn resolve(host: &str) -> Result<SocketAddr, SnmpError> {
    let authority = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:161")
    };

    let addr = lookup_host(&authority)
        .await
        .map_err(|e| SnmpError::Unreachable(e.to_string()))?
        .next()
        .ok_or_else(|| SnmpError::Unreachable(format!("no address for {authority}")));
    addr
}

fn parse_oid(oid: &Oid) -> Result<ObjectIdentifier, SnmpError> {
    oid.as_str()
        .parse()
        .map_err(|_| SnmpError::Protocol(format!("invalid OID {oid}")))
}

fn convert(value: ObjectValue) -> SnmpValue {
    match value {
        ObjectValue::Counter32(v) | ObjectValue::Unsigned32(v) | ObjectValue::TimeTicks(v) => {
            SnmpValue::Unsigned(u64::from(v))
        }
        ObjectValue::Counter64(v) => SnmpValue::Unsigned(v),
        ObjectValue::Integer(v) if v >= 0 => SnmpValue::Unsigned(v as u64),
        ObjectValue::String(bytes) => SnmpValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
        _ => SnmpValue::Other,
    }
}

/// Best-effort mapping of csnmp failures onto the adapter taxonomy. A v2c
/// community mismatch produces no response at all, so it surfaces as
/// [`SnmpError::Timeout`] rather than `AuthFailure`.
fn classify(err: csnmp::SnmpClientError) -> SnmpError {
    let text = err.to_string();
    if text.contains("NoSuchObject") || text.contains("NoSuchInstance") || text.contains("EndOfMibView")
    {
        SnmpError::NoSuchObject
    } else {
        SnmpError::Protocol(text)
    }
}

#[async_trait]
impl SnmpClient for Snmp2cAdapter {
    async fn get(&self, oids: &[Oid]) -> Result<Vec<Result<SnmpValue, SnmpError>>, SnmpError> {
        // One GET per binding; multi-varbind batching is the walk path's job.
        let mut out = Vec::with_capacity(oids.len());
        for oid in oids {
            let parsed = parse_oid(oid)?;
            let fetched = tokio::time::timeout(self.timeout, self.inner.get(parsed)).await;
            out.push(match fetched {
                Ok(Ok(value)) => Ok(convert(value)),
                Ok(Err(e)) => Err(classify(e)),
                Err(_) => Err(SnmpError::Timeout),
            });
        }
        Ok(out)
    }

    async fn walk(&self, column: &Oid) -> Result<Vec<(u32, SnmpValue)>, SnmpError> {
        let parsed = parse_oid(column)?;
        let fetched = tokio::time::timeout(
            self.timeout,
            self.inner.walk_bulk(parsed, 0, BULK_REPETITIONS),
        )
        .await;

        let rows = match fetched {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return Err(classify(e)),
            Err(_) => return Err(SnmpError::Timeout),
        };

        let mut out = Vec::with_capacity(rows.len());
        for (oid, value) in rows {
            let Some(&index) = oid.as_slice().last() else {
                continue;
            };
            out.push((index, convert(value)));
        }
        Ok(out)
    }
}
