//! Scripted in-memory SNMP agent used by tests.
//!
//! Tables are plain column maps the test mutates between polls; a single
//! failure switch makes every subsequent request fail with a chosen error
//! until [`FakeSnmpClient::recover`] is called.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Oid, SnmpClient, SnmpError, SnmpValue};

#[derive(Default)]
pub struct FakeSnmpClient {
    columns: Mutex<HashMap<String, BTreeMap<u32, SnmpValue>>>,
    fail_with: Mutex<Option<SnmpError>>,
    calls: AtomicUsize,
}

impl FakeSnmpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_row(&self, column: &str, index: u32, value: SnmpValue) {
        self.columns
            .lock()
            .unwrap()
            .entry(column.to_string())
            .or_default()
            .insert(index, value);
    }

    pub fn set_counter(&self, column: &str, index: u32, value: u64) {
        self.set_row(column, index, SnmpValue::Unsigned(value));
    }

    pub fn set_text(&self, column: &str, index: u32, text: &str) {
        self.set_row(column, index, SnmpValue::Text(text.to_string()));
    }

    pub fn remove_column(&self, column: &str) {
        self.columns.lock().unwrap().remove(column);
    }

    /// Fail every subsequent request with `error`.
    pub fn fail_with(&self, error: SnmpError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }

    /// Stop failing; requests resolve against the column tables again.
    pub fn recover(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    /// Total number of get/walk requests seen.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn check_failure(&self) -> Result<(), SnmpError> {
        match &*self.fail_with.lock().unwrap() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn lookup(&self, oid: &str) -> Option<SnmpValue> {
        let (column, index) = oid.rsplit_once('.')?;
        let index: u32 = index.parse().ok()?;
        self.columns.lock().unwrap().get(column)?.get(&index).cloned()
    }
}

#[async_trait]
impl SnmpClient for FakeSnmpClient {
    async fn get(&self, oids: &[Oid]) -> Result<Vec<Result<SnmpValue, SnmpError>>, SnmpError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.check_failure()?;
        Ok(oids
            .iter()
            .map(|oid| self.lookup(oid.as_str()).ok_or(SnmpError::NoSuchObject))
            .collect())
    }

    async fn walk(&self, column: &Oid) -> Result<Vec<(u32, SnmpValue)>, SnmpError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.check_failure()?;
        let columns = self.columns.lock().unwrap();
        match columns.get(column.as_str()) {
            Some(rows) if !rows.is_empty() => {
                Ok(rows.iter().map(|(i, v)| (*i, v.clone())).collect())
            }
            // An absent column models a device without that part of the MIB.
            _ => Err(SnmpError::NoSuchObject),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::oids;

    #[tokio::test]
    async fn scripted_rows_resolve_by_oid() {
        let fake = FakeSnmpClient::new();
        fake.set_counter(oids::IF_HC_IN_OCTETS, 1, 1000);
        fake.set_text(oids::IF_DESCR, 1, "eth0");

        let column = Oid::new(oids::IF_HC_IN_OCTETS);
        let results = fake.get(&[column.child(1), column.child(2)]).await.unwrap();
        assert_eq!(results[0], Ok(SnmpValue::Unsigned(1000)));
        assert_eq!(results[1], Err(SnmpError::NoSuchObject));

        let rows = fake.walk(&Oid::new(oids::IF_DESCR)).await.unwrap();
        assert_eq!(rows, vec![(1, SnmpValue::Text("eth0".into()))]);
    }

    #[tokio::test]
    async fn failure_switch_applies_until_recover() {
        let fake = FakeSnmpClient::new();
        fake.set_counter(oids::IF_HC_IN_OCTETS, 1, 1000);
        fake.fail_with(SnmpError::Timeout);

        let column = Oid::new(oids::IF_HC_IN_OCTETS);
        assert_eq!(fake.walk(&column).await, Err(SnmpError::Timeout));
        assert_eq!(fake.get(&[column.child(1)]).await.unwrap_err(), SnmpError::Timeout);

        fake.recover();
        assert!(fake.walk(&column).await.is_ok());
        assert_eq!(fake.calls(), 3);
    }
}
