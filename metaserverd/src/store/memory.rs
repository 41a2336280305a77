use std::collections::HashMap;
use std::net::IpAddr;
use chrono::{DateTime, Utc};
use shared::types::{ServerKey, ServerRecord};
use super::{Admission, RecordStore, StoreError};

/// Non-durable backend, for tests and for deployments that accept an empty
/// registry after a restart (servers re-announce within one heartbeat interval).
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<ServerKey, ServerRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn upsert(&mut self, record: &ServerRecord) -> Result<Admission, StoreError> {
        match self.records.get_mut(&record.key()) {
            Some(existing) => {
                existing.description = record.description.clone();
                existing.num_players = record.num_players;
                existing.password_required = record.password_required;
                existing.last_updated = existing.last_updated.max(record.last_updated);
                Ok(Admission::Refreshed)
            }
            None => {
                self.records.insert(record.key(), record.clone());
                Ok(Admission::Created)
            }
        }
    }

    fn set_hostname(&mut self, address: IpAddr, hostname: &str) -> Result<usize, StoreError> {
        let mut updated = 0;
        for record in self.records.values_mut().filter(|r| r.address == address) {
            record.hostname = hostname.to_string();
            updated += 1;
        }
        Ok(updated)
    }

    fn remove(&mut self, key: &ServerKey) -> Result<bool, StoreError> {
        Ok(self.records.remove(key).is_some())
    }

    fn get(&self, key: &ServerKey) -> Result<Option<ServerRecord>, StoreError> {
        Ok(self.records.get(key).cloned())
    }

    fn scan_updated_after(&self, cutoff: DateTime<Utc>) -> Result<Vec<ServerRecord>, StoreError> {
        Ok(self
            .records
            .values()
            .filter(|r| r.last_updated > cutoff)
            .cloned()
            .collect())
    }

    fn purge_not_updated_since(&mut self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, r| r.last_updated > cutoff);
        Ok(before - self.records.len())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}
