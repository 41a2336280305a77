pub mod memory;
pub mod sqlite;

use std::net::IpAddr;
use chrono::{DateTime, Utc};
use thiserror::Error;
use shared::types::{ServerKey, ServerRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The key was absent and a new record was inserted
    Created,
    /// An existing record was overwritten in place
    Refreshed,
}

/// Durable keyed storage for server records.
///
/// Every method is atomic with respect to every other. Implementations are
/// owned by a single store thread (see `store_manager`), so they need to be
/// `Send` but not `Sync`.
pub trait RecordStore: Send {
    /// Insert the record, or overwrite description, player count, password
    /// flag and timestamp of the existing one. An existing hostname is kept,
    /// and `last_updated` never moves backwards.
    fn upsert(&mut self, record: &ServerRecord) -> Result<Admission, StoreError>;

    /// Set the hostname on every existing record with this address. Never
    /// inserts. Returns the number of records updated.
    fn set_hostname(&mut self, address: IpAddr, hostname: &str) -> Result<usize, StoreError>;

    /// Delete the record at `key`. Returns whether it existed.
    fn remove(&mut self, key: &ServerKey) -> Result<bool, StoreError>;

    fn get(&self, key: &ServerKey) -> Result<Option<ServerRecord>, StoreError>;

    /// All records with `last_updated` strictly after `cutoff`
    fn scan_updated_after(&self, cutoff: DateTime<Utc>) -> Result<Vec<ServerRecord>, StoreError>;

    /// Delete records with `last_updated` at or before `cutoff`. Returns the
    /// number deleted.
    fn purge_not_updated_since(&mut self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;
}
