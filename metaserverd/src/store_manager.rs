use std::net::IpAddr;
use std::thread;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use shared::types::{ServerKey, ServerRecord};
use crate::store::{Admission, RecordStore, StoreError};

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

/// Commands sent to the store thread
pub enum StoreCommand {
    Upsert(ServerRecord, Reply<Admission>),
    SetHostname(IpAddr, String, Reply<usize>),
    Remove(ServerKey, Reply<bool>),
    Get(ServerKey, Reply<Option<ServerRecord>>),
    ScanUpdatedAfter(DateTime<Utc>, Reply<Vec<ServerRecord>>),
    Purge(DateTime<Utc>, Reply<usize>),
    Len(Reply<usize>),
    Shutdown,
}

/// Handle to the store thread.
///
/// The thread owns the backend and runs one command at a time, which makes
/// it the single point of mutual exclusion for every record.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn a new store thread owning the given backend
    pub fn spawn(mut store: Box<dyn RecordStore>) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::Upsert(record, reply) => {
                        let _ = reply.send(store.upsert(&record));
                    }
                    StoreCommand::SetHostname(address, hostname, reply) => {
                        let _ = reply.send(store.set_hostname(address, &hostname));
                    }
                    StoreCommand::Remove(key, reply) => {
                        let _ = reply.send(store.remove(&key));
                    }
                    StoreCommand::Get(key, reply) => {
                        let _ = reply.send(store.get(&key));
                    }
                    StoreCommand::ScanUpdatedAfter(cutoff, reply) => {
                        let _ = reply.send(store.scan_updated_after(cutoff));
                    }
                    StoreCommand::Purge(cutoff, reply) => {
                        let _ = reply.send(store.purge_not_updated_since(cutoff));
                    }
                    StoreCommand::Len(reply) => {
                        let _ = reply.send(store.len());
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> StoreCommand) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| StoreError::Unavailable("store thread has stopped".to_string()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("store thread dropped the request".to_string()))?
    }

    /// Insert or refresh a record
    pub async fn upsert(&self, record: ServerRecord) -> Result<Admission, StoreError> {
        self.request(|reply| StoreCommand::Upsert(record, reply)).await
    }

    /// Set the hostname of every existing record from `address`
    pub async fn set_hostname(&self, address: IpAddr, hostname: String) -> Result<usize, StoreError> {
        self.request(|reply| StoreCommand::SetHostname(address, hostname, reply)).await
    }

    /// Delete a record. Returns whether it existed.
    pub async fn remove(&self, key: ServerKey) -> Result<bool, StoreError> {
        self.request(|reply| StoreCommand::Remove(key, reply)).await
    }

    pub async fn get(&self, key: ServerKey) -> Result<Option<ServerRecord>, StoreError> {
        self.request(|reply| StoreCommand::Get(key, reply)).await
    }

    /// Records updated strictly after `cutoff`
    pub async fn scan_updated_after(&self, cutoff: DateTime<Utc>) -> Result<Vec<ServerRecord>, StoreError> {
        self.request(|reply| StoreCommand::ScanUpdatedAfter(cutoff, reply)).await
    }

    /// Delete records not updated since `cutoff`
    pub async fn purge(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.request(|reply| StoreCommand::Purge(cutoff, reply)).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.request(StoreCommand::Len).await
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.tx
            .send(StoreCommand::Shutdown)
            .await
            .map_err(|_| StoreError::Unavailable("store thread has stopped".to_string()))
    }
}
