//! Liveness and expiry of registered game servers.
//!
//! A record's only liveness signal is `last_updated`. Records that miss
//! heartbeats for longer than the timeout are filtered out of listings but
//! stay in the store until a heartbeat resurrects them, a removal deletes
//! them, or the reaper reclaims the space.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use shared::protocol::has_line_break;
use shared::types::{ServerKey, ServerRecord, ServerStatus};
use crate::clock::Clock;
use crate::config::RegistryConfig;
use crate::resolver::{usable_hostname, HostnameResolver, ResolveError};
use crate::store::{Admission, StoreError};
use crate::store_manager::StoreHandle;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("hostname resolution failed: {0}")]
    ResolutionFailed(#[from] ResolveError),
}

#[derive(Clone)]
pub struct Registry {
    store: StoreHandle,
    resolver: Arc<dyn HostnameResolver>,
    clock: Arc<dyn Clock>,
    config: Arc<RegistryConfig>,
}

impl Registry {
    pub fn new(
        store: StoreHandle,
        resolver: Arc<dyn HostnameResolver>,
        clock: Arc<dyn Clock>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            clock,
            config: Arc::new(config),
        }
    }

    /// Default freshness window
    pub fn timeout(&self) -> Duration {
        seconds(self.config.timeout_secs).unwrap_or(Duration::MAX)
    }

    /// Admit or refresh the server at `(address, port)`.
    ///
    /// On first admission the hostname is the address; a reverse lookup is
    /// dispatched afterwards and never delays or fails the heartbeat.
    pub async fn heartbeat(
        &self,
        address: &str,
        port: &str,
        status: ServerStatus,
    ) -> Result<Admission, RegistryError> {
        let key = parse_key(address, port)?;
        validate_status(&status)?;

        let record = ServerRecord::admit(key, status, self.clock.now());
        let admission = self.store.upsert(record).await?;

        match admission {
            Admission::Created => {
                tracing::info!(server = %key, "Admitted server");
                if self.config.resolve_hostnames {
                    self.spawn_hostname_lookup(key.address);
                }
            }
            Admission::Refreshed => {
                tracing::debug!(server = %key, "Refreshed server");
            }
        }

        Ok(admission)
    }

    /// Delete the server at `(address, port)`. Absence is not an error.
    pub async fn remove(&self, address: &str, port: &str) -> Result<(), RegistryError> {
        let key = parse_key(address, port)?;
        if self.store.remove(key).await? {
            tracing::info!(server = %key, "Removed server");
        } else {
            tracing::debug!(server = %key, "Remove for unknown server");
        }
        Ok(())
    }

    /// Every record with `last_updated + timeout > now`, in no particular order.
    pub async fn list_live(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Vec<ServerRecord>, RegistryError> {
        let cutoff = now.checked_sub_signed(timeout).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(self.store.scan_updated_after(cutoff).await?)
    }

    /// Live records as of the clock's current time, using the configured
    /// timeout unless one is given.
    pub async fn list_current(
        &self,
        timeout_override_secs: Option<u64>,
    ) -> Result<Vec<ServerRecord>, RegistryError> {
        let timeout = match timeout_override_secs {
            Some(secs) => seconds(secs).unwrap_or(Duration::MAX),
            None => self.timeout(),
        };
        self.list_live(self.clock.now(), timeout).await
    }

    /// Delete records that listings already exclude and that are older than
    /// `reap_after_secs`. Returns the number deleted.
    pub async fn reap_stale(&self, reap_after_secs: u64) -> Result<usize, RegistryError> {
        let window = self.timeout().max(seconds(reap_after_secs).unwrap_or(Duration::MAX));
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let count = self.store.purge(cutoff).await?;
        if count > 0 {
            tracing::info!("Reaped {} stale servers", count);
        }
        Ok(count)
    }

    fn spawn_hostname_lookup(&self, address: IpAddr) {
        let resolver = self.resolver.clone();
        let store = self.store.clone();
        let limit = StdDuration::from_secs(self.config.resolve_timeout_secs);

        tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, resolver.reverse(address)).await {
                Ok(Ok(name)) => usable_hostname(&name).ok_or(ResolveError::NoName(address)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ResolveError::Lookup(format!("timed out after {:?}", limit))),
            };

            match result {
                Ok(hostname) => match store.set_hostname(address, hostname.clone()).await {
                    Ok(0) => tracing::debug!(%address, "Server gone before hostname {} arrived", hostname),
                    Ok(_) => tracing::debug!(%address, "Resolved hostname {}", hostname),
                    Err(e) => tracing::warn!(%address, "Failed to store hostname: {}", e),
                },
                Err(e) => {
                    let e = RegistryError::ResolutionFailed(e);
                    tracing::debug!(%address, "{}", e);
                }
            }
        });
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// Parse the identity of a server from its textual address and port.
pub fn parse_key(address: &str, port: &str) -> Result<ServerKey, RegistryError> {
    let address = address
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| RegistryError::InvalidInput(format!("not an IP address: {:?}", address)))?
        .to_canonical();

    let port = match port.trim().parse::<u16>() {
        Ok(port) if port != 0 => port,
        _ => return Err(RegistryError::InvalidInput(format!("invalid port: {:?}", port))),
    };

    Ok(ServerKey::new(address, port))
}

fn validate_status(status: &ServerStatus) -> Result<(), RegistryError> {
    if has_line_break(&status.description) {
        return Err(RegistryError::InvalidInput(
            "description contains control characters".to_string(),
        ));
    }
    Ok(())
}
