use std::time::Duration;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use crate::config::StoreConfig;
use crate::registry::Registry;

/// Periodically delete records that listings already exclude.
///
/// Only bounds storage growth; listings are correct without it.
pub async fn run(
    registry: Registry,
    config: StoreConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(config.reap_interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = registry.reap_stale(config.reap_after_secs).await {
                    tracing::error!("Failed to reap stale servers: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Reaper shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use chrono::{DateTime, Duration as ChronoDuration};
    use shared::types::ServerStatus;
    use crate::clock::ManualClock;
    use crate::config::RegistryConfig;
    use crate::resolver::NoopResolver;
    use crate::store::memory::MemoryStore;
    use crate::store_manager::StoreHandle;

    #[tokio::test]
    async fn test_reaper_purges_and_stops_on_cancel() {
        let store = StoreHandle::spawn(Box::new(MemoryStore::new()));
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()));
        let registry = Registry::new(
            store.clone(),
            Arc::new(NoopResolver),
            clock.clone(),
            RegistryConfig {
                timeout_secs: 60,
                resolve_hostnames: false,
                resolve_timeout_secs: 1,
            },
        );

        registry.heartbeat("10.0.0.5", "7777", ServerStatus::default()).await.unwrap();
        clock.advance(ChronoDuration::seconds(120));

        let config = StoreConfig {
            reap_interval_secs: 1,
            reap_after_secs: 60,
            ..StoreConfig::default()
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(registry, config, cancel.clone()));

        // The first tick fires immediately
        for _ in 0..100 {
            if store.len().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(store.len().await.unwrap(), 0);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
