//! Keeps a game server listed for as long as it runs.
//!
//! One report goes out at start, then another every `long_interval` or as
//! soon as the player count changes. After a failed report the next attempt
//! comes sooner (`short_interval` times the number of failures, for up to
//! three failures). On cancellation the server is withdrawn.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use shared::protocol::HEARTBEAT_INTERVAL_SECS;
use shared::types::ServerStatus;
use crate::client::MetaserverClient;

const MAX_SHORT_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct AnnouncerConfig {
    /// Port the game server accepts players on
    pub port: u16,
    pub description: String,
    pub password_required: bool,
    pub long_interval: Duration,
    pub short_interval: Duration,
    /// How often the player count is checked for changes
    pub poll_interval: Duration,
}

impl AnnouncerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            description: String::new(),
            password_required: false,
            long_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            short_interval: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Delay before the next periodic report, given consecutive failures
    pub fn report_interval(&self, failures: u32) -> Duration {
        if (1..=MAX_SHORT_RETRIES).contains(&failures) {
            self.short_interval * failures
        } else {
            self.long_interval
        }
    }
}

pub struct Announcer {
    client: MetaserverClient,
    config: AnnouncerConfig,
}

impl Announcer {
    pub fn new(client: MetaserverClient, config: AnnouncerConfig) -> Self {
        Self { client, config }
    }

    /// Report until `cancel` fires, then withdraw the server.
    pub async fn run(self, players: watch::Receiver<u32>, cancel: CancellationToken) {
        let mut reported = *players.borrow();
        let mut failures = if self.report(reported).await { 0 } else { 1 };
        let mut last_report = Instant::now();

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let current = *players.borrow();
                    let due = last_report.elapsed() >= self.config.report_interval(failures);

                    if due || current != reported {
                        failures = if self.report(current).await { 0 } else { failures.saturating_add(1) };
                        reported = current;
                        last_report = Instant::now();
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }

        tracing::info!(port = self.config.port, "Removing from metaserver");
        match self.client.remove(self.config.port).await {
            Ok(()) => tracing::info!("Remove from metaserver succeeded"),
            Err(e) => tracing::warn!("Remove from metaserver failed: {}", e),
        }
    }

    async fn report(&self, num_players: u32) -> bool {
        let status = ServerStatus {
            description: self.config.description.clone(),
            num_players,
            password_required: self.config.password_required,
        };

        tracing::debug!(port = self.config.port, num_players, "Sending update to metaserver");
        match self.client.heartbeat(self.config.port, &status).await {
            Ok(()) => {
                tracing::debug!("Metaserver update succeeded");
                true
            }
            Err(e) => {
                tracing::warn!("Metaserver update failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_interval_backs_off_then_resets() {
        let config = AnnouncerConfig::new(16399);

        assert_eq!(config.report_interval(0), Duration::from_secs(600));
        assert_eq!(config.report_interval(1), Duration::from_secs(60));
        assert_eq!(config.report_interval(2), Duration::from_secs(120));
        assert_eq!(config.report_interval(3), Duration::from_secs(180));
        assert_eq!(config.report_interval(4), Duration::from_secs(600));
    }
}
