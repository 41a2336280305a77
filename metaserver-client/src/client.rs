use std::time::Duration;
use thiserror::Error;
use shared::listing::{parse_listing, ListedServer};
use shared::protocol::{
    sanitize_field, FIELD_DESCRIPTION, FIELD_NUM_PLAYERS, FIELD_PASSWORD_REQUIRED, FIELD_PORT,
    HEARTBEAT_PATH, LISTING_PATH, QUERY_TIMEOUT_SECONDS, REMOVE_PATH,
};
use shared::types::ServerStatus;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metaserver answered {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Clone)]
pub struct MetaserverClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetaserverClient {
    /// `base_url` is the scheme and authority of the metaserver, e.g.
    /// `http://metaserver.example.org:8080`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("metaserver-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Announce (or re-announce) the game server listening on `port`.
    pub async fn heartbeat(&self, port: u16, status: &ServerStatus) -> Result<(), ClientError> {
        let form = [
            (FIELD_PORT, port.to_string()),
            (FIELD_DESCRIPTION, sanitize_field(&status.description)),
            (FIELD_NUM_PLAYERS, status.num_players.to_string()),
            (FIELD_PASSWORD_REQUIRED, if status.password_required { "1" } else { "0" }.to_string()),
        ];

        let response = self.http.post(self.url(HEARTBEAT_PATH)).form(&form).send().await?;
        check_status(response.status())
    }

    /// Withdraw the game server listening on `port`.
    pub async fn remove(&self, port: u16) -> Result<(), ClientError> {
        let form = [(FIELD_PORT, port.to_string())];
        let response = self.http.post(self.url(REMOVE_PATH)).form(&form).send().await?;
        check_status(response.status())
    }

    /// Fetch the live servers, optionally with a custom freshness window.
    pub async fn list_servers(
        &self,
        timeout_override_secs: Option<u64>,
    ) -> Result<Vec<ListedServer>, ClientError> {
        let mut request = self.http.get(self.url(LISTING_PATH));
        if let Some(secs) = timeout_override_secs {
            request = request.query(&[(QUERY_TIMEOUT_SECONDS, secs)]);
        }

        let response = request.send().await?;
        check_status(response.status())?;
        let body = response.text().await?;
        Ok(parse_listing(&body))
    }
}

fn check_status(status: reqwest::StatusCode) -> Result<(), ClientError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ClientError::Status(status))
    }
}
