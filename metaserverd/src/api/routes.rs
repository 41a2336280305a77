use std::net::SocketAddr;
use axum::{
    extract::{ConnectInfo, Form, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use shared::listing::render_listing;
use shared::protocol::{sanitize_field, HEARTBEAT_PATH, LISTING_PATH, REMOVE_PATH};
use shared::types::ServerStatus;
use crate::registry::{Registry, RegistryError};

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    /// Prefer X-Forwarded-For over the peer address
    pub trust_forwarded_for: bool,
}

/// Fields posted by an announcing game server. Everything arrives as text
/// and is validated here or in the registry.
#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatForm {
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub num_players: String,
    #[serde(default)]
    pub password_required: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveForm {
    #[serde(default)]
    pub port: String,
}

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub timeout_seconds: Option<u64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEARTBEAT_PATH, post(heartbeat))
        .route(REMOVE_PATH, post(remove))
        .route(LISTING_PATH, get(list_servers))
        .with_state(state)
}

async fn heartbeat(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(form): Form<HeartbeatForm>,
) -> StatusCode {
    let address = client_address(&headers, peer, state.trust_forwarded_for);

    let status = match parse_status(&form) {
        Ok(status) => status,
        Err(e) => return error_status(&address, e),
    };

    match state.registry.heartbeat(&address, &form.port, status).await {
        Ok(_) => StatusCode::OK,
        Err(e) => error_status(&address, e),
    }
}

async fn remove(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(form): Form<RemoveForm>,
) -> StatusCode {
    let address = client_address(&headers, peer, state.trust_forwarded_for);

    match state.registry.remove(&address, &form.port).await {
        Ok(()) => StatusCode::OK,
        Err(e) => error_status(&address, e),
    }
}

async fn list_servers(
    State(state): State<AppState>,
    Query(params): Query<ListingQuery>,
) -> Result<([(header::HeaderName, &'static str); 1], String), StatusCode> {
    let records = state
        .registry
        .list_current(params.timeout_seconds)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list servers: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        render_listing(&records),
    ))
}

/// The announcing server's address: the first X-Forwarded-For hop when
/// trusted and present, otherwise the peer of the connection.
pub fn client_address(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(address) = forwarded {
            return address.to_string();
        }
    }
    peer.ip().to_string()
}

fn parse_status(form: &HeartbeatForm) -> Result<ServerStatus, RegistryError> {
    // Announcing servers clamp negative player counts to zero; do the same
    let num_players = match form.num_players.trim() {
        "" => 0,
        raw => raw
            .parse::<i64>()
            .map(|n| n.clamp(0, u32::MAX as i64) as u32)
            .map_err(|_| RegistryError::InvalidInput(format!("invalid num_players: {:?}", raw)))?,
    };

    let password_required = match form.password_required.trim() {
        "" | "false" => false,
        "true" => true,
        raw => raw
            .parse::<i64>()
            .map(|n| n != 0)
            .map_err(|_| RegistryError::InvalidInput(format!("invalid password_required: {:?}", raw)))?,
    };

    Ok(ServerStatus {
        description: sanitize_field(&form.description),
        num_players,
        password_required,
    })
}

fn error_status(address: &str, e: RegistryError) -> StatusCode {
    match e {
        RegistryError::InvalidInput(reason) => {
            tracing::debug!(%address, "Rejected request: {}", reason);
            StatusCode::BAD_REQUEST
        }
        RegistryError::StoreUnavailable(e) => {
            tracing::error!(%address, "Store unavailable: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
        RegistryError::ResolutionFailed(e) => {
            tracing::error!(%address, "Unexpected resolution failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use std::sync::Arc;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use chrono::{DateTime, Duration};
    use tower::ServiceExt;
    use shared::listing::parse_listing;
    use shared::types::ServerKey;
    use crate::clock::ManualClock;
    use crate::config::RegistryConfig;
    use crate::resolver::NoopResolver;
    use crate::store::memory::MemoryStore;
    use crate::store_manager::StoreHandle;

    const PEER: ([u8; 4], u16) = ([10, 0, 0, 5], 40000);

    struct Fixture {
        app: Router,
        store: StoreHandle,
        clock: Arc<ManualClock>,
    }

    fn fixture(trust_forwarded_for: bool) -> Fixture {
        let store = StoreHandle::spawn(Box::new(MemoryStore::new()));
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()));
        let registry = Registry::new(
            store.clone(),
            Arc::new(NoopResolver),
            clock.clone(),
            RegistryConfig {
                timeout_secs: 1200,
                resolve_hostnames: false,
                resolve_timeout_secs: 1,
            },
        );
        let app = router(AppState { registry, trust_forwarded_for })
            .layer(MockConnectInfo(SocketAddr::from(PEER)));
        Fixture { app, store, clock }
    }

    fn form_post(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn listing(app: &Router, uri: &str) -> String {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    fn key(address: &str, port: u16) -> ServerKey {
        ServerKey::new(address.parse::<IpAddr>().unwrap(), port)
    }

    #[tokio::test]
    async fn test_heartbeat_then_listing() {
        let f = fixture(true);

        let (status, body) = send(
            &f.app,
            form_post(HEARTBEAT_PATH, "port=7777&description=Arena&num_players=3&password_required=0"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());

        let body = listing(&f.app, LISTING_PATH).await;
        assert_eq!(
            body,
            "[SERVER]\nip_address=10.0.0.5\nhostname=10.0.0.5\nport=7777\ndescription=Arena\nnum_players=3\n"
        );
    }

    #[tokio::test]
    async fn test_forwarded_for_preferred() {
        let f = fixture(true);
        let request = Request::builder()
            .method("POST")
            .uri(HEARTBEAT_PATH)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-forwarded-for", "203.0.113.7, 10.1.1.1")
            .body(Body::from("port=7777"))
            .unwrap();

        let (status, _) = send(&f.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(f.store.get(key("203.0.113.7", 7777)).await.unwrap().is_some());
        assert!(f.store.get(key("10.0.0.5", 7777)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_forwarded_for_ignored_when_untrusted() {
        let f = fixture(false);
        let request = Request::builder()
            .method("POST")
            .uri(HEARTBEAT_PATH)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from("port=7777"))
            .unwrap();

        send(&f.app, request).await;
        assert!(f.store.get(key("10.0.0.5", 7777)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_newlines_are_sanitized() {
        let f = fixture(true);
        let (status, _) = send(
            &f.app,
            form_post(HEARTBEAT_PATH, "port=7777&description=Arena%0A%5BSERVER%5D%0Aport%3D1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let servers = parse_listing(&listing(&f.app, LISTING_PATH).await);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].description, "Arena [SERVER] port=1");
        assert_eq!(servers[0].port, 7777);
    }

    #[tokio::test]
    async fn test_invalid_fields_rejected() {
        let f = fixture(true);
        for body in [
            "description=no+port",
            "port=70000",
            "port=7777&num_players=many",
            "port=7777&password_required=maybe",
        ] {
            let (status, _) = send(&f.app, form_post(HEARTBEAT_PATH, body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        }
        assert_eq!(f.store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lenient_numeric_fields() {
        let f = fixture(true);
        let (status, _) = send(
            &f.app,
            form_post(HEARTBEAT_PATH, "port=7777&num_players=-4&password_required=true"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let stored = f.store.get(key("10.0.0.5", 7777)).await.unwrap().unwrap();
        assert_eq!(stored.num_players, 0);
        assert!(stored.password_required);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let f = fixture(true);
        send(&f.app, form_post(HEARTBEAT_PATH, "port=7777")).await;

        let (status, _) = send(&f.app, form_post(REMOVE_PATH, "port=7777")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&f.app, form_post(REMOVE_PATH, "port=7777")).await;
        assert_eq!(status, StatusCode::OK);

        assert!(listing(&f.app, LISTING_PATH).await.is_empty());

        let (status, _) = send(&f.app, form_post(REMOVE_PATH, "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_listing_timeout_override() {
        let f = fixture(true);
        send(&f.app, form_post(HEARTBEAT_PATH, "port=7777")).await;
        f.clock.advance(Duration::seconds(300));

        assert!(!listing(&f.app, LISTING_PATH).await.is_empty());
        assert!(listing(&f.app, "/v1/servers?timeout_seconds=60").await.is_empty());
    }

    #[tokio::test]
    async fn test_store_down_is_service_unavailable() {
        let f = fixture(true);
        f.store.shutdown().await.unwrap();

        let (status, _) = send(&f.app, form_post(HEARTBEAT_PATH, "port=7777")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let request = Request::builder().uri(LISTING_PATH).body(Body::empty()).unwrap();
        let (status, _) = send(&f.app, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_client_address_selection() {
        let peer = SocketAddr::from(PEER);
        let mut headers = HeaderMap::new();
        assert_eq!(client_address(&headers, peer, true), "10.0.0.5");

        headers.insert("x-forwarded-for", " ".parse().unwrap());
        assert_eq!(client_address(&headers, peer, true), "10.0.0.5");

        headers.insert("x-forwarded-for", "198.51.100.2".parse().unwrap());
        assert_eq!(client_address(&headers, peer, true), "198.51.100.2");
        assert_eq!(client_address(&headers, peer, false), "10.0.0.5");
    }
}
