//! Reverse-DNS lookup of announcing addresses.
//!
//! Lookups are best-effort. A failure leaves the record's hostname at the
//! address it was admitted with.

use std::net::IpAddr;
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use thiserror::Error;
use shared::protocol::has_line_break;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("reverse lookup failed: {0}")]
    Lookup(String),

    #[error("no usable name for {0}")]
    NoName(IpAddr),

    #[error("hostname lookups are disabled")]
    Disabled,
}

#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn reverse(&self, address: IpAddr) -> Result<String, ResolveError>;
}

/// Resolver backed by the system DNS configuration
pub struct DnsResolver {
    inner: TokioAsyncResolver,
}

impl DnsResolver {
    pub fn from_system_conf() -> Result<Self, ResolveError> {
        let inner = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| ResolveError::Lookup(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HostnameResolver for DnsResolver {
    async fn reverse(&self, address: IpAddr) -> Result<String, ResolveError> {
        let lookup = self
            .inner
            .reverse_lookup(address)
            .await
            .map_err(|e| ResolveError::Lookup(e.to_string()))?;

        lookup
            .iter()
            .find_map(|name| usable_hostname(&name.to_string()))
            .ok_or(ResolveError::NoName(address))
    }
}

/// Used when lookups are turned off
pub struct NoopResolver;

#[async_trait]
impl HostnameResolver for NoopResolver {
    async fn reverse(&self, _address: IpAddr) -> Result<String, ResolveError> {
        Err(ResolveError::Disabled)
    }
}

/// Strip the root label and reject names the listing could not carry.
pub fn usable_hostname(name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || has_line_break(name) {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_usable_hostname() {
        assert_eq!(usable_hostname("arena.example.org."), Some("arena.example.org".to_string()));
        assert_eq!(usable_hostname("arena.example.org"), Some("arena.example.org".to_string()));
        assert_eq!(usable_hostname("."), None);
        assert_eq!(usable_hostname("evil\nport=1"), None);
    }

    #[tokio::test]
    async fn test_noop_resolver_always_fails() {
        let result = NoopResolver.reverse(IpAddr::V4(Ipv4Addr::LOCALHOST)).await;
        assert!(matches!(result, Err(ResolveError::Disabled)));
    }
}
