use std::fmt;
use std::net::IpAddr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Identity of a game server in the registry: the announcing address and
/// the port its players connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerKey {
    pub address: IpAddr,
    pub port: u16,
}

impl ServerKey {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// What a game server reports about itself on every heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Free-text label chosen by the server operator
    pub description: String,

    /// Players currently connected
    pub num_players: u32,

    /// Whether joining needs a password
    pub password_required: bool,
}

/// A registered game server.
/// This is the canonical data model used by the registry, its stores and the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub address: IpAddr,

    pub port: u16,

    /// Reverse-DNS name; equal to the address until a lookup succeeds
    pub hostname: String,

    pub description: String,

    pub password_required: bool,

    pub num_players: u32,

    /// Time of the last accepted heartbeat, the only liveness signal
    pub last_updated: DateTime<Utc>,
}

impl ServerRecord {
    /// Build the record a first heartbeat admits. The hostname starts out as
    /// the address itself.
    pub fn admit(key: ServerKey, status: ServerStatus, now: DateTime<Utc>) -> Self {
        Self {
            address: key.address,
            port: key.port,
            hostname: key.address.to_string(),
            description: status.description,
            password_required: status.password_required,
            num_players: status.num_players,
            last_updated: now,
        }
    }

    pub fn key(&self) -> ServerKey {
        ServerKey::new(self.address, self.port)
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            description: self.description.clone(),
            num_players: self.num_players,
            password_required: self.password_required,
        }
    }
}
