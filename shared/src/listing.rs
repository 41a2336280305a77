//! Plain-text server listing.
//!
//! ```text
//! [SERVER]
//! ip_address=10.0.0.5
//! hostname=arena.example.org
//! port=7777
//! description=Arena
//! num_players=3
//! ```
//!
//! Fields holding an empty or default value are left out.

use std::fmt::Write;
use serde::{Serialize, Deserialize};
use crate::protocol::{
    sanitize_field, KEY_DESCRIPTION, KEY_HOSTNAME, KEY_IP_ADDRESS, KEY_NUM_PLAYERS,
    KEY_PASSWORD_REQUIRED, KEY_PORT, LISTING_HEADER,
};
use crate::types::ServerRecord;

/// A server as seen by a client reading the listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedServer {
    pub ip_address: String,
    pub hostname: String,
    pub port: u16,
    pub description: String,
    pub num_players: u32,
    pub password_required: bool,
}

impl From<&ServerRecord> for ListedServer {
    fn from(record: &ServerRecord) -> Self {
        Self {
            ip_address: record.address.to_string(),
            hostname: record.hostname.clone(),
            port: record.port,
            description: record.description.clone(),
            num_players: record.num_players,
            password_required: record.password_required,
        }
    }
}

/// Render records as a listing body.
pub fn render_listing(records: &[ServerRecord]) -> String {
    let mut out = String::new();
    for record in records {
        render_record(&mut out, record);
    }
    out
}

fn render_record(out: &mut String, record: &ServerRecord) {
    // Writing to a String cannot fail
    let _ = writeln!(out, "{}", LISTING_HEADER);
    let _ = writeln!(out, "{}={}", KEY_IP_ADDRESS, record.address);
    if !record.hostname.is_empty() {
        let _ = writeln!(out, "{}={}", KEY_HOSTNAME, sanitize_field(&record.hostname));
    }
    let _ = writeln!(out, "{}={}", KEY_PORT, record.port);
    if !record.description.is_empty() {
        let _ = writeln!(out, "{}={}", KEY_DESCRIPTION, sanitize_field(&record.description));
    }
    if record.num_players > 0 {
        let _ = writeln!(out, "{}={}", KEY_NUM_PLAYERS, record.num_players);
    }
    if record.password_required {
        let _ = writeln!(out, "{}=1", KEY_PASSWORD_REQUIRED);
    }
}

/// Parse a listing body. Unknown keys and lines without `=` are ignored,
/// numeric fields that fail to parse fall back to zero.
pub fn parse_listing(body: &str) -> Vec<ListedServer> {
    let mut servers = Vec::new();
    let mut current: Option<ListedServer> = None;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line == LISTING_HEADER {
            if let Some(done) = current.take() {
                servers.push(done);
            }
            current = Some(ListedServer::default());
            continue;
        }

        let (Some(server), Some((key, value))) = (current.as_mut(), line.split_once('=')) else {
            continue;
        };

        match key {
            KEY_IP_ADDRESS => server.ip_address = value.to_string(),
            KEY_HOSTNAME => server.hostname = value.to_string(),
            KEY_PORT => server.port = value.trim().parse().unwrap_or(0),
            KEY_DESCRIPTION => server.description = value.to_string(),
            KEY_NUM_PLAYERS => server.num_players = value.trim().parse().unwrap_or(0),
            KEY_PASSWORD_REQUIRED => {
                server.password_required = value.trim().parse::<i64>().map(|v| v != 0).unwrap_or(false)
            }
            _ => {}
        }
    }

    if let Some(done) = current {
        servers.push(done);
    }

    servers
}
