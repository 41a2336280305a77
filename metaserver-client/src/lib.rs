//! Talk to a metaserver: announce a game server, withdraw it, or fetch the
//! list of live servers.

pub mod announcer;
pub mod client;

pub use announcer::{Announcer, AnnouncerConfig};
pub use client::{ClientError, MetaserverClient};
