/// API path prefix
pub const API_PREFIX: &str = "/v1";

pub const HEARTBEAT_PATH: &str = "/v1/heartbeat";
pub const REMOVE_PATH: &str = "/v1/remove";
pub const LISTING_PATH: &str = "/v1/servers";

/// Form fields posted by announcing game servers
pub const FIELD_PORT: &str = "port";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_NUM_PLAYERS: &str = "num_players";
pub const FIELD_PASSWORD_REQUIRED: &str = "password_required";

/// Query parameter overriding the freshness window of a listing
pub const QUERY_TIMEOUT_SECONDS: &str = "timeout_seconds";

/// Listing format: one `[SERVER]` header per record, then `key=value` lines
pub const LISTING_HEADER: &str = "[SERVER]";
pub const KEY_IP_ADDRESS: &str = "ip_address";
pub const KEY_HOSTNAME: &str = "hostname";
pub const KEY_PORT: &str = "port";
pub const KEY_DESCRIPTION: &str = "description";
pub const KEY_NUM_PLAYERS: &str = "num_players";
pub const KEY_PASSWORD_REQUIRED: &str = "password_required";

/// Game servers announce themselves this often
pub const HEARTBEAT_INTERVAL_SECS: u64 = 600;

/// Twice the heartbeat interval, so one missed heartbeat is tolerated
pub const DEFAULT_TIMEOUT_SECS: u64 = 2 * HEARTBEAT_INTERVAL_SECS;

/// Replace control characters (newlines in particular) with spaces and trim.
///
/// The listing format is line oriented, so a stray newline in a field would
/// split one record into two.
pub fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// True if the value could break a line of the listing format
pub fn has_line_break(value: &str) -> bool {
    value.chars().any(|c| c.is_control())
}
