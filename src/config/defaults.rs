pub const DEFAULT_ENGINE_CMD: &str = "audio";
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Handshake port peers dial when they initiate a session against us.
pub const DEFAULT_CONTROL_PORT: u16 = 19102;
/// Engine data port when this host plays the server role.
pub const DEFAULT_SERVER_DATA_PORT: u16 = 19103;
/// Engine data port when this host plays the client role.
pub const DEFAULT_CLIENT_DATA_PORT: u16 = 19104;

pub const DEFAULT_DISPATCH_INTERVAL_MS: u64 = 50;
pub const DEFAULT_ACCEPT_POLL_MS: u64 = 100;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;
pub const DEFAULT_LINE_QUEUE_CAPACITY: usize = 256;

pub(super) const MAX_ENGINE_ARGS: usize = 64;
pub(super) const MAX_ENGINE_ARG_BYTES: usize = 8 * 1024;
