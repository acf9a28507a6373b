//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    DEFAULT_ACCEPT_POLL_MS, DEFAULT_BIND_HOST, DEFAULT_CLIENT_DATA_PORT, DEFAULT_CONTROL_PORT,
    DEFAULT_DISPATCH_INTERVAL_MS, DEFAULT_ENGINE_CMD, DEFAULT_HANDSHAKE_TIMEOUT_MS,
    DEFAULT_LINE_QUEUE_CAPACITY, DEFAULT_SERVER_DATA_PORT, DEFAULT_SHUTDOWN_GRACE_MS,
};

/// CLI options for the voxlink coordinator. Validated values keep the engine
/// command line and the control plane sane.
#[derive(Debug, Parser, Clone)]
#[command(about = "VoxLink audio link coordinator", author, version)]
pub struct AppConfig {
    /// Audio engine command; extra words are passed as arguments
    #[arg(long = "engine", env = "VOXLINK_ENGINE", default_value = DEFAULT_ENGINE_CMD)]
    pub engine_cmd: String,

    /// Extra argument for the audio engine (repeatable)
    #[arg(long = "engine-arg", action = ArgAction::Append, value_name = "ARG")]
    pub engine_args: Vec<String>,

    /// Address the control listener binds
    #[arg(long = "bind", env = "VOXLINK_BIND", default_value = DEFAULT_BIND_HOST)]
    pub bind_host: String,

    /// TCP port peers dial to start a session with this host
    #[arg(long = "control-port", env = "VOXLINK_CONTROL_PORT", default_value_t = DEFAULT_CONTROL_PORT)]
    pub control_port: u16,

    /// Do not accept inbound sessions
    #[arg(long = "no-listen", default_value_t = false)]
    pub no_listen: bool,

    /// Engine data port in the server role (also the default peer port for `start`)
    #[arg(long = "server-data-port", default_value_t = DEFAULT_SERVER_DATA_PORT)]
    pub server_data_port: u16,

    /// Engine data port in the client role
    #[arg(long = "client-data-port", default_value_t = DEFAULT_CLIENT_DATA_PORT)]
    pub client_data_port: u16,

    /// How often the dispatcher wakes to forward engine events (milliseconds)
    #[arg(long = "dispatch-interval-ms", default_value_t = DEFAULT_DISPATCH_INTERVAL_MS)]
    pub dispatch_interval_ms: u64,

    /// Upper bound on each listener wait before the shutdown flag is checked (milliseconds)
    #[arg(long = "accept-poll-ms", default_value_t = DEFAULT_ACCEPT_POLL_MS)]
    pub accept_poll_ms: u64,

    /// Time a peer has to send its mode line after connecting (milliseconds)
    #[arg(long = "handshake-timeout-ms", default_value_t = DEFAULT_HANDSHAKE_TIMEOUT_MS)]
    pub handshake_timeout_ms: u64,

    /// Time the engine gets to exit after `shutdown` before it is signalled (milliseconds)
    #[arg(long = "shutdown-grace-ms", default_value_t = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,

    /// Engine output lines buffered between the reader and dispatcher
    #[arg(long = "line-queue-capacity", default_value_t = DEFAULT_LINE_QUEUE_CAPACITY)]
    pub line_queue_capacity: usize,

    /// YAML voice vocabulary used to turn recognized speech into commands
    #[arg(long = "vocabulary", env = "VOXLINK_VOCABULARY")]
    pub vocabulary: Option<PathBuf>,

    /// Write structured debug logs to a file
    #[arg(long = "logs", env = "VOXLINK_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all logging (overrides --logs)
    #[arg(long = "no-logs", env = "VOXLINK_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,
}

/// Runtime knobs the coordinator and its workers read.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub engine_program: String,
    pub engine_args: Vec<String>,
    /// `None` disables the control listener.
    pub control_bind: Option<SocketAddr>,
    pub server_data_port: u16,
    pub client_data_port: u16,
    pub dispatch_interval: Duration,
    pub accept_poll: Duration,
    pub handshake_timeout: Duration,
    pub shutdown_grace: Duration,
    pub line_queue_capacity: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            engine_program: DEFAULT_ENGINE_CMD.to_string(),
            engine_args: Vec::new(),
            control_bind: Some(SocketAddr::from(([0, 0, 0, 0], DEFAULT_CONTROL_PORT))),
            server_data_port: DEFAULT_SERVER_DATA_PORT,
            client_data_port: DEFAULT_CLIENT_DATA_PORT,
            dispatch_interval: Duration::from_millis(DEFAULT_DISPATCH_INTERVAL_MS),
            accept_poll: Duration::from_millis(DEFAULT_ACCEPT_POLL_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
            line_queue_capacity: DEFAULT_LINE_QUEUE_CAPACITY,
        }
    }
}
