use thiserror::Error;

/// Failures surfaced by the coordinator and its workers.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("a session is already active")]
    SessionAlreadyActive,

    #[error("invalid volume {0}: expected an integer between 0 and 100")]
    InvalidVolume(String),

    #[error("unrecognized session mode '{0}': expected mic, speaker, or both")]
    InvalidMode(String),

    #[error("invalid peer host '{0}': must be non-empty with no whitespace or control characters")]
    InvalidHost(String),

    #[error("audio engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("audio engine output closed")]
    EngineDisconnected,

    #[error("coordinator has been destroyed")]
    Destroyed,

    #[error("control plane I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LinkResult<T> = Result<T, LinkError>;
