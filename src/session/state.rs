use crate::error::LinkError;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Direction of the audio path for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Mic,
    Speaker,
    Both,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Mic => "mic",
            SessionMode::Speaker => "speaker",
            SessionMode::Both => "both",
        }
    }
}

impl FromStr for SessionMode {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "mic" => Ok(SessionMode::Mic),
            "speaker" => Ok(SessionMode::Speaker),
            "both" => Ok(SessionMode::Both),
            _ => Err(LinkError::InvalidMode(trimmed.to_string())),
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single logical session. Only coordinator transitions change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Active {
        peer_host: String,
        peer_port: u16,
        mode: SessionMode,
    },
    VoiceOnly,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }

    /// Where a stream teardown lands: voice mode outlives the stream.
    pub(crate) fn after_stream_teardown(voice_attached: bool) -> Self {
        if voice_attached {
            SessionState::VoiceOnly
        } else {
            SessionState::Idle
        }
    }
}

/// What the control listener is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ListenerPhase {
    /// No control port configured.
    Disabled,
    Listening,
    SessionWaiting {
        peer: IpAddr,
    },
    /// The listening socket has been closed for shutdown.
    Closed,
}

/// Hosts end up inside a single engine command line.
pub(crate) fn validate_host(host: &str) -> Result<(), LinkError> {
    if host.is_empty() || host.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(LinkError::InvalidHost(host.to_string()));
    }
    Ok(())
}
