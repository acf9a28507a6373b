//! Message types exchanged with an IPC client. Messages are newline-delimited JSON.

use crate::error::{LinkError, LinkResult};
use crate::session::{ListenerPhase, SessionState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// IPC Events (voxlink → client)
// ============================================================================

/// Serialized with an `"event"` tag field for type discrimination.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum IpcEvent {
    /// Sent once on startup
    #[serde(rename = "ready")]
    Ready {
        version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        control_addr: Option<String>,
        engine_available: bool,
    },

    /// Connection status from the coordinator
    #[serde(rename = "status")]
    Status {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Raw engine event forwarded while voice mode is on
    #[serde(rename = "voice")]
    Voice { tag: String, payload: String },

    /// Recognized speech matched against the vocabulary
    #[serde(rename = "voice_command")]
    VoiceCommand { name: String, args: String },

    /// Snapshot answering a `status` command
    #[serde(rename = "state")]
    State {
        session: SessionState,
        listener: ListenerPhase,
        voice_attached: bool,
        engine_available: bool,
        dropped_lines: usize,
    },

    /// Command accepted
    #[serde(rename = "ok")]
    Ok { cmd: String },

    /// Command rejected or the engine went away
    #[serde(rename = "error")]
    Error { message: String, recoverable: bool },
}

impl IpcEvent {
    pub(crate) fn from_link_error(err: &LinkError) -> Self {
        let recoverable = !matches!(
            err,
            LinkError::EngineUnavailable(_) | LinkError::EngineDisconnected | LinkError::Destroyed
        );
        IpcEvent::Error {
            message: err.to_string(),
            recoverable,
        }
    }
}

// ============================================================================
// IPC Commands (client → voxlink)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd")]
pub enum IpcCommand {
    /// Open an outbound session
    #[serde(rename = "start")]
    Start {
        host: String,
        /// Peer data port; defaults to the server data port
        #[serde(default)]
        port: Option<u16>,
        /// mic, speaker, or both (default)
        #[serde(default)]
        mode: Option<String>,
    },

    #[serde(rename = "stop")]
    Stop,

    /// Kept as raw JSON so non-integers can be reported as invalid volumes
    #[serde(rename = "set_volume")]
    SetVolume { volume: Value },

    #[serde(rename = "start_voice")]
    StartVoice,

    #[serde(rename = "stop_voice")]
    StopVoice,

    /// Request a state snapshot
    #[serde(rename = "status")]
    Status,

    /// Destroy the coordinator and exit
    #[serde(rename = "shutdown")]
    Shutdown,
}

impl IpcCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            IpcCommand::Start { .. } => "start",
            IpcCommand::Stop => "stop",
            IpcCommand::SetVolume { .. } => "set_volume",
            IpcCommand::StartVoice => "start_voice",
            IpcCommand::StopVoice => "stop_voice",
            IpcCommand::Status => "status",
            IpcCommand::Shutdown => "shutdown",
        }
    }
}

/// Only JSON integers are volumes; range checking happens in the coordinator.
pub(crate) fn volume_from_json(value: &Value) -> LinkResult<i64> {
    value
        .as_i64()
        .ok_or_else(|| LinkError::InvalidVolume(value.to_string()))
}
