use crate::session::SessionMode;
use std::fmt;

/// One line of the engine's control protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Start {
        mode: SessionMode,
        host: String,
        port: u16,
    },
    StopBoth,
    SetVolume(u8),
    VoiceStart,
    VoiceStop,
    Shutdown,
}

impl EngineCommand {
    /// Newline-terminated wire form.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::Start { mode, host, port } => {
                write!(f, "start {} -host {host} -port {port}", mode.as_str())
            }
            EngineCommand::StopBoth => f.write_str("stop both"),
            EngineCommand::SetVolume(volume) => write!(f, "set -volume {volume}"),
            EngineCommand::VoiceStart => f.write_str("voice_start"),
            EngineCommand::VoiceStop => f.write_str("voice_stop"),
            EngineCommand::Shutdown => f.write_str("shutdown"),
        }
    }
}
