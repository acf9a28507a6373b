pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod listener;
mod lock;
pub mod session;
pub mod telemetry;
#[cfg(test)]
mod test_support;
pub mod voice;

pub(crate) use lock::lock_or_recover;
pub use config::{AppConfig, LinkSettings};
pub use dispatch::{EngineEvent, EngineEventKind};
pub use error::{LinkError, LinkResult};
pub use session::{
    Coordinator, LinkStatus, ListenerPhase, SessionMode, SessionState, StatusObserver, VoiceSink,
};
pub use voice::{VoiceCommand, Vocabulary};
