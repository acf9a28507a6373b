use crate::dispatch::EngineEvent;
use crossbeam_channel::Sender;

/// Connection-status notification delivered to every observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Connected { host: String },
    Disconnected,
    EngineLost { reason: String },
}

impl LinkStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LinkStatus::Connected { .. } => "Connected",
            LinkStatus::Disconnected => "Disconnected",
            LinkStatus::EngineLost { .. } => "EngineLost",
        }
    }

    /// The argument half of the `(status, host)` pair.
    pub fn host(&self) -> Option<&str> {
        match self {
            LinkStatus::Connected { host } => Some(host),
            _ => None,
        }
    }
}

/// Generic status listener. Called with the coordination lock held, so
/// notifications arrive in transition order; calling back into the
/// coordinator from here is allowed.
pub trait StatusObserver: Send + Sync {
    fn on_status(&self, status: &LinkStatus);
}

/// Consumer of parsed engine events while voice mode is on. The coordinator
/// only keeps a weak reference; the caller owns the sink.
pub trait VoiceSink: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

impl StatusObserver for Sender<LinkStatus> {
    fn on_status(&self, status: &LinkStatus) {
        let _ = self.send(status.clone());
    }
}

impl VoiceSink for Sender<EngineEvent> {
    fn on_event(&self, event: &EngineEvent) {
        let _ = self.send(event.clone());
    }
}
