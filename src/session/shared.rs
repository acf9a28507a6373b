use super::observer::{LinkStatus, StatusObserver, VoiceSink};
use super::state::{validate_host, ListenerPhase, SessionMode, SessionState};
use crate::config::LinkSettings;
use crate::dispatch::EngineEvent;
use crate::engine::{EngineCommand, EngineHandle};
use crate::error::{LinkError, LinkResult};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

type StateGuard<'a> = ReentrantMutexGuard<'a, RefCell<Inner>>;

struct Inner {
    engine: EngineHandle,
    session: SessionState,
    voice_sink: Option<Weak<dyn VoiceSink>>,
    observers: Vec<Arc<dyn StatusObserver>>,
    listener: ListenerPhase,
    loss_reported: bool,
}

impl Inner {
    fn voice_attached(&self) -> bool {
        self.voice_sink
            .as_ref()
            .is_some_and(|sink| sink.strong_count() > 0)
    }
}

/// State shared by the public coordinator and its workers.
///
/// Everything mutable sits behind one re-entrant lock. Callbacks into sinks
/// and observers run with the lock held but with no `RefCell` borrow live, so
/// they may call straight back into the coordinator.
pub(crate) struct LinkCore {
    state: ReentrantMutex<RefCell<Inner>>,
    shutdown: AtomicBool,
    dropped_lines: AtomicUsize,
    settings: LinkSettings,
}

impl LinkCore {
    pub(crate) fn new(engine: EngineHandle, settings: LinkSettings) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(Inner {
                engine,
                session: SessionState::Idle,
                voice_sink: None,
                observers: Vec::new(),
                listener: ListenerPhase::Disabled,
                loss_reported: false,
            })),
            shutdown: AtomicBool::new(false),
            dropped_lines: AtomicUsize::new(0),
            settings,
        }
    }

    pub(crate) fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Flip the shutdown flag. Returns `false` if it was already set.
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn record_dropped_line(&self) {
        let dropped = self.dropped_lines.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped.is_power_of_two() {
            tracing::warn!(dropped, "engine line queue full; dropping output");
        }
    }

    pub(crate) fn dropped_lines(&self) -> usize {
        self.dropped_lines.load(Ordering::Relaxed)
    }

    pub(crate) fn session(&self) -> SessionState {
        self.state.lock().borrow().session.clone()
    }

    pub(crate) fn listener_phase(&self) -> ListenerPhase {
        self.state.lock().borrow().listener.clone()
    }

    pub(crate) fn set_listener_phase(&self, phase: ListenerPhase) {
        let guard = self.state.lock();
        let mut inner = guard.borrow_mut();
        if inner.listener != phase {
            tracing::debug!(?phase, "listener phase");
            inner.listener = phase;
        }
    }

    pub(crate) fn voice_attached(&self) -> bool {
        self.state.lock().borrow().voice_attached()
    }

    pub(crate) fn engine_available(&self) -> bool {
        self.state.lock().borrow().engine.is_available()
    }

    pub(crate) fn subscribe(&self, observer: Arc<dyn StatusObserver>) {
        let guard = self.state.lock();
        guard.borrow_mut().observers.push(observer);
    }

    /// Open a session toward `host`. `peer_port` is the peer's data port as
    /// recorded in the session; `local_data_port` is what the engine binds.
    pub(crate) fn begin_session(
        &self,
        host: &str,
        peer_port: u16,
        mode: SessionMode,
        local_data_port: u16,
    ) -> LinkResult<SessionState> {
        validate_host(host)?;

        let guard = self.state.lock();
        self.ensure_running()?;
        let session = {
            let mut inner = guard.borrow_mut();
            if !inner.session.is_idle() {
                return Err(LinkError::SessionAlreadyActive);
            }
            let command = EngineCommand::Start {
                mode,
                host: host.to_string(),
                port: local_data_port,
            };
            if let Err(err) = inner.engine.write_command(&command) {
                drop(inner);
                self.report_engine_loss(&guard);
                return Err(err);
            }
            inner.session = SessionState::Active {
                peer_host: host.to_string(),
                peer_port,
                mode,
            };
            inner.session.clone()
        };
        tracing::info!(host, peer_port, %mode, "session started");
        self.notify(
            &guard,
            &LinkStatus::Connected {
                host: host.to_string(),
            },
        );
        Ok(session)
    }

    /// Tear down the stream. Voice mode survives as `VoiceOnly`. The local
    /// transition always happens; an engine write failure is returned after.
    pub(crate) fn stop(&self) -> LinkResult<()> {
        let guard = self.state.lock();
        self.ensure_running()?;
        self.end_stream(&guard)
    }

    /// Inbound teardown: only end the session if it is still the one the
    /// listener opened.
    pub(crate) fn stop_if_current(&self, expected: &SessionState) -> LinkResult<bool> {
        let guard = self.state.lock();
        self.ensure_running()?;
        if guard.borrow().session != *expected {
            tracing::debug!("inbound session already replaced; skipping teardown");
            return Ok(false);
        }
        self.end_stream(&guard).map(|()| true)
    }

    fn end_stream(&self, guard: &StateGuard<'_>) -> LinkResult<()> {
        let result = {
            let mut inner = guard.borrow_mut();
            let result = inner.engine.write_command(&EngineCommand::StopBoth);
            let voice_attached = inner.voice_attached();
            inner.session = SessionState::after_stream_teardown(voice_attached);
            tracing::info!(state = ?inner.session, "session stopped");
            result
        };
        if result.is_err() {
            self.report_engine_loss(guard);
        }
        self.notify(guard, &LinkStatus::Disconnected);
        result
    }

    pub(crate) fn set_volume(&self, volume: i64) -> LinkResult<()> {
        let volume = u8::try_from(volume)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or_else(|| LinkError::InvalidVolume(volume.to_string()))?;
        let guard = self.state.lock();
        self.ensure_running()?;
        let result = guard
            .borrow_mut()
            .engine
            .write_command(&EngineCommand::SetVolume(volume));
        if result.is_err() {
            self.report_engine_loss(&guard);
        }
        result
    }

    /// A sink already attached is replaced, and gets the terminal
    /// `VCERR:stopped_vc` event first.
    pub(crate) fn start_voice(&self, sink: &Arc<dyn VoiceSink>) -> LinkResult<()> {
        let guard = self.state.lock();
        self.ensure_running()?;
        let replaced = {
            let mut inner = guard.borrow_mut();
            if let Err(err) = inner.engine.write_command(&EngineCommand::VoiceStart) {
                drop(inner);
                self.report_engine_loss(&guard);
                return Err(err);
            }
            let previous = inner
                .voice_sink
                .replace(Arc::downgrade(sink))
                .and_then(|weak| weak.upgrade());
            if inner.session.is_idle() {
                inner.session = SessionState::VoiceOnly;
            }
            tracing::info!(state = ?inner.session, "voice mode started");
            previous.filter(|previous| !same_sink(previous, sink))
        };
        if let Some(previous) = replaced {
            tracing::debug!("voice sink replaced");
            previous.on_event(&EngineEvent::voice_stopped());
        }
        Ok(())
    }

    /// Always delivers the terminal `VCERR:stopped_vc` event to the attached
    /// sink before detaching it, even when the engine write fails.
    pub(crate) fn stop_voice(&self) -> LinkResult<()> {
        let guard = self.state.lock();
        self.ensure_running()?;
        let (result, sink) = {
            let mut inner = guard.borrow_mut();
            let result = inner.engine.write_command(&EngineCommand::VoiceStop);
            let sink = inner.voice_sink.as_ref().and_then(Weak::upgrade);
            (result, sink)
        };
        if result.is_err() {
            self.report_engine_loss(&guard);
        }
        if let Some(sink) = sink {
            sink.on_event(&EngineEvent::voice_stopped());
        }
        {
            let mut inner = guard.borrow_mut();
            inner.voice_sink = None;
            if inner.session == SessionState::VoiceOnly {
                inner.session = SessionState::Idle;
            }
            tracing::info!(state = ?inner.session, "voice mode stopped");
        }
        result
    }

    /// Hand one parsed event to the sink, or drop it when none is attached.
    pub(crate) fn deliver_event(&self, event: &EngineEvent) {
        let guard = self.state.lock();
        let sink = guard.borrow().voice_sink.as_ref().and_then(Weak::upgrade);
        match sink {
            Some(sink) => sink.on_event(event),
            None => tracing::trace!(tag = %event.tag, "no voice sink; event dropped"),
        }
    }

    /// The reader saw EOF or an error on the engine output.
    pub(crate) fn engine_lost(&self, reason: String) {
        let guard = self.state.lock();
        guard.borrow_mut().engine.mark_lost(reason);
        self.report_engine_loss(&guard);
    }

    /// Ask the engine to exit. Errors are logged; the engine may already be gone.
    pub(crate) fn send_engine_shutdown(&self) {
        let guard = self.state.lock();
        let result = guard
            .borrow_mut()
            .engine
            .write_command(&EngineCommand::Shutdown);
        if let Err(err) = result {
            tracing::debug!(error = %err, "shutdown command not delivered");
        }
    }

    pub(crate) fn terminate_engine(&self, grace: Duration) {
        let guard = self.state.lock();
        guard.borrow_mut().engine.terminate(grace);
    }

    /// Checked with the lock held: `destroy` raises the flag before it takes
    /// the lock to send `shutdown`, so nothing can be written after it.
    fn ensure_running(&self) -> LinkResult<()> {
        if self.is_shutting_down() {
            return Err(LinkError::Destroyed);
        }
        Ok(())
    }

    fn report_engine_loss(&self, guard: &StateGuard<'_>) {
        let reason = {
            let mut inner = guard.borrow_mut();
            if inner.loss_reported {
                return;
            }
            let Some(reason) = inner.engine.lost_reason().map(str::to_string) else {
                return;
            };
            inner.loss_reported = true;
            reason
        };
        self.notify(guard, &LinkStatus::EngineLost { reason });
    }

    fn notify(&self, guard: &StateGuard<'_>, status: &LinkStatus) {
        let observers = guard.borrow().observers.clone();
        for observer in observers {
            observer.on_status(status);
        }
    }
}

fn same_sink(a: &Arc<dyn VoiceSink>, b: &Arc<dyn VoiceSink>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}
