//! Session coordinator: the one object callers hold.
//!
//! Construction spawns (or adopts) the audio engine and starts three workers:
//! - Reader: blocking reads of engine output, queues complete lines
//! - Dispatcher: drains the line queue on a fixed cadence, feeds the voice sink
//! - Listener: accepts inbound handshakes and drives sessions for remote peers
//!
//! Caller operations and worker transitions are serialized by one lock owned
//! by the coordinator. Bulk audio never touches it.

mod observer;
mod shared;
mod state;

pub(crate) use shared::LinkCore;
pub use observer::{LinkStatus, StatusObserver, VoiceSink};
pub use state::{ListenerPhase, SessionMode, SessionState};

use crate::config::LinkSettings;
use crate::dispatch::{spawn_dispatcher_thread, spawn_reader_thread};
use crate::engine::{EngineHandle, EngineOutput};
use crate::error::LinkResult;
use crate::listener::{bind_control_listener, spawn_listener_thread};
use crate::lock_or_recover;
use anyhow::{Context, Result};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

struct Workers {
    reader: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

/// Owns the engine, the session state, and the worker threads.
pub struct Coordinator {
    core: Arc<LinkCore>,
    workers: Mutex<Workers>,
    control_addr: Option<SocketAddr>,
}

impl Coordinator {
    /// Spawn the configured engine process and start all workers.
    pub fn spawn(settings: LinkSettings) -> Result<Self> {
        let (engine, output) =
            EngineHandle::spawn(&settings.engine_program, &settings.engine_args)?;
        Self::with_engine(engine, output, settings)
    }

    /// Start the workers around an engine the caller already connected.
    pub fn with_engine(
        mut engine: EngineHandle,
        output: EngineOutput,
        settings: LinkSettings,
    ) -> Result<Self> {
        let (listener, control_addr) = match settings.control_bind {
            Some(addr) => match bind_listener(addr) {
                Ok((listener, local)) => (Some(listener), Some(local)),
                Err(err) => {
                    engine.terminate(settings.shutdown_grace);
                    return Err(err)
                        .with_context(|| format!("failed to bind control listener on {addr}"));
                }
            },
            None => (None, None),
        };

        let (line_tx, line_rx) = crossbeam_channel::bounded(settings.line_queue_capacity);
        let dispatch_interval = settings.dispatch_interval;
        let core = Arc::new(LinkCore::new(engine, settings));

        let mut workers = Workers {
            reader: Some(spawn_reader_thread(output, line_tx, Arc::clone(&core))),
            dispatcher: Some(spawn_dispatcher_thread(
                line_rx,
                Arc::clone(&core),
                dispatch_interval,
            )),
            listener: None,
        };
        if let Some(listener) = listener {
            workers.listener = Some(spawn_listener_thread(listener, Arc::clone(&core)));
            tracing::info!(addr = ?control_addr, "control listener started");
        }

        Ok(Self {
            core,
            workers: Mutex::new(workers),
            control_addr,
        })
    }

    /// Open an outbound session. Fails with `SessionAlreadyActive` unless idle.
    pub fn start(&self, host: &str, port: u16, mode: SessionMode) -> LinkResult<()> {
        let local_port = self.core.settings().client_data_port;
        self.core
            .begin_session(host, port, mode, local_port)
            .map(|_| ())
    }

    pub fn stop(&self) -> LinkResult<()> {
        self.core.stop()
    }

    /// Volume must be within 0..=100; nothing is sent otherwise.
    pub fn set_volume(&self, volume: i64) -> LinkResult<()> {
        self.core.set_volume(volume)
    }

    pub fn start_voice(&self, sink: &Arc<dyn VoiceSink>) -> LinkResult<()> {
        self.core.start_voice(sink)
    }

    pub fn stop_voice(&self) -> LinkResult<()> {
        self.core.stop_voice()
    }

    pub fn subscribe(&self, observer: Arc<dyn StatusObserver>) {
        self.core.subscribe(observer);
    }

    pub fn session_state(&self) -> SessionState {
        self.core.session()
    }

    pub fn listener_phase(&self) -> ListenerPhase {
        self.core.listener_phase()
    }

    pub fn voice_attached(&self) -> bool {
        self.core.voice_attached()
    }

    pub fn engine_available(&self) -> bool {
        self.core.engine_available()
    }

    pub fn settings(&self) -> &LinkSettings {
        self.core.settings()
    }

    /// Address the control listener actually bound, if one is running.
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_addr
    }

    /// Engine lines dropped because the dispatcher fell behind.
    pub fn dropped_lines(&self) -> usize {
        self.core.dropped_lines()
    }

    /// Stop everything. Safe to call more than once.
    pub fn destroy(&self) {
        if !self.core.begin_shutdown() {
            return;
        }
        tracing::info!("destroying coordinator");
        self.core.send_engine_shutdown();

        let mut workers = lock_or_recover(&self.workers, "coordinator workers");
        for (name, handle) in [
            ("listener", workers.listener.take()),
            ("dispatcher", workers.dispatcher.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    tracing::warn!(worker = name, "worker panicked");
                }
            }
        }
        self.core.terminate_engine(self.core.settings().shutdown_grace);

        // A hung engine can keep the reader blocked; leave it detached then.
        if let Some(reader) = workers.reader.take() {
            if reader.is_finished() {
                let _ = reader.join();
            } else {
                tracing::debug!("engine reader still blocked; detaching");
            }
        }
    }
}

fn bind_listener(addr: SocketAddr) -> std::io::Result<(TcpListener, SocketAddr)> {
    let listener = bind_control_listener(addr)?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.destroy();
    }
}
