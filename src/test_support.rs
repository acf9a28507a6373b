//! Scripted engine doubles shared by the unit tests.

use crate::config::LinkSettings;
use crate::engine::{EngineHandle, EngineOutput};
use crate::session::Coordinator;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Records every byte written to the engine's input. Writes start failing
/// with `BrokenPipe` once `fail_writes` is called, and block while a
/// `hold_writes` guard is alive.
#[derive(Clone, Default)]
pub(crate) struct CommandLog {
    bytes: Arc<Mutex<Vec<u8>>>,
    failing: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
    byte_at_a_time: bool,
}

impl CommandLog {
    /// Accepts a single byte per `write` call, so `write_all` loops.
    pub(crate) fn byte_at_a_time() -> Self {
        Self {
            byte_at_a_time: true,
            ..Self::default()
        }
    }

    pub(crate) fn hold_writes(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        let bytes = self.bytes.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn raw(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }

    pub(crate) fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl Write for CommandLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "engine gone"));
        }
        let _gate = self.gate.lock().unwrap();
        let n = if self.byte_at_a_time {
            buf.len().min(1)
        } else {
            buf.len()
        };
        self.bytes.lock().unwrap().extend_from_slice(&buf[..n]);
        if self.byte_at_a_time {
            thread::yield_now();
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Blocking reader fed from a channel. Dropping every sender is EOF.
pub(crate) struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl ChannelReader {
    pub(crate) fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(bytes) => self.pending = bytes,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Test-side handles for a scripted engine.
pub(crate) struct FakeEngine {
    pub(crate) commands: CommandLog,
    output: Option<Sender<Vec<u8>>>,
}

impl FakeEngine {
    /// Emit raw bytes on the engine's stdout.
    pub(crate) fn emit(&self, text: &str) {
        if let Some(output) = &self.output {
            let _ = output.send(text.as_bytes().to_vec());
        }
    }

    /// Close the engine's stdout, as if the process exited.
    pub(crate) fn close_output(&mut self) {
        self.output = None;
    }
}

pub(crate) fn fake_engine() -> (EngineHandle, EngineOutput, FakeEngine) {
    fake_engine_with(CommandLog::default())
}

pub(crate) fn fake_engine_with(commands: CommandLog) -> (EngineHandle, EngineOutput, FakeEngine) {
    let (tx, rx) = unbounded();
    let (handle, output) =
        EngineHandle::from_streams(Box::new(commands.clone()), Box::new(ChannelReader::new(rx)));
    let fake = FakeEngine {
        commands,
        output: Some(tx),
    };
    (handle, output, fake)
}

/// Fast timings and no control listener.
pub(crate) fn test_settings() -> LinkSettings {
    LinkSettings {
        control_bind: None,
        dispatch_interval: Duration::from_millis(5),
        accept_poll: Duration::from_millis(10),
        handshake_timeout: Duration::from_millis(500),
        shutdown_grace: Duration::from_millis(50),
        ..LinkSettings::default()
    }
}

/// Like `test_settings`, with a listener on an ephemeral loopback port.
pub(crate) fn listening_settings() -> LinkSettings {
    LinkSettings {
        control_bind: Some("127.0.0.1:0".parse().unwrap()),
        ..test_settings()
    }
}

pub(crate) fn coordinator_with(settings: LinkSettings) -> (Coordinator, FakeEngine) {
    coordinator_with_log(settings, CommandLog::default())
}

pub(crate) fn coordinator_with_log(
    settings: LinkSettings,
    commands: CommandLog,
) -> (Coordinator, FakeEngine) {
    let (handle, output, fake) = fake_engine_with(commands);
    let coordinator = Coordinator::with_engine(handle, output, settings).expect("coordinator");
    (coordinator, fake)
}

pub(crate) fn test_coordinator() -> (Coordinator, FakeEngine) {
    coordinator_with(test_settings())
}

/// Poll `condition` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
