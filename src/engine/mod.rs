//! Adapter around the external audio engine process.
//!
//! The engine speaks a line protocol: commands go in on stdin, `tag:payload`
//! lines come back on stdout. Bulk audio never crosses these pipes; the engine
//! exchanges it with the peer over its own data port.

mod command;

pub use command::EngineCommand;

use crate::error::{LinkError, LinkResult};
use anyhow::{Context, Result};
use std::io::{self, ErrorKind, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const READ_CHUNK_BYTES: usize = 4096;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive owner of the engine's input stream (and the child, when spawned).
///
/// Callers serialize access through the coordinator lock, so a single
/// `write_command` is never interleaved with another.
pub struct EngineHandle {
    input: Option<Box<dyn Write + Send>>,
    child: Option<Child>,
    lost_reason: Option<String>,
}

/// Read half of the engine pipes, moved into the reader worker.
pub struct EngineOutput {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl EngineHandle {
    /// Spawn `program args...` with piped stdin/stdout.
    pub fn spawn(program: &str, args: &[String]) -> Result<(Self, EngineOutput)> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn audio engine '{program}'"))?;
        let stdin = child
            .stdin
            .take()
            .context("audio engine stdin was not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("audio engine stdout was not captured")?;
        tracing::info!(program, pid = child.id(), "audio engine started");
        let handle = Self {
            input: Some(Box::new(stdin)),
            child: Some(child),
            lost_reason: None,
        };
        Ok((handle, EngineOutput::new(Box::new(stdout))))
    }

    /// Wrap already-connected streams (an engine hosted elsewhere, or a test double).
    pub fn from_streams(
        input: Box<dyn Write + Send>,
        output: Box<dyn Read + Send>,
    ) -> (Self, EngineOutput) {
        let handle = Self {
            input: Some(input),
            child: None,
            lost_reason: None,
        };
        (handle, EngineOutput::new(output))
    }

    pub fn is_available(&self) -> bool {
        self.lost_reason.is_none() && self.input.is_some()
    }

    /// Why the engine went away, if it did.
    pub fn lost_reason(&self) -> Option<&str> {
        self.lost_reason.as_deref()
    }

    /// Write one newline-terminated command and flush it.
    pub fn write_command(&mut self, command: &EngineCommand) -> LinkResult<()> {
        if let Some(reason) = &self.lost_reason {
            return Err(LinkError::EngineUnavailable(reason.clone()));
        }
        let Some(input) = self.input.as_mut() else {
            return Err(LinkError::EngineUnavailable("engine input closed".into()));
        };
        let line = command.to_line();
        let result = input
            .write_all(line.as_bytes())
            .and_then(|()| input.flush());
        match result {
            Ok(()) => {
                tracing::debug!(command = %command, "engine command sent");
                Ok(())
            }
            Err(err) => {
                let reason = format!("write '{command}' failed: {err}");
                self.mark_lost(reason.clone());
                Err(LinkError::EngineUnavailable(reason))
            }
        }
    }

    /// Record that the engine is gone. Returns `true` the first time only.
    pub(crate) fn mark_lost(&mut self, reason: String) -> bool {
        if self.lost_reason.is_some() {
            return false;
        }
        tracing::warn!(reason = %reason, "audio engine lost");
        self.lost_reason = Some(reason);
        self.input = None;
        true
    }

    /// Close stdin and reap the child, escalating SIGTERM then SIGKILL once
    /// `grace` has elapsed at each step.
    pub(crate) fn terminate(&mut self, grace: Duration) {
        self.input = None;
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = child.id();
        if wait_for_exit(&mut child, grace) {
            return;
        }
        tracing::debug!(pid, "engine still running after shutdown; sending SIGTERM");
        send_signal(pid, Signal::Term);
        if wait_for_exit(&mut child, grace) {
            return;
        }
        tracing::warn!(pid, "engine ignored SIGTERM; killing");
        if let Err(err) = child.kill() {
            tracing::warn!(pid, error = %err, "failed to kill audio engine");
        }
        let _ = child.wait();
    }
}

impl EngineOutput {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: vec![0u8; READ_CHUNK_BYTES],
        }
    }

    /// Block until the engine produces bytes. EOF and hard errors both mean
    /// the engine is gone.
    pub fn read_chunk(&mut self) -> LinkResult<&[u8]> {
        loop {
            match self.reader.read(&mut self.buffer) {
                Ok(0) => return Err(LinkError::EngineDisconnected),
                Ok(n) => return Ok(&self.buffer[..n]),
                Err(err) if should_retry_read_error(&err) => {
                    thread::sleep(EXIT_POLL_INTERVAL);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "engine read error");
                    return Err(LinkError::EngineDisconnected);
                }
            }
        }
    }
}

pub(crate) fn should_retry_read_error(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock
}

fn wait_for_exit(child: &mut Child, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(pid = child.id(), %status, "audio engine exited");
                return true;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to poll audio engine");
                return false;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

enum Signal {
    Term,
}

fn send_signal(pid: u32, signal: Signal) {
    #[cfg(unix)]
    unsafe {
        let signo = match signal {
            Signal::Term => libc::SIGTERM,
        };
        if libc::kill(pid as i32, signo) != 0 {
            tracing::debug!(
                pid,
                signo,
                error = %io::Error::last_os_error(),
                "failed to signal audio engine"
            );
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, signal);
    }
}
