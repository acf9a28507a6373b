//! Engine output plumbing: raw bytes become lines on the reader worker, lines
//! become `(tag, payload)` events on the dispatcher worker, and events go to
//! the attached voice sink (or nowhere).
//!
//! Delivery is best effort. A full line queue drops the newest line and bumps
//! a counter; there is no backpressure on the engine.


use crate::engine::EngineOutput;
use crate::session::LinkCore;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// An unterminated line longer than this is discarded.
pub const MAX_PENDING_LINE_BYTES: usize = 64 * 1024;

const VOICE_COMMAND_TAG: &str = "VCCOM";
const VOICE_ERROR_TAG: &str = "VCERR";

/// One parsed engine output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub tag: String,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    VoiceCommand,
    VoiceError,
    Other,
}

impl EngineEvent {
    pub fn new(tag: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: payload.into(),
        }
    }

    /// Sent to a sink right before it is detached.
    pub fn voice_stopped() -> Self {
        Self::new(VOICE_ERROR_TAG, "stopped_vc")
    }

    pub fn kind(&self) -> EngineEventKind {
        match self.tag.as_str() {
            VOICE_COMMAND_TAG => EngineEventKind::VoiceCommand,
            VOICE_ERROR_TAG => EngineEventKind::VoiceError,
            _ => EngineEventKind::Other,
        }
    }
}

/// Split a line on its first `:`. Without a separator the whole line is the
/// payload and the tag is empty. Blank lines carry nothing and are dropped.
pub fn parse_line(line: &str) -> Option<EngineEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return None;
    }
    Some(match line.split_once(':') {
        Some((tag, payload)) => EngineEvent::new(tag, payload),
        None => EngineEvent::new("", line),
    })
}

/// Bytes received from the engine that do not yet end in a newline.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Remove and return every complete line, keeping the trailing fragment.
    pub fn take_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            self.enforce_limit();
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        let lines = complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();
        self.enforce_limit();
        lines
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn enforce_limit(&mut self) {
        if self.pending.len() > MAX_PENDING_LINE_BYTES {
            tracing::warn!(
                bytes = self.pending.len(),
                "discarding oversized unterminated engine line"
            );
            self.pending.clear();
        }
    }
}

/// Read engine output until EOF or shutdown, queueing complete lines.
pub(crate) fn spawn_reader_thread(
    mut output: EngineOutput,
    lines: Sender<String>,
    core: Arc<LinkCore>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buffer = LineBuffer::default();
        while !core.is_shutting_down() {
            let chunk = match output.read_chunk() {
                Ok(chunk) => chunk,
                Err(err) => {
                    if !core.is_shutting_down() {
                        core.engine_lost(err.to_string());
                    }
                    break;
                }
            };
            buffer.extend(chunk);
            for line in buffer.take_lines() {
                match lines.try_send(line) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => core.record_dropped_line(),
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
        }
        tracing::debug!("engine reader exiting");
    })
}

/// Forward queued lines to the voice sink, waking at least every `interval`
/// to observe shutdown.
pub(crate) fn spawn_dispatcher_thread(
    lines: Receiver<String>,
    core: Arc<LinkCore>,
    interval: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !core.is_shutting_down() {
            match lines.recv_timeout(interval) {
                Ok(first) => {
                    let batch = std::iter::once(first).chain(lines.try_iter());
                    for event in batch.filter_map(|line| parse_line(&line)) {
                        core.deliver_event(&event);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("event dispatcher exiting");
    })
}
