//! Inbound control listener.
//!
//! A peer connects to the control port, sends one line naming the mode
//! (`mic`, `speaker`, `both`), and keeps the connection open for the life of
//! the session. Sending `shutdown` on it, closing it, or breaking it ends the
//! session. Every blocking call is bounded so the shutdown flag is observed
//! between iterations.

#[cfg(test)]
mod tests;

use crate::session::{LinkCore, ListenerPhase, SessionMode, SessionState};
use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Handshake and teardown lines are tiny; anything longer is garbage.
pub const MAX_CONTROL_LINE_BYTES: usize = 1024;

const TEARDOWN_PAYLOAD: &str = "shutdown";

/// Why an inbound session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    Requested,
    PeerClosed,
    ConnectionError,
    Shutdown,
}

pub(crate) fn bind_control_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub(crate) fn spawn_listener_thread(
    listener: TcpListener,
    core: Arc<LinkCore>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let poll = core.settings().accept_poll;
        core.set_listener_phase(ListenerPhase::Listening);
        while !core.is_shutting_down() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    tracing::info!(%peer, "control connection accepted");
                    if let Err(err) = serve_connection(stream, peer, &core) {
                        tracing::warn!(%peer, error = %err, "control connection failed");
                    }
                    if !core.is_shutting_down() {
                        core.set_listener_phase(ListenerPhase::Listening);
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(poll),
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    thread::sleep(poll);
                }
            }
        }
        drop(listener);
        core.set_listener_phase(ListenerPhase::Closed);
        tracing::debug!("control listener exiting");
    })
}

fn serve_connection(stream: TcpStream, peer: SocketAddr, core: &LinkCore) -> io::Result<()> {
    let settings = core.settings();
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(settings.accept_poll))?;
    let mut reader = BufReader::new(&stream);

    let deadline = Instant::now() + settings.handshake_timeout;
    let Some(line) = read_handshake_line(&mut reader, core, deadline)? else {
        tracing::warn!(%peer, "handshake not received; closing");
        return close(&stream);
    };
    let mode = match line.parse::<SessionMode>() {
        Ok(mode) => mode,
        Err(err) => {
            tracing::warn!(%peer, error = %err, "rejecting handshake");
            return close(&stream);
        }
    };

    let session = match core.begin_session(
        &peer.ip().to_string(),
        settings.client_data_port,
        mode,
        settings.server_data_port,
    ) {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(%peer, error = %err, "inbound session refused");
            return close(&stream);
        }
    };
    core.set_listener_phase(ListenerPhase::SessionWaiting { peer: peer.ip() });

    let teardown = wait_for_teardown(&mut reader, core);
    tracing::info!(%peer, ?teardown, "inbound session ending");
    if teardown != Teardown::Shutdown {
        end_inbound_session(core, &session);
    }
    close(&stream)
}

fn end_inbound_session(core: &LinkCore, session: &SessionState) {
    if let Err(err) = core.stop_if_current(session) {
        tracing::warn!(error = %err, "inbound teardown incomplete");
    }
}

fn close(stream: &TcpStream) -> io::Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(err) if err.kind() != ErrorKind::NotConnected => Err(err),
        _ => Ok(()),
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// First line from the peer, or `None` on timeout, shutdown, or a line that
/// never ends. A final line without a newline before EOF still counts.
pub(crate) fn read_handshake_line<R: BufRead>(
    reader: &mut R,
    core: &LinkCore,
    deadline: Instant,
) -> io::Result<Option<String>> {
    let mut pending = Vec::new();
    loop {
        if core.is_shutting_down() || Instant::now() >= deadline {
            return Ok(None);
        }
        let budget = (MAX_CONTROL_LINE_BYTES + 1).saturating_sub(pending.len()) as u64;
        match reader.by_ref().take(budget).read_until(b'\n', &mut pending) {
            Ok(0) => return Ok(complete_line(&pending)),
            Ok(_) if pending.ends_with(b"\n") => return Ok(complete_line(&pending)),
            Ok(_) if pending.len() > MAX_CONTROL_LINE_BYTES => return Ok(None),
            Ok(_) => {}
            Err(err) if is_timeout(&err) || err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
}

fn complete_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Block on the session connection until the peer asks to stop, goes away,
/// or the coordinator shuts down. Other lines are ignored, and a line longer
/// than `MAX_CONTROL_LINE_BYTES` is skipped through to its newline.
pub(crate) fn wait_for_teardown<R: BufRead>(reader: &mut R, core: &LinkCore) -> Teardown {
    let mut pending = Vec::new();
    let mut discarding = false;
    loop {
        if core.is_shutting_down() {
            return Teardown::Shutdown;
        }
        let budget = (MAX_CONTROL_LINE_BYTES + 1).saturating_sub(pending.len()) as u64;
        match reader.by_ref().take(budget).read_until(b'\n', &mut pending) {
            Ok(0) => {
                let line = (!discarding).then(|| complete_line(&pending)).flatten();
                if line.as_deref() == Some(TEARDOWN_PAYLOAD) {
                    return Teardown::Requested;
                }
                return Teardown::PeerClosed;
            }
            Ok(_) if pending.ends_with(b"\n") => {
                let line = (!discarding).then(|| complete_line(&pending)).flatten();
                pending.clear();
                discarding = false;
                if line.as_deref() == Some(TEARDOWN_PAYLOAD) {
                    return Teardown::Requested;
                }
                if let Some(line) = line {
                    tracing::debug!(line = %line, "ignoring control line during session");
                }
            }
            Ok(_) if pending.len() > MAX_CONTROL_LINE_BYTES => {
                if !discarding {
                    tracing::warn!("oversized control line from peer; discarding");
                }
                pending.clear();
                discarding = true;
            }
            // Unterminated and within budget: EOF comes next.
            Ok(_) => {}
            Err(err) if is_timeout(&err) || err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                tracing::debug!(error = %err, "control connection error");
                return Teardown::ConnectionError;
            }
        }
    }
}
