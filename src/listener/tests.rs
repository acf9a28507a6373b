use super::*;
use crate::session::{Coordinator, SessionState, VoiceSink};
use crate::test_support::{
    coordinator_with, fake_engine, listening_settings, test_settings, wait_until, FakeEngine,
};
use crossbeam_channel::unbounded;
use std::io::{Cursor, Write};
use std::net::IpAddr;

const WAIT: Duration = Duration::from_secs(3);

fn test_core() -> LinkCore {
    let (handle, _output, _fake) = fake_engine();
    LinkCore::new(handle, test_settings())
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

struct BrokenReader;

impl Read for BrokenReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::from(ErrorKind::ConnectionReset))
    }
}

fn listening() -> (Coordinator, FakeEngine, SocketAddr) {
    let (coordinator, fake) = coordinator_with(listening_settings());
    let addr = coordinator.control_addr().expect("listener bound");
    assert!(wait_until(WAIT, || coordinator.listener_phase()
        == ListenerPhase::Listening));
    (coordinator, fake, addr)
}

fn dial(addr: SocketAddr, handshake: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(3)))
        .unwrap();
    stream.write_all(handshake.as_bytes()).unwrap();
    stream
}

#[test]
fn handshake_line_is_trimmed() {
    let core = test_core();
    let mut reader = Cursor::new(b"  Mic \r\nextra\n".to_vec());
    assert_eq!(
        read_handshake_line(&mut reader, &core, far_deadline()).unwrap(),
        Some("Mic".to_string())
    );
}

#[test]
fn handshake_without_newline_before_eof_counts() {
    let core = test_core();
    let mut reader = Cursor::new(b"speaker".to_vec());
    assert_eq!(
        read_handshake_line(&mut reader, &core, far_deadline()).unwrap(),
        Some("speaker".to_string())
    );
}

#[test]
fn empty_or_oversized_handshake_is_rejected() {
    let core = test_core();
    let mut reader = Cursor::new(Vec::new());
    assert_eq!(
        read_handshake_line(&mut reader, &core, far_deadline()).unwrap(),
        None
    );

    let mut reader = Cursor::new(vec![b'a'; MAX_CONTROL_LINE_BYTES * 2]);
    assert_eq!(
        read_handshake_line(&mut reader, &core, far_deadline()).unwrap(),
        None
    );
}

#[test]
fn handshake_gives_up_after_deadline_or_shutdown() {
    let core = test_core();
    let mut reader = Cursor::new(b"mic\n".to_vec());
    assert_eq!(
        read_handshake_line(&mut reader, &core, Instant::now()).unwrap(),
        None
    );

    assert!(core.begin_shutdown());
    let mut reader = Cursor::new(b"mic\n".to_vec());
    assert_eq!(
        read_handshake_line(&mut reader, &core, far_deadline()).unwrap(),
        None
    );
}

#[test]
fn teardown_on_shutdown_line() {
    let core = test_core();
    let mut reader = Cursor::new(b"ping\n\nshutdown\n".to_vec());
    assert_eq!(wait_for_teardown(&mut reader, &core), Teardown::Requested);

    let mut reader = Cursor::new(b"shutdown".to_vec());
    assert_eq!(wait_for_teardown(&mut reader, &core), Teardown::Requested);
}

#[test]
fn teardown_on_peer_close_or_error() {
    let core = test_core();
    let mut reader = Cursor::new(b"ping\n".to_vec());
    assert_eq!(wait_for_teardown(&mut reader, &core), Teardown::PeerClosed);

    let mut reader = Cursor::new(b"shut".to_vec());
    assert_eq!(wait_for_teardown(&mut reader, &core), Teardown::PeerClosed);

    let mut reader = BufReader::new(BrokenReader);
    assert_eq!(
        wait_for_teardown(&mut reader, &core),
        Teardown::ConnectionError
    );
}

/// A peer that streams `a` bytes and never sends a newline. Once
/// `shutdown_after` bytes are out it flags the coordinator as shutting down,
/// and it gives up entirely at `limit`.
struct EndlessLine<'a> {
    core: &'a LinkCore,
    served: usize,
    shutdown_after: usize,
    limit: usize,
}

impl Read for EndlessLine<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.served >= self.shutdown_after {
            self.core.begin_shutdown();
        }
        let n = buf.len().min(self.limit - self.served);
        buf[..n].fill(b'a');
        self.served += n;
        Ok(n)
    }
}

#[test]
fn endless_line_is_read_in_bounded_chunks() {
    let core = test_core();
    let mut reader = BufReader::new(EndlessLine {
        core: &core,
        served: 0,
        shutdown_after: 64 * 1024,
        limit: 64 * 1024 * 1024,
    });
    // Each bounded read returns to the loop, so the flag is seen long before
    // the peer runs dry.
    assert_eq!(wait_for_teardown(&mut reader, &core), Teardown::Shutdown);
    assert!(reader.get_ref().served < 1024 * 1024);
}

#[test]
fn oversized_line_is_skipped_through_its_newline() {
    let core = test_core();
    let mut bytes = vec![b'a'; MAX_CONTROL_LINE_BYTES * 4];
    bytes.extend_from_slice(b"shutdown\nping\nshutdown\n");
    let mut reader = Cursor::new(bytes);
    assert_eq!(wait_for_teardown(&mut reader, &core), Teardown::Requested);
    // Only the second `shutdown` counts, so the `ping` line was consumed.
    assert_eq!(reader.position() as usize, MAX_CONTROL_LINE_BYTES * 4 + 23);

    let mut bytes = vec![b'a'; MAX_CONTROL_LINE_BYTES * 2];
    bytes.extend_from_slice(b"shutdown");
    let mut reader = Cursor::new(bytes);
    assert_eq!(wait_for_teardown(&mut reader, &core), Teardown::PeerClosed);
}

#[test]
fn teardown_wait_observes_shutdown_flag() {
    let core = test_core();
    core.begin_shutdown();
    let mut reader = Cursor::new(b"shutdown\n".to_vec());
    assert_eq!(wait_for_teardown(&mut reader, &core), Teardown::Shutdown);
}

#[test]
fn inbound_session_lifecycle() {
    let (coordinator, fake, addr) = listening();

    let mut peer = dial(addr, "mic\n");
    assert!(wait_until(WAIT, || coordinator.session_state().is_active()));
    assert_eq!(
        coordinator.session_state(),
        SessionState::Active {
            peer_host: "127.0.0.1".into(),
            peer_port: 19104,
            mode: SessionMode::Mic,
        }
    );
    assert_eq!(
        fake.commands.lines(),
        vec!["start mic -host 127.0.0.1 -port 19103"]
    );
    assert!(wait_until(WAIT, || coordinator.listener_phase()
        == ListenerPhase::SessionWaiting {
            peer: IpAddr::from([127, 0, 0, 1])
        }));

    peer.write_all(b"shutdown\n").unwrap();
    assert!(wait_until(WAIT, || coordinator.session_state().is_idle()));
    assert_eq!(fake.commands.lines().last().unwrap(), "stop both");

    // The listener takes the next peer once the first session is over.
    let _second = dial(addr, "both\n");
    assert!(wait_until(WAIT, || coordinator.session_state().is_active()));
}

#[test]
fn inbound_teardown_keeps_voice_mode() {
    let (coordinator, _fake, addr) = listening();
    let (tx, _events) = unbounded();
    let sink: Arc<dyn VoiceSink> = Arc::new(tx);

    let mut peer = dial(addr, "both\n");
    assert!(wait_until(WAIT, || coordinator.session_state().is_active()));
    coordinator.start_voice(&sink).unwrap();

    peer.write_all(b"shutdown\n").unwrap();
    assert!(wait_until(WAIT, || coordinator.session_state()
        == SessionState::VoiceOnly));
    assert!(coordinator.voice_attached());
}

#[test]
fn peer_disconnect_ends_session() {
    let (coordinator, _fake, addr) = listening();
    let peer = dial(addr, "speaker\n");
    assert!(wait_until(WAIT, || coordinator.session_state().is_active()));
    drop(peer);
    assert!(wait_until(WAIT, || coordinator.session_state().is_idle()));
}

#[test]
fn unknown_mode_is_refused() {
    let (coordinator, fake, addr) = listening();
    let mut peer = dial(addr, "stereo\n");
    let mut buf = [0u8; 8];
    assert_eq!(peer.read(&mut buf).unwrap(), 0);
    assert!(coordinator.session_state().is_idle());
    assert!(fake.commands.lines().is_empty());
}

#[test]
fn busy_coordinator_refuses_inbound_session() {
    let (coordinator, fake, addr) = listening();
    coordinator.start("10.0.0.9", 19103, SessionMode::Both).unwrap();

    let mut peer = dial(addr, "mic\n");
    let mut buf = [0u8; 8];
    assert_eq!(peer.read(&mut buf).unwrap(), 0);
    assert_eq!(fake.commands.lines().len(), 1);
    assert!(matches!(
        coordinator.session_state(),
        SessionState::Active { ref peer_host, .. } if peer_host == "10.0.0.9"
    ));
}

#[test]
fn late_teardown_leaves_replacement_session_alone() {
    let (coordinator, _fake, addr) = listening();
    let mut peer = dial(addr, "mic\n");
    assert!(wait_until(WAIT, || coordinator.session_state().is_active()));

    coordinator.stop().unwrap();
    coordinator.start("10.0.0.9", 19103, SessionMode::Both).unwrap();
    peer.write_all(b"shutdown\n").unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(peer.read(&mut buf).unwrap(), 0);

    assert!(matches!(
        coordinator.session_state(),
        SessionState::Active { ref peer_host, .. } if peer_host == "10.0.0.9"
    ));
}

#[test]
fn destroy_closes_listener_during_session() {
    let (coordinator, _fake, addr) = listening();
    let _peer = dial(addr, "mic\n");
    assert!(wait_until(WAIT, || coordinator.session_state().is_active()));

    coordinator.destroy();
    assert_eq!(coordinator.listener_phase(), ListenerPhase::Closed);
}

#[test]
fn silent_peer_times_out() {
    let (coordinator, _fake, addr) = listening();
    let mut peer = dial(addr, "");
    let mut buf = [0u8; 8];
    // Handshake timeout in tests is 500ms.
    assert_eq!(peer.read(&mut buf).unwrap(), 0);
    assert!(coordinator.session_state().is_idle());
}
