use super::protocol::{volume_from_json, IpcCommand, IpcEvent};
use crate::dispatch::{EngineEvent, EngineEventKind};
use crate::session::{Coordinator, LinkStatus, SessionMode, VoiceSink};
use crate::voice::Vocabulary;
use anyhow::Result;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

/// A parsed command, or the reason a line could not be parsed.
pub type CommandLine = std::result::Result<IpcCommand, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Serve the coordinator over stdin/stdout until stdin closes or a
/// `shutdown` command arrives.
pub fn run_ipc_mode(coordinator: &Coordinator, vocabulary: Option<&Vocabulary>) -> Result<()> {
    tracing::info!("starting JSON IPC mode");
    let (cmd_tx, cmd_rx) = unbounded();
    let _stdin_handle = spawn_stdin_reader(io::stdin(), cmd_tx);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_ipc_loop(coordinator, &cmd_rx, vocabulary, &mut out)
}

/// Read JSON commands line by line; blank lines are skipped.
pub fn spawn_stdin_reader<R>(input: R, tx: Sender<CommandLine>) -> thread::JoinHandle<()>
where
    R: io::Read + Send + 'static,
{
    thread::spawn(move || {
        let reader = io::BufReader::new(input);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<IpcCommand>(trimmed)
                .map_err(|err| format!("Invalid command: {err}"));
            if tx.send(parsed).is_err() {
                break;
            }
        }
        tracing::debug!("stdin reader exiting");
    })
}

pub fn run_ipc_loop<W: Write>(
    coordinator: &Coordinator,
    commands: &Receiver<CommandLine>,
    vocabulary: Option<&Vocabulary>,
    out: &mut W,
) -> Result<()> {
    let (status_tx, status_rx) = unbounded::<LinkStatus>();
    coordinator.subscribe(Arc::new(status_tx));
    let (voice_tx, voice_rx) = unbounded::<EngineEvent>();
    let sink: Arc<dyn VoiceSink> = Arc::new(voice_tx);

    send_event(
        out,
        &IpcEvent::Ready {
            version: env!("CARGO_PKG_VERSION").to_string(),
            control_addr: coordinator.control_addr().map(|addr| addr.to_string()),
            engine_available: coordinator.engine_available(),
        },
    )?;

    loop {
        select! {
            recv(commands) -> msg => match msg {
                Ok(Ok(command)) => {
                    if handle_command(coordinator, command, &sink, out)? == Flow::Exit {
                        break;
                    }
                }
                Ok(Err(message)) => send_event(
                    out,
                    &IpcEvent::Error {
                        message,
                        recoverable: true,
                    },
                )?,
                Err(_) => {
                    tracing::debug!("command channel closed");
                    break;
                }
            },
            recv(status_rx) -> status => {
                if let Ok(status) = status {
                    send_event(out, &status_event(&status))?;
                }
            }
            recv(voice_rx) -> event => {
                if let Ok(event) = event {
                    forward_voice_event(&event, vocabulary, out)?;
                }
            }
        }
    }

    // Flush notifications produced by the last command.
    for status in status_rx.try_iter() {
        send_event(out, &status_event(&status))?;
    }
    for event in voice_rx.try_iter() {
        forward_voice_event(&event, vocabulary, out)?;
    }
    Ok(())
}

fn handle_command<W: Write>(
    coordinator: &Coordinator,
    command: IpcCommand,
    sink: &Arc<dyn VoiceSink>,
    out: &mut W,
) -> Result<Flow> {
    let name = command.name();
    let result = match command {
        IpcCommand::Start { host, port, mode } => {
            let port = port.unwrap_or(coordinator.settings().server_data_port);
            mode.as_deref()
                .map_or(Ok(SessionMode::Both), str::parse)
                .and_then(|mode| coordinator.start(&host, port, mode))
        }
        IpcCommand::Stop => coordinator.stop(),
        IpcCommand::SetVolume { volume } => {
            volume_from_json(&volume).and_then(|volume| coordinator.set_volume(volume))
        }
        IpcCommand::StartVoice => coordinator.start_voice(sink),
        IpcCommand::StopVoice => coordinator.stop_voice(),
        IpcCommand::Status => {
            send_event(
                out,
                &IpcEvent::State {
                    session: coordinator.session_state(),
                    listener: coordinator.listener_phase(),
                    voice_attached: coordinator.voice_attached(),
                    engine_available: coordinator.engine_available(),
                    dropped_lines: coordinator.dropped_lines(),
                },
            )?;
            return Ok(Flow::Continue);
        }
        IpcCommand::Shutdown => {
            send_event(out, &IpcEvent::Ok { cmd: name.into() })?;
            return Ok(Flow::Exit);
        }
    };

    match result {
        Ok(()) => send_event(out, &IpcEvent::Ok { cmd: name.into() })?,
        Err(err) => {
            tracing::debug!(cmd = name, error = %err, "command rejected");
            send_event(out, &IpcEvent::from_link_error(&err))?;
        }
    }
    Ok(Flow::Continue)
}

fn status_event(status: &LinkStatus) -> IpcEvent {
    let reason = match status {
        LinkStatus::EngineLost { reason } => Some(reason.clone()),
        _ => None,
    };
    IpcEvent::Status {
        status: status.label().to_string(),
        host: status.host().map(str::to_string),
        reason,
    }
}

fn forward_voice_event<W: Write>(
    event: &EngineEvent,
    vocabulary: Option<&Vocabulary>,
    out: &mut W,
) -> Result<()> {
    send_event(
        out,
        &IpcEvent::Voice {
            tag: event.tag.clone(),
            payload: event.payload.clone(),
        },
    )?;
    if event.kind() == EngineEventKind::VoiceCommand {
        if let Some(command) = vocabulary.and_then(|vocab| vocab.parse(&event.payload)) {
            send_event(
                out,
                &IpcEvent::VoiceCommand {
                    name: command.name,
                    args: command.args,
                },
            )?;
        }
    }
    Ok(())
}

pub(super) fn send_event<W: Write>(out: &mut W, event: &IpcEvent) -> Result<()> {
    let json = serde_json::to_string(event)?;
    writeln!(out, "{json}")?;
    out.flush()?;
    Ok(())
}
