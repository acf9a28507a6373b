//! VoxLink entrypoint: one audio engine, one session, driven over stdin/stdout.
//!
//! Spawns the audio engine, starts the coordinator workers, and serves the
//! JSON-lines control surface until stdin closes or a `shutdown` command
//! arrives. Remote peers may open sessions through the control port meanwhile.
//!
//! # Architecture
//!
//! - Engine reader: splits engine stdout into lines
//! - Dispatcher: forwards parsed engine events to the voice sink
//! - Control listener: accepts inbound session handshakes
//! - Main thread: JSON command loop

use anyhow::Result;
use voxlink::ipc::run_ipc_mode;
use voxlink::telemetry::{init_tracing, install_panic_hook, tracing_log_path};
use voxlink::{AppConfig, Coordinator, Vocabulary};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_tracing(&config);
    install_panic_hook();
    if config.logs && !config.no_logs {
        tracing::info!(path = %tracing_log_path().display(), "voxlink starting");
    }

    let vocabulary = match &config.vocabulary {
        Some(path) => {
            let vocabulary = Vocabulary::load(path)?;
            tracing::info!(commands = vocabulary.len(), "voice vocabulary loaded");
            Some(vocabulary)
        }
        None => None,
    };

    let coordinator = Coordinator::spawn(config.link_settings()?)?;
    let result = run_ipc_mode(&coordinator, vocabulary.as_ref());
    coordinator.destroy();
    if let Err(err) = &result {
        tracing::error!(error = %err, "control loop failed");
    }
    result
}
