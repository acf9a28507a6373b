//! JSON-lines control surface over stdin/stdout.
//!
//! Lets an external frontend drive the coordinator without linking against it.
//!
//! Architecture:
//! - Stdin reader thread: parses JSON commands, forwards them over a channel
//! - Main loop: selects over commands, status notifications, and voice events
//!
//! Protocol:
//! - Each line is a JSON object
//! - Commands (client → voxlink): {"cmd": "...", ...}
//! - Events (voxlink → client): {"event": "...", ...}

mod protocol;
mod session;


pub use protocol::{IpcCommand, IpcEvent};
pub use session::{run_ipc_loop, run_ipc_mode, spawn_stdin_reader, CommandLine};
