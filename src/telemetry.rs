//! Tracing setup. Stdout carries the JSON control surface, so log output goes
//! either to a JSONL file (`--logs`) or to stderr at WARN level.

use crate::config::AppConfig;
use std::env;
use std::fs::OpenOptions;
use std::panic;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static PANIC_HOOK_INIT: OnceLock<()> = OnceLock::new();

/// Where `--logs` writes structured trace lines.
pub fn tracing_log_path() -> PathBuf {
    env::var("VOXLINK_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("voxlink_trace.jsonl"))
}

/// Install the global subscriber once; later calls are no-ops.
pub fn init_tracing(config: &AppConfig) {
    if config.no_logs {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        if config.logs {
            let path = tracing_log_path();
            let file = match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("voxlink: cannot open trace log {}: {err}", path.display());
                    return;
                }
            };
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_max_level(Level::DEBUG)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(file)
                .with_current_span(false)
                .with_span_list(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        } else {
            let subscriber = tracing_subscriber::fmt()
                .compact()
                .with_max_level(Level::WARN)
                .with_writer(std::io::stderr)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    });
}

/// Record panics through tracing before the default hook prints them.
pub fn install_panic_hook() {
    let _ = PANIC_HOOK_INIT.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "unknown".to_string());
            tracing::error!(
                location = %location,
                version = env!("CARGO_PKG_VERSION"),
                "panic"
            );
            previous(info);
        }));
    });
}
