use super::defaults::{MAX_ENGINE_ARGS, MAX_ENGINE_ARG_BYTES};
use super::{AppConfig, LinkSettings};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::Path,
    time::Duration,
};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values before anything is spawned or bound.
    pub fn validate(&mut self) -> Result<()> {
        self.resolve_engine()?;
        self.bind_addr()?;

        let ports = [
            ("--control-port", self.control_port),
            ("--server-data-port", self.server_data_port),
            ("--client-data-port", self.client_data_port),
        ];
        for (flag, port) in ports {
            if port == 0 {
                bail!("{flag} must be a non-zero port");
            }
        }
        for (i, (flag_a, port_a)) in ports.iter().enumerate() {
            for (flag_b, port_b) in &ports[i + 1..] {
                if port_a == port_b {
                    bail!("{flag_a} and {flag_b} must differ, both are {port_a}");
                }
            }
        }

        if !(5..=1000).contains(&self.dispatch_interval_ms) {
            bail!(
                "--dispatch-interval-ms must be between 5 and 1000, got {}",
                self.dispatch_interval_ms
            );
        }
        if !(10..=5000).contains(&self.accept_poll_ms) {
            bail!(
                "--accept-poll-ms must be between 10 and 5000, got {}",
                self.accept_poll_ms
            );
        }
        if self.handshake_timeout_ms < self.accept_poll_ms || self.handshake_timeout_ms > 60_000 {
            bail!(
                "--handshake-timeout-ms must be between --accept-poll-ms ({}) and 60000",
                self.accept_poll_ms
            );
        }
        if self.shutdown_grace_ms > 10_000 {
            bail!(
                "--shutdown-grace-ms must be at most 10000, got {}",
                self.shutdown_grace_ms
            );
        }
        if !(8..=4096).contains(&self.line_queue_capacity) {
            bail!(
                "--line-queue-capacity must be between 8 and 4096, got {}",
                self.line_queue_capacity
            );
        }

        if let Some(path) = &self.vocabulary {
            if !path.is_file() {
                bail!("vocabulary file '{}' does not exist", path.display());
            }
        }

        Ok(())
    }

    /// Snapshot the validated settings for the coordinator.
    pub fn link_settings(&self) -> Result<LinkSettings> {
        let (engine_program, engine_args) = self.resolve_engine()?;
        let control_bind = if self.no_listen {
            None
        } else {
            Some(self.bind_addr()?)
        };
        Ok(LinkSettings {
            engine_program,
            engine_args,
            control_bind,
            server_data_port: self.server_data_port,
            client_data_port: self.client_data_port,
            dispatch_interval: Duration::from_millis(self.dispatch_interval_ms),
            accept_poll: Duration::from_millis(self.accept_poll_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            line_queue_capacity: self.line_queue_capacity,
        })
    }

    fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_host
            .trim()
            .parse()
            .with_context(|| format!("--bind must be an IP address, got '{}'", self.bind_host))?;
        Ok(SocketAddr::new(ip, self.control_port))
    }

    /// Split `--engine` into program and arguments, then append `--engine-arg`s.
    fn resolve_engine(&self) -> Result<(String, Vec<String>)> {
        let (program, mut args) = split_engine_command(&self.engine_cmd);
        let program = sanitize_binary(&program, "--engine")?;
        args.extend(self.engine_args.iter().cloned());

        // Avoid huge argument lists when spawning the engine.
        if args.len() > MAX_ENGINE_ARGS {
            bail!(
                "too many engine arguments (max {MAX_ENGINE_ARGS}, got {})",
                args.len()
            );
        }
        let total_arg_bytes: usize = args.iter().map(|arg| arg.len()).sum();
        if total_arg_bytes > MAX_ENGINE_ARG_BYTES {
            bail!("combined engine arguments exceed {MAX_ENGINE_ARG_BYTES} bytes");
        }
        Ok((program, args))
    }
}

pub(super) fn split_engine_command(raw: &str) -> (String, Vec<String>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (String::new(), Vec::new());
    }
    let parts = shell_words::split(trimmed)
        .unwrap_or_else(|_| trimmed.split_whitespace().map(|s| s.to_string()).collect());
    match parts.split_first() {
        Some((program, args)) => (program.clone(), args.to_vec()),
        None => (String::new(), Vec::new()),
    }
}

/// Allow a bare program name (resolved through PATH) or an existing executable path.
pub(super) fn sanitize_binary(value: &str, flag: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    {
        bail!("{flag} must be a plain program name or a path, got '{trimmed}'");
    }
    Ok(trimmed.to_string())
}
