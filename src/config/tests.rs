use super::validation::{sanitize_binary, split_engine_command};
use super::{AppConfig, DEFAULT_CLIENT_DATA_PORT, DEFAULT_CONTROL_PORT, DEFAULT_SERVER_DATA_PORT};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

#[test]
fn defaults_validate() {
    let mut cfg = AppConfig::parse_from(["test-app"]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.control_port, DEFAULT_CONTROL_PORT);
    assert_eq!(cfg.server_data_port, DEFAULT_SERVER_DATA_PORT);
    assert_eq!(cfg.client_data_port, DEFAULT_CLIENT_DATA_PORT);
}

#[test]
fn link_settings_reflect_flags() {
    let cfg = AppConfig::parse_from([
        "test-app",
        "--bind",
        "127.0.0.1",
        "--control-port",
        "20000",
        "--dispatch-interval-ms",
        "20",
        "--engine",
        "audio -v",
        "--engine-arg=--device=hw:0",
    ]);
    let settings = cfg.link_settings().expect("settings");
    assert_eq!(
        settings.control_bind,
        Some("127.0.0.1:20000".parse::<SocketAddr>().unwrap())
    );
    assert_eq!(settings.dispatch_interval, Duration::from_millis(20));
    assert_eq!(settings.engine_program, "audio");
    assert_eq!(settings.engine_args, vec!["-v", "--device=hw:0"]);
}

#[test]
fn no_listen_disables_control_bind() {
    let cfg = AppConfig::parse_from(["test-app", "--no-listen"]);
    let settings = cfg.link_settings().expect("settings");
    assert!(settings.control_bind.is_none());
}

#[test]
fn rejects_zero_port() {
    let mut cfg = AppConfig::parse_from(["test-app", "--control-port", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_colliding_ports() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--server-data-port",
        "19104",
        "--client-data-port",
        "19104",
    ]);
    let err = cfg.validate().unwrap_err().to_string();
    assert!(err.contains("--server-data-port"));
    assert!(err.contains("--client-data-port"));
}

#[test]
fn rejects_dispatch_interval_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--dispatch-interval-ms", "0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--dispatch-interval-ms", "1001"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_handshake_timeout_shorter_than_poll() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--accept-poll-ms",
        "500",
        "--handshake-timeout-ms",
        "100",
    ]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_line_queue_capacity_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--line-queue-capacity", "4"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_unparseable_bind_host() {
    let mut cfg = AppConfig::parse_from(["test-app", "--bind", "not-an-ip"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_missing_vocabulary_file() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--vocabulary",
        "/definitely/not/here/vocab.yaml",
    ]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_too_many_engine_args() {
    let mut args = vec!["test-app".to_string()];
    for i in 0..65 {
        args.push("--engine-arg".to_string());
        args.push(format!("a{i}"));
    }
    let mut cfg = AppConfig::parse_from(args);
    assert!(cfg.validate().is_err());
}

#[test]
fn split_engine_command_respects_quotes() {
    let (program, args) = split_engine_command("audio --name 'left channel'");
    assert_eq!(program, "audio");
    assert_eq!(args, vec!["--name", "left channel"]);

    let (program, args) = split_engine_command("   ");
    assert!(program.is_empty());
    assert!(args.is_empty());
}

#[test]
fn sanitize_binary_accepts_plain_names() {
    assert_eq!(sanitize_binary("audio", "--engine").unwrap(), "audio");
    assert_eq!(
        sanitize_binary(" audio-engine_2 ", "--engine").unwrap(),
        "audio-engine_2"
    );
}

#[test]
fn sanitize_binary_rejects_empty_and_shell_syntax() {
    assert!(sanitize_binary("", "--engine").is_err());
    assert!(sanitize_binary("audio;rm", "--engine").is_err());
}

#[cfg(unix)]
#[test]
fn sanitize_binary_canonicalizes_executable_paths() {
    let resolved = sanitize_binary("/bin/sh", "--engine").expect("sh exists");
    assert!(resolved.starts_with('/'));
    assert!(sanitize_binary("/definitely/missing/engine", "--engine").is_err());
}

#[cfg(unix)]
#[test]
fn sanitize_binary_rejects_non_executable_file() {
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("voxlink_not_exec_{nanos}"));
    fs::write(&path, "data").expect("write temp file");
    let result = sanitize_binary(path.to_str().unwrap(), "--engine");
    let _ = fs::remove_file(&path);
    assert!(result.is_err());
}
