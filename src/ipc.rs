//! C6 — the control channel server and client.
//!
//! A Unix-domain stream socket, one JSON request per connection, one JSON response, then the
//! connection closes. The same binary is both daemon (server) and CLI (client); client mode is
//! selected by subcommand in `cli.rs`.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::registry::{Registry, ServiceState};
use crate::runtime;

fn runtime_dir() -> Result<PathBuf, ControlError> {
    let path = runtime::state_dir();
    fs::create_dir_all(&path)?;
    Ok(path)
}

/// The fixed, documented, stable-across-releases control socket path.
pub fn socket_path() -> Result<PathBuf, ControlError> {
    Ok(runtime_dir()?.join("control.sock"))
}

/// A request sent by a CLI invocation to the resident daemon.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlCommand {
    /// List every service currently tracked by the registry.
    #[serde(rename = "list_services")]
    ListServices,
    /// A short human-readable status summary.
    #[serde(rename = "get_status")]
    GetStatus,
    /// Restart a named service.
    #[serde(rename = "restart_service")]
    RestartService {
        /// The service to restart.
        service_name: String,
    },
}

/// One service's state as reported to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name.
    pub name: String,
    /// Current lifecycle state, as its enum name.
    pub state: String,
    /// Live child pid, or 0 if none.
    pub pid: u32,
    /// Seconds since this instance started.
    pub uptime: u64,
    /// Last recorded error, empty string if none.
    pub last_error: String,
    /// Whether the service is marked `required`.
    pub required: bool,
}

/// The response returned for any request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// Optional human-readable text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Populated only for `list_services`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<ServiceInfo>>,
}

impl ControlResponse {
    fn ok(message: impl Into<String>) -> Self {
        ControlResponse {
            success: true,
            message: Some(message.into()),
            services: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        ControlResponse {
            success: false,
            message: Some(message.into()),
            services: None,
        }
    }
}

/// Send `command` to the resident daemon and wait for its one-line JSON response.
pub fn send_command(command: &ControlCommand) -> Result<ControlResponse, ControlError> {
    let path = socket_path()?;
    if !path.exists() {
        return Err(ControlError::NotAvailable);
    }

    let mut stream = UnixStream::connect(path)?;
    let payload = serde_json::to_vec(command)?;
    stream.write_all(&payload)?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    if response_line.trim().is_empty() {
        return Err(ControlError::NotAvailable);
    }

    let response: ControlResponse = serde_json::from_str(response_line.trim())?;
    if !response.success {
        return Err(ControlError::Server(
            response.message.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(response)
}

/// The result of parsing one request line: either a recognized command, or a well-formed JSON
/// object whose `type` field names no known verb (distinct from malformed JSON, which is an
/// error — see `read_command`).
pub enum ParsedCommand {
    /// A recognized verb, ready for `handle_command`.
    Known(ControlCommand),
    /// A well-formed request object with an unrecognized `type`.
    UnknownType(String),
}

/// Read exactly one request from an accepted connection. Malformed JSON (unparseable, or not a
/// JSON object) is surfaced as an error so the caller can close the connection without a
/// response, per the control-protocol error semantics. A well-formed object with an unrecognized
/// `type` is returned as `ParsedCommand::UnknownType` so the caller can answer with the spec'd
/// `{success: false, message: "Unknown command type"}` response instead of dropping the
/// connection.
pub fn read_command(stream: &mut UnixStream) -> Result<ParsedCommand, ControlError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    if line.trim().is_empty() {
        return Err(ControlError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "empty control command",
        )));
    }

    let value: serde_json::Value = serde_json::from_str(line.trim())?;
    match serde_json::from_value::<ControlCommand>(value.clone()) {
        Ok(command) => Ok(ParsedCommand::Known(command)),
        Err(err) => match value.get("type").and_then(|t| t.as_str()) {
            Some(type_name) => Ok(ParsedCommand::UnknownType(type_name.to_string())),
            None => Err(ControlError::Serde(err)),
        },
    }
}

/// Write exactly one response and let the caller close the connection.
pub fn write_response(stream: &mut UnixStream, response: &ControlResponse) -> Result<(), ControlError> {
    let payload = serde_json::to_vec(response)?;
    stream.write_all(&payload)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}

/// Remove the socket file. Called once by the shutdown coordinator and defensively at daemon
/// startup to clear a stale file from a prior unclean exit.
pub fn cleanup_socket() -> Result<(), ControlError> {
    if let Ok(path) = socket_path()
        && path.exists()
    {
        let _ = fs::remove_file(path);
    }
    Ok(())
}

/// Handle one already-parsed request against the live registry. Restart is dispatched to
/// `restart` without waiting for the new instance to finish starting, per the spec's
/// fire-and-respond semantics. An unrecognized `type` answers with `{success: false, message:
/// "Unknown command type"}` rather than the malformed-JSON close-without-response path.
pub fn handle_command(
    command: ParsedCommand,
    registry: &Registry,
    restart: impl FnOnce(&str) + Send + 'static,
) -> ControlResponse {
    let command = match command {
        ParsedCommand::Known(command) => command,
        ParsedCommand::UnknownType(_) => {
            return ControlResponse::error("Unknown command type");
        }
    };
    match command {
        ControlCommand::ListServices => {
            let services = registry
                .snapshot()
                .iter()
                .map(|p| ServiceInfo {
                    name: p.name.clone(),
                    state: state_name(p.get_state()).to_string(),
                    pid: p.get_pid().unwrap_or(0),
                    uptime: p.uptime_secs(),
                    last_error: p.get_error().unwrap_or_default(),
                    required: p.spec.required,
                })
                .collect();
            ControlResponse {
                success: true,
                message: None,
                services: Some(services),
            }
        }
        ControlCommand::GetStatus => {
            let snapshot = registry.snapshot();
            let total = snapshot.len();
            let running = snapshot
                .iter()
                .filter(|p| p.get_state() == ServiceState::Running)
                .count();
            let failed = snapshot
                .iter()
                .filter(|p| p.get_state() == ServiceState::Failed)
                .count();
            ControlResponse::ok(format!(
                "{total} service(s): {running} running, {failed} failed"
            ))
        }
        ControlCommand::RestartService { service_name } => {
            if registry.get(&service_name).is_none() {
                return ControlResponse::error(format!("unknown service '{service_name}'"));
            }
            let name = service_name.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(1));
                restart(&name);
            });
            ControlResponse::ok(format!("restart requested for '{service_name}'"))
        }
    }
}

fn state_name(state: ServiceState) -> &'static str {
    match state {
        ServiceState::Pending => "PENDING",
        ServiceState::Starting => "STARTING",
        ServiceState::Running => "RUNNING",
        ServiceState::Stopping => "STOPPING",
        ServiceState::Stopped => "STOPPED",
        ServiceState::Failed => "FAILED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn request_round_trips_over_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("test.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let command = read_command(&mut stream).unwrap();
            assert!(matches!(command, ParsedCommand::Known(ControlCommand::GetStatus)));
            write_response(&mut stream, &ControlResponse::ok("0 service(s): 0 running, 0 failed"))
                .unwrap();
        });

        let mut client = UnixStream::connect(&socket).unwrap();
        let payload = serde_json::to_vec(&ControlCommand::GetStatus).unwrap();
        client.write_all(&payload).unwrap();
        client.write_all(b"\n").unwrap();
        client.flush().unwrap();

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let response: ControlResponse = serde_json::from_str(line.trim()).unwrap();
        assert!(response.success);

        server.join().unwrap();
    }

    #[test]
    fn unknown_service_restart_returns_error_response() {
        let registry = Registry::new();
        let response = handle_command(
            ParsedCommand::Known(ControlCommand::RestartService {
                service_name: "ghost".into(),
            }),
            &registry,
            |_| {},
        );
        assert!(!response.success);
    }

    #[test]
    fn unrecognized_type_returns_unknown_command_type_response() {
        let registry = Registry::new();
        let response = handle_command(
            ParsedCommand::UnknownType("frobnicate_service".into()),
            &registry,
            |_| {},
        );
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Unknown command type"));
    }

    #[test]
    fn unrecognized_type_over_the_wire_gets_a_response_not_a_dropped_connection() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("unknown_type.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let command = read_command(&mut stream).unwrap();
            let registry = Registry::new();
            let response = handle_command(command, &registry, |_| {});
            write_response(&mut stream, &response).unwrap();
        });

        let mut client = UnixStream::connect(&socket).unwrap();
        client
            .write_all(br#"{"type":"frobnicate_service"}"#)
            .unwrap();
        client.write_all(b"\n").unwrap();
        client.flush().unwrap();

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let response: ControlResponse = serde_json::from_str(line.trim()).unwrap();
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Unknown command type"));

        server.join().unwrap();
    }

    #[test]
    fn list_services_on_empty_registry_returns_empty_list() {
        let registry = Registry::new();
        let response = handle_command(ParsedCommand::Known(ControlCommand::ListServices), &registry, |_| {});
        assert_eq!(response.services.unwrap().len(), 0);
    }
}
