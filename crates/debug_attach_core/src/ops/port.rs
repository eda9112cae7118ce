use crate::{AttachError, ProjectKind, Result};
use regex::Regex;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::OnceLock;

static MAVEN_DEBUG_PORT: OnceLock<Regex> = OnceLock::new();
static GRADLE_DEBUG_PORT: OnceLock<Regex> = OnceLock::new();

fn debug_port_pattern(kind: ProjectKind) -> &'static Regex {
    match kind {
        ProjectKind::Maven => MAVEN_DEBUG_PORT.get_or_init(|| {
            Regex::new(r"-DdebugPort=\s*(\d+)").expect("maven debug port pattern is valid")
        }),
        ProjectKind::Gradle => GRADLE_DEBUG_PORT.get_or_init(|| {
            Regex::new(r"--libertyDebugPort=\s*(\d+)").expect("gradle debug port pattern is valid")
        }),
    }
}

/// Picks the debug port the server is asked to use: the first explicit port flag in
/// `start_parameters`, otherwise a free ephemeral port from the OS.
pub fn resolve(start_parameters: &str, kind: ProjectKind) -> Result<u16> {
    if let Some(port) = explicit_port(start_parameters, kind) {
        tracing::debug!("Using explicit debug port {} from start parameters", port);
        return Ok(port);
    }

    let port = allocate_ephemeral_port()?;
    tracing::debug!("Allocated ephemeral debug port {}", port);
    Ok(port)
}

/// First debug-port flag value in `start_parameters`, if it names a usable port.
pub fn explicit_port(start_parameters: &str, kind: ProjectKind) -> Option<u16> {
    let captures = debug_port_pattern(kind).captures(start_parameters)?;
    let raw = captures.get(1)?.as_str();

    match parse_port(raw) {
        Ok(port) => Some(port),
        Err(e) => {
            tracing::warn!(
                "Ignoring debug port '{}' in start parameters ({}); allocating a free port instead",
                raw,
                e
            );
            None
        }
    }
}

pub fn parse_port(raw: &str) -> Result<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(AttachError::InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}

/// Binds port 0 on loopback, reads back the assigned port and releases the socket.
pub fn allocate_ephemeral_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}
