use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Bytes a JDWP client sends first. The agent's reply is left to the real debugger.
pub const JDWP_HANDSHAKE: &[u8] = b"JDWP-Handshake";

/// Whether a debug agent accepted a connection and the handshake token on `host:port`.
///
/// Connection refused is the normal answer while the server is still starting, so it is
/// only traced. Every failure is reported as `false`.
pub async fn probe(host: &str, port: u16, connect_timeout: Duration) -> bool {
    match try_handshake(host, port, connect_timeout).await {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            tracing::trace!("Debug agent not listening yet on {}:{}", host, port);
            false
        }
        Err(e) => {
            tracing::debug!("Handshake with {}:{} failed: {}", host, port, e);
            false
        }
    }
}

/// Connects, writes the handshake token and closes the socket before returning.
pub async fn try_handshake(host: &str, port: u16, connect_timeout: Duration) -> io::Result<()> {
    let mut stream = match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(connected) => connected?,
        Err(_) => {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {host}:{port} timed out after {connect_timeout:?}"),
            ));
        }
    };

    stream.write_all(JDWP_HANDSHAKE).await?;
    stream.flush().await?;
    // Peer may already be gone; the token was delivered either way.
    let _ = stream.shutdown().await;
    Ok(())
}
