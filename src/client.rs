//! One-shot client: connect, send one message, read at most one reply.

use crate::config::ClientConfig;
use bytes::{Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Size of the single reply read.
pub const RESPONSE_BUFFER_SIZE: usize = 1024;

/// Failure to establish the connection.
#[derive(Debug)]
pub enum ConnectError {
    /// Address resolution, refusal, or any other socket error.
    Failed { addr: String, source: io::Error },
    /// No connection within the connect timeout.
    Timeout { addr: String, after: Duration },
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectError::Failed { addr, source } => {
                write!(f, "Connection to {} failed: {}", addr, source)
            }
            ConnectError::Timeout { addr, after } => {
                write!(f, "Connection to {} timed out after {:?}", addr, after)
            }
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectError::Failed { source, .. } => Some(source),
            ConnectError::Timeout { .. } => None,
        }
    }
}

/// Errors that abort the exchange. Reply failures are not among them.
#[derive(Debug)]
pub enum ClientError {
    Connect(ConnectError),
    Send(io::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connect(e) => write!(f, "{}", e),
            ClientError::Send(e) => write!(f, "Send failed: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Connect(e) => Some(e),
            ClientError::Send(e) => Some(e),
        }
    }
}

impl From<ConnectError> for ClientError {
    fn from(e: ConnectError) -> Self {
        ClientError::Connect(e)
    }
}

/// An open client connection.
pub struct Client {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Client {
    /// Connect to `addr` (`host:port`), giving up after `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, ConnectError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectError::Timeout {
                addr: addr.to_string(),
                after: timeout,
            })?
            .map_err(|source| ConnectError::Failed {
                addr: addr.to_string(),
                source,
            })?;

        let peer = stream.peer_addr().map_err(|source| ConnectError::Failed {
            addr: addr.to_string(),
            source,
        })?;

        Ok(Client { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send `message`, optionally terminated by a newline.
    pub async fn send(&mut self, message: &str, append_newline: bool) -> io::Result<()> {
        let mut out = BytesMut::with_capacity(message.len() + 1);
        out.extend_from_slice(message.as_bytes());
        if append_newline {
            out.extend_from_slice(b"\n");
        }
        self.stream.write_all(&out).await?;
        self.stream.flush().await
    }

    /// Half-close: the server sees end-of-stream but can still reply.
    pub async fn shutdown_write(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    /// One read of up to [`RESPONSE_BUFFER_SIZE`] bytes.
    ///
    /// Returns `None` on end-of-stream, read error, or timeout.
    pub async fn receive_once(&mut self, timeout: Duration) -> Option<Bytes> {
        let mut buf = BytesMut::with_capacity(RESPONSE_BUFFER_SIZE);

        match tokio::time::timeout(timeout, self.stream.read_buf(&mut buf)).await {
            Ok(Ok(0)) => {
                debug!(peer = %self.peer, "Server closed connection without a reply");
                None
            }
            Ok(Ok(_)) => Some(buf.freeze()),
            Ok(Err(e)) => {
                warn!(peer = %self.peer, error = %e, "Receive failed");
                None
            }
            Err(_) => {
                debug!(peer = %self.peer, ?timeout, "No reply before timeout");
                None
            }
        }
    }
}

/// Run the whole exchange described by `config`.
///
/// The connection is closed before returning, whatever the reply outcome.
pub async fn one_shot_exchange(config: &ClientConfig) -> Result<Option<Bytes>, ClientError> {
    let mut client = Client::connect(&config.server, config.connect_timeout).await?;
    info!(server = %client.peer_addr(), "Connected to server");

    client
        .send(&config.message, config.append_newline)
        .await
        .map_err(ClientError::Send)?;
    info!(message = %config.message, newline = config.append_newline, "Sent data");

    if config.shutdown_write {
        if let Err(e) = client.shutdown_write().await {
            warn!(error = %e, "Failed to close write side");
        }
    }

    let reply = client.receive_once(config.read_timeout).await;

    drop(client);
    info!("Connection closed");
    Ok(reply)
}
