//! Listening socket setup and connection accept.
//!
//! The socket is built with socket2 so the backlog and `SO_REUSEADDR` can be
//! set explicitly, then handed to tokio.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{AddrParseError, SocketAddr};
use tokio::net::{TcpListener, TcpStream};

/// Fatal errors while creating the listener.
#[derive(Debug)]
pub enum SetupError {
    /// The bind address could not be parsed.
    InvalidAddress(String, AddrParseError),
    /// Socket creation or option setup failed.
    Socket(io::Error),
    /// The address is in use or not available.
    Bind(SocketAddr, io::Error),
    /// `listen(2)` failed.
    Listen(SocketAddr, io::Error),
}

impl std::fmt::Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupError::InvalidAddress(addr, e) => write!(f, "Invalid bind address '{}': {}", addr, e),
            SetupError::Socket(e) => write!(f, "Failed to create socket: {}", e),
            SetupError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            SetupError::Listen(addr, e) => write!(f, "Failed to listen on {}: {}", addr, e),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SetupError::InvalidAddress(_, e) => Some(e),
            SetupError::Socket(e) | SetupError::Bind(_, e) | SetupError::Listen(_, e) => Some(e),
        }
    }
}

/// A failed `accept()`. Not fatal for the accept loop.
#[derive(Debug)]
pub struct AcceptError(pub io::Error);

impl std::fmt::Display for AcceptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to accept: {}", self.0)
    }
}

impl std::error::Error for AcceptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// A bound, listening endpoint. Never mutated after creation.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    backlog: u32,
}

impl Listener {
    /// Address the listener is actually bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    /// Wait for the next inbound connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        self.inner.accept().await.map_err(AcceptError)
    }
}

/// Bind `address` (`ip:port`) and start listening with the given backlog.
///
/// Must be called from within a tokio runtime.
pub fn bind_and_listen(address: &str, backlog: u32) -> Result<Listener, SetupError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| SetupError::InvalidAddress(address.to_string(), e))?;

    let socket = Socket::new(
        match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        },
        Type::STREAM,
        Some(Protocol::TCP),
    )
    .map_err(SetupError::Socket)?;

    socket.set_reuse_address(true).map_err(SetupError::Socket)?;
    socket.set_nonblocking(true).map_err(SetupError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|e| SetupError::Bind(addr, e))?;
    socket
        .listen(i32::try_from(backlog).unwrap_or(i32::MAX))
        .map_err(|e| SetupError::Listen(addr, e))?;

    let inner = TcpListener::from_std(socket.into()).map_err(SetupError::Socket)?;
    let local_addr = inner.local_addr().map_err(SetupError::Socket)?;

    tracing::info!(address = %local_addr, backlog, "Listener bound");

    Ok(Listener {
        inner,
        local_addr,
        backlog,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind_and_listen("127.0.0.1:0", 10).unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert_eq!(listener.backlog(), 10);
    }

    #[tokio::test]
    async fn test_invalid_address() {
        match bind_and_listen("not-an-address", 10) {
            Err(SetupError::InvalidAddress(addr, _)) => assert_eq!(addr, "not-an-address"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_address_in_use() {
        let first = bind_and_listen("127.0.0.1:0", 10).unwrap();
        let addr = first.local_addr().to_string();

        match bind_and_listen(&addr, 10) {
            Err(SetupError::Bind(_, e)) => assert_eq!(e.kind(), io::ErrorKind::AddrInUse),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accept() {
        let listener = bind_and_listen("127.0.0.1:0", 10).unwrap();
        let addr = listener.local_addr();

        let connect = tokio::spawn(async move { TcpStream::connect(addr).await });
        let (_stream, peer) = listener.accept().await.unwrap();
        let client = connect.await.unwrap().unwrap();

        assert_eq!(peer, client.local_addr().unwrap());
    }
}
