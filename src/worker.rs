//! Per-connection echo worker.
//!
//! A worker owns one connection for its whole lifetime: it reads lines,
//! answers each non-empty one, and returns when the peer closes, a read
//! fails, a line exceeds the cap, or the connection sits idle too long.

use crate::protocol::{self, ParseResult};
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Initial read buffer size, grown as needed up to the line cap.
const READ_BUFFER_SIZE: usize = 4 * 1024;

/// Limits applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct WorkerLimits {
    pub max_line_length: usize,
    /// `None` disables the idle timeout.
    pub idle_timeout: Option<Duration>,
}

/// Reasons a worker stops early. Never propagated past the worker.
#[derive(Debug)]
pub enum WorkerError {
    Io(io::Error),
    LineTooLong { limit: usize },
    IdleTimeout(Duration),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Io(e) => write!(f, "I/O error: {}", e),
            WorkerError::LineTooLong { limit } => {
                write!(f, "line exceeds maximum length of {} bytes", limit)
            }
            WorkerError::IdleTimeout(after) => {
                write!(f, "connection idle for {:?}", after)
            }
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerError {
    fn from(e: io::Error) -> Self {
        WorkerError::Io(e)
    }
}

/// Serve one connection until it ends.
///
/// Returns the number of lines echoed. The stream is dropped (closing both
/// directions) when this returns.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    limits: WorkerLimits,
) -> Result<u64, WorkerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut response = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut echoed = 0;
    // Leading bytes of `buffer` already searched for a newline
    let mut scanned = 0;

    loop {
        match protocol::parse_line(&buffer, scanned, limits.max_line_length) {
            ParseResult::Complete { line_len, consumed } => {
                scanned = 0;
                let frame = buffer.split_to(consumed);
                if echo_line(&mut stream, peer, &frame[..line_len], &mut response).await? {
                    echoed += 1;
                }
            }

            ParseResult::TooLong => {
                warn!(peer = %peer, limit = limits.max_line_length, "Line too long, closing connection");
                stream.write_all(protocol::LINE_TOO_LONG_RESPONSE).await?;
                stream.flush().await?;
                return Err(WorkerError::LineTooLong {
                    limit: limits.max_line_length,
                });
            }

            ParseResult::Incomplete => {
                scanned = buffer.len();
                let n = read_more(&mut stream, &mut buffer, limits.idle_timeout).await?;
                if n == 0 {
                    // An unterminated fragment at EOF still counts as a line
                    if !buffer.is_empty()
                        && echo_line(&mut stream, peer, &buffer, &mut response).await?
                    {
                        echoed += 1;
                    }
                    trace!(peer = %peer, "Connection closed by client");
                    return Ok(echoed);
                }
            }
        }
    }
}

/// Write the response for one line. Returns `false` for empty lines,
/// which get no response.
async fn echo_line<S>(
    stream: &mut S,
    peer: SocketAddr,
    line: &[u8],
    response: &mut BytesMut,
) -> Result<bool, WorkerError>
where
    S: AsyncWrite + Unpin,
{
    if line.is_empty() {
        trace!(peer = %peer, "Skipping empty line");
        return Ok(false);
    }

    debug!(peer = %peer, line = %String::from_utf8_lossy(line), "Received line");

    response.clear();
    protocol::write_response(line, response);
    stream.write_all(response).await?;
    stream.flush().await?;
    Ok(true)
}

async fn read_more<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    idle_timeout: Option<Duration>,
) -> Result<usize, WorkerError>
where
    S: AsyncRead + Unpin,
{
    buffer.reserve(READ_BUFFER_SIZE);
    let n = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, stream.read_buf(buffer))
            .await
            .map_err(|_| WorkerError::IdleTimeout(limit))??,
        None => stream.read_buf(buffer).await?,
    };
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn limits() -> WorkerLimits {
        WorkerLimits {
            max_line_length: 1024,
            idle_timeout: None,
        }
    }

    #[tokio::test]
    async fn test_echo_single_line() {
        let stream = Builder::new()
            .read(b"Hello from client!\n")
            .write(b"Server received: Hello from client!\n")
            .build();

        let echoed = handle_connection(stream, peer(), limits()).await.unwrap();
        assert_eq!(echoed, 1);
    }

    #[tokio::test]
    async fn test_lines_answered_in_order() {
        let stream = Builder::new()
            .read(b"first\nsecond\n")
            .write(b"Server received: first\n")
            .write(b"Server received: second\n")
            .read(b"third\n")
            .write(b"Server received: third\n")
            .build();

        let echoed = handle_connection(stream, peer(), limits()).await.unwrap();
        assert_eq!(echoed, 3);
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let stream = Builder::new()
            .read(b"hel")
            .read(b"lo\r")
            .read(b"\n")
            .write(b"Server received: hello\r\n")
            .build();

        let echoed = handle_connection(stream, peer(), limits()).await.unwrap();
        assert_eq!(echoed, 1);
    }

    #[tokio::test]
    async fn test_empty_lines_skipped() {
        let stream = Builder::new()
            .read(b"\n\nx\n")
            .write(b"Server received: x\n")
            .build();

        let echoed = handle_connection(stream, peer(), limits()).await.unwrap();
        assert_eq!(echoed, 1);
    }

    #[tokio::test]
    async fn test_carriage_return_echoed_verbatim() {
        let (mut client, server) = tokio::io::duplex(256);
        let worker = tokio::spawn(handle_connection(server, peer(), limits()));

        client.write_all(b"abc\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"Server received: abc\r\nServer received: \r\n");
        assert_eq!(worker.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unterminated_fragment_echoed_at_eof() {
        let (mut client, server) = tokio::io::duplex(256);
        let worker = tokio::spawn(handle_connection(server, peer(), limits()));

        client.write_all(b"first\nHello from client!").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(
            reply,
            b"Server received: first\nServer received: Hello from client!\n"
        );
        assert_eq!(worker.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_immediate_eof() {
        let stream = Builder::new().build();
        let echoed = handle_connection(stream, peer(), limits()).await.unwrap();
        assert_eq!(echoed, 0);
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let stream = Builder::new()
            .read(b"ok\n0123456789")
            .write(b"Server received: ok\n")
            .write(b"ERROR line too long\n")
            .build();

        let limits = WorkerLimits {
            max_line_length: 8,
            idle_timeout: None,
        };
        match handle_connection(stream, peer(), limits).await {
            Err(WorkerError::LineTooLong { limit }) => assert_eq!(limit, 8),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_error_ends_worker() {
        let stream = Builder::new()
            .read(b"a\n")
            .write(b"Server received: a\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        match handle_connection(stream, peer(), limits()).await {
            Err(WorkerError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let (_client, server) = tokio::io::duplex(64);
        let limits = WorkerLimits {
            max_line_length: 1024,
            idle_timeout: Some(Duration::from_millis(50)),
        };

        match handle_connection(server, peer(), limits).await {
            Err(WorkerError::IdleTimeout(after)) => assert_eq!(after, Duration::from_millis(50)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_response_without_newline_until_close() {
        let (mut client, server) = tokio::io::duplex(256);
        let worker = tokio::spawn(handle_connection(server, peer(), limits()));

        client.write_all(b"Hello from client!").await.unwrap();

        let mut buf = [0u8; 64];
        let pending =
            tokio::time::timeout(Duration::from_millis(100), client.read(&mut buf)).await;
        assert!(pending.is_err(), "no response expected before newline");

        client.shutdown().await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"Server received: Hello from client!\n");
        assert_eq!(worker.await.unwrap().unwrap(), 1);
    }
}
