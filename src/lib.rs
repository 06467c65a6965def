//! line-echo: a line-oriented TCP echo server and its one-shot client.
//!
//! The server accepts connections and hands each one to its own worker
//! task. A worker reads newline-terminated lines and answers every
//! non-empty line with `Server received: <line>\n` until the peer goes away.
//!
//! Features:
//! - Bounded concurrency (one task per connection, capped by a semaphore)
//! - Line length cap and per-connection idle timeout
//! - Configuration via CLI arguments or TOML file

pub mod client;
pub mod config;
pub mod listener;
pub mod protocol;
pub mod server;
pub mod worker;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
