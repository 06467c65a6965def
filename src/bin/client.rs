//! line-echo-client: send one line to a line-echo server and print the reply.
//!
//! ```bash
//! line-echo-client --server 127.0.0.1:5678 --message "Hello from client!"
//! ```
//!
//! Exits non-zero when the connection or the send fails. A missing reply
//! is not an error.

use clap::Parser;
use line_echo::client;
use line_echo::config::{ClientArgs, ClientConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = ClientArgs::parse();
    line_echo::init_logging(&args.log_level);

    let config = ClientConfig::from(args);

    match client::one_shot_exchange(&config).await? {
        Some(reply) => println!("Received response: {}", String::from_utf8_lossy(&reply).trim_end()),
        None => println!("No response received"),
    }

    Ok(())
}
