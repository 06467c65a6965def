//! line-echo-server: a line-oriented TCP echo server
//!
//! Every non-empty line a client sends is answered with
//! `Server received: <line>`. Each connection is served by its own task,
//! with the number of concurrent connections capped.
//!
//! Configuration via CLI arguments or TOML file.

use line_echo::config::Config;
use line_echo::server::Server;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::load()?;

    line_echo::init_logging(&config.log_level);

    info!(
        listen = %config.listen,
        backlog = config.backlog,
        max_connections = config.max_connections,
        max_line_length = config.max_line_length,
        idle_timeout = ?config.idle_timeout,
        "Starting line-echo server"
    );

    let server = Server::new(config);
    server.run().await?;

    info!("Server stopped");
    Ok(())
}
