//! x11qd - standalone X11 display server
//!
//! ```text
//! x11qd                  → window on screen, DISPLAY=:1
//! x11qd -d 2 --headless  → no window, DISPLAY=:2
//! ```

use anyhow::Result;
use clap::Parser;

use x11qd::backend::{Backend, HeadlessBackend, MinifbBackend};
use x11qd::config::{Cli, ServerConfig};
use x11qd::server::Server;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let mut config = ServerConfig::from(Cli::parse());
    let backend: Box<dyn Backend> = if config.headless {
        Box::new(HeadlessBackend::new(config.width, config.height))
    } else {
        Box::new(MinifbBackend::new(config.width, config.height, config.display)?)
    };

    (config.width, config.height) = backend.size();

    let server = Server::new(config)?;
    server.run(backend).await
}
