//! Command line and server configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

const X11_UNIX_DIR: &str = "/tmp/.X11-unix";
const X11_TCP_BASE: u16 = 6000;

#[derive(Parser, Debug)]
#[command(name = "x11qd")]
#[command(about = "Standalone X11 display server with a software compositor")]
#[command(version)]
pub struct Cli {
    /// Display number to serve (clients use DISPLAY=:N)
    #[arg(short, long, default_value = "1")]
    pub display: u32,

    /// Screen width in pixels
    #[arg(long, default_value = "1024")]
    pub width: u16,

    /// Screen height in pixels
    #[arg(long, default_value = "768")]
    pub height: u16,

    /// Run without a display window
    #[arg(long)]
    pub headless: bool,

    /// Do not listen on TCP port 6000+N
    #[arg(long)]
    pub no_tcp: bool,

    /// Frame interval in milliseconds
    #[arg(long, default_value = "16", value_parser = clap::value_parser!(u64).range(1..))]
    pub frame_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub display: u32,
    pub width: u16,
    pub height: u16,
    pub headless: bool,
    pub tcp: bool,
    pub unix_dir: PathBuf,
    pub frame_interval: Duration,
}

impl ServerConfig {
    pub fn tcp_port(&self) -> u16 {
        X11_TCP_BASE.saturating_add(self.display as u16)
    }

    /// In-memory screen with no listeners of its own.
    pub fn headless(width: u16, height: u16) -> Self {
        Self {
            display: 0,
            width,
            height,
            headless: true,
            tcp: false,
            unix_dir: PathBuf::from(X11_UNIX_DIR),
            frame_interval: Duration::from_millis(16),
        }
    }
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            display: cli.display,
            width: cli.width.max(1),
            height: cli.height.max(1),
            headless: cli.headless,
            tcp: !cli.no_tcp,
            unix_dir: PathBuf::from(X11_UNIX_DIR),
            frame_interval: Duration::from_millis(cli.frame_ms),
        }
    }
}
