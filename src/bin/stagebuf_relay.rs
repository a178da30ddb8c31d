//! Stagebuf Relay Binary
//!
//! TCP relay yang meneruskan setiap client ke satu upstream lewat
//! sepasang ring buffer per sesi.
//!
//! Usage:
//!   cargo run --release --bin stagebuf_relay -- --listen 0.0.0.0:7700 --upstream 10.0.0.5:9000
//!
//! Logging diatur lewat `RUST_LOG` (default: info).

use std::net::SocketAddr;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stagebuf::network::{Relay, RelayConfig};
use stagebuf::{Backing, BufferConfig};

/// Relay command line; setiap opsi juga bisa diisi lewat environment.
#[derive(Parser, Debug)]
#[command(name = "stagebuf_relay", version, about = "Ring-buffered TCP relay")]
struct Cli {
    /// Address to accept clients on
    #[arg(short, long, env = "STAGEBUF_LISTEN", default_value = "127.0.0.1:7700")]
    listen: SocketAddr,

    /// Address every session is forwarded to
    #[arg(short, long, env = "STAGEBUF_UPSTREAM")]
    upstream: SocketAddr,

    /// Ring buffer capacity per direction, in bytes
    #[arg(long, env = "STAGEBUF_BUFFER_SIZE", default_value_t = 64 * 1024)]
    buffer_size: usize,

    /// Storage backing for session buffers (heap or mmap)
    #[arg(long, env = "STAGEBUF_BACKING", default_value_t = Backing::Heap)]
    backing: Backing,

    /// mlock session buffers
    #[arg(long, env = "STAGEBUF_LOCK_PAGES")]
    lock_pages: bool,

    /// SO_SNDBUF/SO_RCVBUF for both sockets of a session
    #[arg(long, env = "STAGEBUF_SOCKET_BUFFER")]
    socket_buffer: Option<usize>,

    /// Upstream connect timeout in milliseconds
    #[arg(long, env = "STAGEBUF_CONNECT_TIMEOUT_MS", default_value_t = 3000)]
    connect_timeout_ms: u64,

    /// Maximum concurrent sessions
    #[arg(long, env = "STAGEBUF_MAX_SESSIONS", default_value_t = 1024)]
    max_sessions: usize,

    /// Seconds between stats log lines (0 disables)
    #[arg(long, env = "STAGEBUF_STATS_INTERVAL", default_value_t = 5)]
    stats_interval: u64,
}

impl Cli {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            listen: self.listen,
            upstream: self.upstream,
            buffer_capacity: self.buffer_size,
            buffer: BufferConfig::new()
                .with_backing(self.backing)
                .with_locked_pages(self.lock_pages),
            socket_buffer_size: self.socket_buffer,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            max_sessions: self.max_sessions,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_ids(true)
        .with_target(false)
        .init();

    let mut relay = match Relay::bind(cli.relay_config()) {
        Ok(relay) => relay,
        Err(e) => {
            error!(listen = %cli.listen, error = %e, "failed to bind relay");
            return ExitCode::FAILURE;
        }
    };

    if cli.stats_interval > 0 {
        let handle = relay.handle();
        let interval = Duration::from_secs(cli.stats_interval);
        let started = Instant::now();
        let spawned = thread::Builder::new()
            .name("relay-stats".into())
            .spawn(move || loop {
                thread::sleep(interval);
                handle.stats().log_summary(started.elapsed());
            });
        if let Err(e) = spawned {
            error!(error = %e, "failed to spawn stats thread");
        }
    }

    match relay.run() {
        Ok(()) => {
            info!("relay exited");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "relay error");
            ExitCode::FAILURE
        }
    }
}
