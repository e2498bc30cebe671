//! Command line interface for the `courier` relay server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

/// Command line arguments for the `courier` binary.
#[derive(Debug, Parser)]
#[command(
    name = "courier",
    version,
    about = "Point-to-point message relay server",
    long_about = "Relays messages between clients registered by username. Type `exit` on \
                  standard input or press Ctrl+C to shut down."
)]
pub struct Cli {
    /// Port to listen on.
    #[arg(short, long)]
    pub port: u16,

    /// Address to listen on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Milliseconds sessions get to finish after the shutdown notice.
    #[arg(long, default_value_t = 5000)]
    pub grace_ms: u64,

    /// Close connections that send no handshake within this many
    /// milliseconds.
    #[arg(long)]
    pub handshake_timeout_ms: Option<u64>,

    /// Largest frame payload in bytes.
    #[arg(long, default_value_t = 1024 * 1024)]
    pub max_frame_length: usize,

    /// Messages queued per slow client before senders wait.
    #[arg(long, default_value_t = 64)]
    pub outbox_capacity: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Address the relay listens on.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}
