//! Client CLI configuration.

use std::net::Ipv4Addr;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "vswitch-client", about = "TAP-based peer for a vswitch distributor")]
pub struct Config {
    /// Name of the TAP device to create.
    #[arg(short = 'd', long = "dev")]
    pub device: String,

    /// IPv4 address of the distributor.
    #[arg(short = 's', long = "server")]
    pub server: Ipv4Addr,

    /// UDP port of the distributor.
    #[arg(short = 'p', long = "port")]
    pub port: u16,

    /// Network id to associate with.
    #[arg(short = 'n', long = "net")]
    pub network: u32,

    /// MTU for the TAP interface; multiples of 1400 recommended.
    #[arg(short = 'm', long = "mtu", default_value_t = 1400)]
    pub mtu: u16,

    /// Enable LZ4 compression of outgoing frames.
    #[arg(short = 'c', long = "compress", default_value_t = false)]
    pub compress: bool,
}

impl Config {
    pub fn server_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.server.into(), self.port)
    }
}
