//! Server CLI configuration.
//!
//! No configuration file and no environment variables — the distributor has
//! no persisted state, so the CLI surface from spec §6 is the whole of it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "vswitch-server", about = "Virtual Layer-2 Ethernet switch distributed over UDP")]
pub struct Config {
    /// UDP port to bind.
    #[arg(short = 'p', long = "port")]
    pub port: u16,

    /// Address to bind.
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0")]
    pub bind: IpAddr,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 0,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}
