//! Binary crate wiring: CLI config and the UDP transport loop around the
//! `service` crate's distributor core.

pub mod config;
pub mod server;

pub use config::Config;
pub use server::Server;
