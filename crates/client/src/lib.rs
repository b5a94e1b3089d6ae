//! Peer-side client: opens a virtual NIC, speaks the overlay protocol to one
//! distributor, and drives the peer state machine (§4.7) through three
//! concurrent workers.

pub mod config;
pub mod nic;
pub mod state;
pub mod worker;

pub use config::Config;
pub use nic::{Nic, PairDevice};
pub use state::State;
pub use worker::Client;

#[cfg(unix)]
pub use nic::TapDevice;
