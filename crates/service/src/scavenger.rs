//! Periodic liveness sweep: keepalive the idle, evict the dead.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::registry::Registry;
use crate::switch::Switch;

/// Idle period after which a quiet client gets a keepalive probe.
pub const KEEPALIVE: Duration = Duration::from_secs(60);

/// Silence beyond `KEEPALIVE * RETRIES` means the client is gone.
pub const RETRIES: u32 = 3;

/// How often the sweep itself runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// One pass over the registry: probes clients that have gone quiet in both
/// directions, and evicts clients that have been silent for too long.
///
/// Owns no thread or task of its own — the caller (the server's async main
/// loop) drives `sweep` on a 1s tick, so shutdown is just not calling it
/// again rather than needing a dedicated cancellation signal.
pub struct Scavenger {
    clock: Arc<dyn Clock>,
    registry: Arc<Registry>,
    switch: Arc<Switch>,
    keepalive: Duration,
    eviction: Duration,
}

impl Scavenger {
    pub fn new(clock: Arc<dyn Clock>, registry: Arc<Registry>, switch: Arc<Switch>) -> Self {
        Self::with_thresholds(clock, registry, switch, KEEPALIVE, KEEPALIVE * RETRIES)
    }

    pub fn with_thresholds(
        clock: Arc<dyn Clock>,
        registry: Arc<Registry>,
        switch: Arc<Switch>,
        keepalive: Duration,
        eviction: Duration,
    ) -> Self {
        Self {
            clock,
            registry,
            switch,
            keepalive,
            eviction,
        }
    }

    /// Runs one sweep over every registered client. Returns the ports
    /// evicted, mainly so tests can assert on it.
    pub fn sweep(&self) -> Vec<u64> {
        let now = self.clock.now();
        let mut evicted = Vec::new();

        for port in self.registry.ports() {
            let Some(client) = self.registry.by_port(port) else {
                continue;
            };

            let age_seen = client.age_seen(now);
            let age_sent = client.age_sent(now);

            if age_seen >= self.eviction {
                log::info!("scavenger: evicting port {port} after {age_seen:?} of silence");
                self.registry.send_disconnect(port);
                self.switch.unplug(port);
                self.registry.remove(port);
                evicted.push(port);
                continue;
            }

            if age_seen >= self.keepalive && age_sent >= self.keepalive {
                log::debug!("scavenger: probing idle port {port}");
                self.registry.send_keepalive(port);
            }
        }

        evicted
    }
}
