use std::sync::Arc;

use clap::Parser;
use codec::compression::FrameCodec;
use vswitch_client::{Client, Config};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(unix)]
fn open_nic(config: &Config) -> anyhow::Result<Arc<dyn vswitch_client::Nic>> {
    let device = vswitch_client::TapDevice::open(&config.device, config.mtu)?;
    Ok(Arc::new(device))
}

#[cfg(not(unix))]
fn open_nic(_config: &Config) -> anyhow::Result<Arc<dyn vswitch_client::Nic>> {
    anyhow::bail!("a TAP device is only available on unix targets")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;

    let config = Config::parse();
    let nic = open_nic(&config)?;

    let codec: Option<Arc<dyn FrameCodec>> = if config.compress {
        Some(Arc::new(codec::compression::Lz4FrameCodec))
    } else {
        None
    };

    let client = Client::connect(config.server_addr(), config.network, nic, codec).await?;
    let _workers = client.spawn();

    log::info!(
        "vswitch-client: bound to {}, target network {}",
        config.server_addr(),
        config.network
    );

    wait_for_shutdown_signal().await;
    log::info!("vswitch-client: shutting down");
    client.stop();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
