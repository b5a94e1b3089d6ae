#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::Parser;
use vswitch_server::{Config, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;

    let config = Config::parse();
    let server = Server::bind(&config).await?;
    server.run_until_signal().await
}
