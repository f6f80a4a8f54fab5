use clap::Parser;

use iobridge::{
    config::{Args, BridgeConfig},
    tracing::{self, prelude::*},
};

#[tokio::main]
async fn main() {
    tracing::init_journald_or_stdout();

    let config = BridgeConfig::from(Args::parse());
    info!(
        path = %config.device_path().display(),
        "Starting I2C slave bridge"
    );

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(target_os = "linux")]
async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    iobridge::daemon::Daemon::new(config).run().await
}

#[cfg(not(target_os = "linux"))]
async fn run(_config: BridgeConfig) -> anyhow::Result<()> {
    anyhow::bail!("the i2c-loopback driver is only available on Linux")
}
