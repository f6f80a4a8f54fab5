//! Daemon lifecycle.
//!
//! Wires the transport, the poll loop and the emulated device together,
//! then waits for a termination signal or for the poll loop to fail.

use std::sync::Arc;

use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::tracing::prelude::*;
use crate::{
    config::BridgeConfig,
    emulation::{serve, RegisterFile},
    poll_loop::PollLoop,
    transport::{LinuxSlaveTransport, SlaveTransport},
};

/// The main daemon.
pub struct Daemon {
    config: BridgeConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Open the configured device and run until shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        let path = self.config.device_path();
        let transport = LinuxSlaveTransport::open_path(path)?;
        self.run_with(Arc::new(transport)).await
    }

    /// Run against an already opened transport.
    ///
    /// Returns an error when the poll loop hit a fatal driver fault.
    pub async fn run_with(self, transport: Arc<dyn SlaveTransport>) -> anyhow::Result<()> {
        let device = RegisterFile::with_seed(self.config.buffer_size, &self.config.seed);
        info!(
            device = %transport.describe(),
            buffer_size = device.size(),
            "Emulating register file"
        );

        let (transactions, poll) =
            PollLoop::new(transport, self.config.poll.clone(), self.shutdown.clone()).spawn()?;

        self.tracker.spawn(async move {
            let device = serve(device, transactions).await;
            debug!(address = device.address(), "Final register pointer");
        });
        self.tracker.close();

        let mut poll_done = tokio::task::spawn_blocking(move || poll.join());

        info!("Started.");
        info!("For debugging, set RUST_LOG=iobridge=debug or trace.");

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        let finished = tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
                None
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
                None
            },
            _ = self.shutdown.cancelled() => None,
            result = &mut poll_done => Some(result),
        };

        self.shutdown.cancel();
        let result = match finished {
            Some(result) => result,
            None => poll_done.await,
        };
        self.tracker.wait().await;

        let status = result??;
        info!(
            fetched = status.fetched,
            committed = status.committed,
            "Exiting."
        );
        Ok(())
    }
}
