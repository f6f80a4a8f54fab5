//! Poll loop serializing driver messages to a single consumer.
//!
//! The loop runs on a dedicated OS thread because every step it takes is a
//! blocking syscall or a blocking wait. Each iteration:
//!
//! 1. **Idle**: honor a pending stop request or a closed consumer.
//! 2. **Fetching**: ask the driver for the next message. An empty poll
//!    sleeps for the configured interval and starts over.
//! 3. **Delivered**: wrap the header in a [`Transaction`] and hand it to the
//!    consumer over a one-slot channel.
//! 4. **AwaitingCommit**: block until that transaction is committed.
//!
//! No message is fetched while a previous one is uncommitted, so at most one
//! transaction is ever open with the driver. A stop request only takes
//! effect in Idle: a transaction that was already delivered is always
//! committed before the loop exits.

use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    tracing::prelude::*,
    transaction::Transaction,
    transport::{FetchOutcome, SlaveTransport},
};

/// Where the loop currently is in its cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollState {
    #[default]
    Idle,
    Fetching,
    Delivered,
    AwaitingCommit,
    Stopped,
}

/// Poll loop settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between polls that found nothing pending.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1),
        }
    }
}

/// Snapshot of loop progress.
#[derive(Debug, Clone, Default)]
pub struct PollStatus {
    pub state: PollState,
    /// Messages fetched from the driver. Empty polls are not counted.
    pub fetched: u64,
    /// Transactions whose commit released the loop.
    pub committed: u64,
    pub empty_polls: u64,
}

/// The poll loop, before it is started.
pub struct PollLoop {
    transport: Arc<dyn SlaveTransport>,
    config: PollConfig,
    shutdown: CancellationToken,
    status: Arc<RwLock<PollStatus>>,
}

impl PollLoop {
    pub fn new(
        transport: Arc<dyn SlaveTransport>,
        config: PollConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            config,
            shutdown,
            status: Arc::new(RwLock::new(PollStatus::default())),
        }
    }

    /// Start the loop on its own thread.
    ///
    /// Returns the consumer end of the handoff channel and a handle for
    /// observing and joining the loop.
    pub fn spawn(self) -> Result<(mpsc::Receiver<Transaction>, PollHandle)> {
        let (handoff_tx, handoff_rx) = mpsc::channel(1);
        let status = Arc::clone(&self.status);

        let thread = std::thread::Builder::new()
            .name("i2c-poll".to_string())
            .spawn(move || self.run(handoff_tx))
            .map_err(|e| Error::Other(format!("Failed to spawn poll thread: {}", e)))?;

        trace!("Poll thread spawned");
        Ok((handoff_rx, PollHandle { status, thread }))
    }

    /// Run the loop on the calling thread until stopped or faulted.
    ///
    /// Must not be called from within an async context.
    pub fn run(self, handoff: mpsc::Sender<Transaction>) -> Result<PollStatus> {
        info!(device = %self.transport.describe(), "Poll loop started");

        let result = self.poll(&handoff);
        self.update(|s| s.state = PollState::Stopped);

        let status = self.status();
        match result {
            Ok(()) => {
                info!(
                    fetched = status.fetched,
                    committed = status.committed,
                    "Poll loop stopped"
                );
                Ok(status)
            }
            Err(e) => {
                error!(error = %e, fetched = status.fetched, "Poll loop terminated");
                Err(e)
            }
        }
    }

    fn poll(&self, handoff: &mpsc::Sender<Transaction>) -> Result<()> {
        loop {
            self.update(|s| s.state = PollState::Idle);
            if self.shutdown.is_cancelled() {
                debug!("Stop requested");
                return Ok(());
            }
            if handoff.is_closed() {
                warn!("Consumer closed, stopping poll loop");
                return Ok(());
            }

            self.update(|s| s.state = PollState::Fetching);
            let event = match self.transport.fetch_pending()? {
                FetchOutcome::Event(event) => event,
                FetchOutcome::Empty => {
                    self.update(|s| s.empty_polls += 1);
                    std::thread::sleep(self.config.interval);
                    continue;
                }
            };

            self.update(|s| {
                s.fetched += 1;
                s.state = PollState::Delivered;
            });
            debug!(%event, "Delivering transaction");

            let (done_tx, done_rx) = oneshot::channel();
            let txn = Transaction::new(event, Arc::clone(&self.transport), done_tx);

            // If the consumer is gone the rejected transaction is dropped
            // here, which commits it.
            let delivered = handoff.blocking_send(txn).is_ok();

            self.update(|s| s.state = PollState::AwaitingCommit);
            match done_rx.blocking_recv() {
                Ok(()) => self.update(|s| s.committed += 1),
                Err(_) => warn!(%event, "Transaction released without commit signal"),
            }

            if !delivered {
                warn!("Consumer closed, stopping poll loop");
                return Ok(());
            }
        }
    }

    fn status(&self) -> PollStatus {
        self.status.read().unwrap().clone()
    }

    fn update(&self, f: impl FnOnce(&mut PollStatus)) {
        let mut status = self.status.write().unwrap();
        f(&mut status);
        trace!(state = ?status.state, "Poll state");
    }
}

/// Handle to a running poll loop.
pub struct PollHandle {
    status: Arc<RwLock<PollStatus>>,
    thread: JoinHandle<Result<PollStatus>>,
}

impl PollHandle {
    pub fn status(&self) -> PollStatus {
        self.status.read().unwrap().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop to exit, returning its final status or the fault
    /// that stopped it.
    pub fn join(self) -> Result<PollStatus> {
        self.thread
            .join()
            .map_err(|_| Error::Other("poll thread panicked".into()))?
    }
}
