//! Application side of the bridge: consuming transactions.
//!
//! A [`TransactionHandler`] implements the emulated device. [`serve`] is the
//! consumer loop that feeds it transactions from the poll loop and makes
//! sure every one of them is committed, whatever the handler did.

mod register_file;

pub use register_file::{RegisterFile, DEFAULT_SIZE};

use tokio::sync::mpsc;

use crate::{
    error::{Error, Result},
    tracing::prelude::*,
    transaction::Transaction,
};

/// Emulated device logic.
pub trait TransactionHandler: Send {
    /// Service one bus message.
    ///
    /// Handlers move payload bytes but need not commit; [`service`] commits
    /// after this returns, successfully or not.
    fn handle(&mut self, txn: &mut Transaction) -> Result<()>;
}

/// Run `handler` on one transaction, then commit it.
///
/// Handler errors are reported and do not prevent the commit. Returns the
/// commit result; a handler that already committed is not an error.
pub fn service<H>(handler: &mut H, txn: &mut Transaction) -> Result<()>
where
    H: TransactionHandler + ?Sized,
{
    if let Err(e) = handler.handle(txn) {
        warn!(event = %txn.event(), error = %e, "Handler failed");
    }

    match txn.commit() {
        Ok(()) | Err(Error::AlreadyCommitted) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Consume transactions until the poll loop goes away.
///
/// Stopping is left to the poll loop: it finishes any message it already
/// fetched and then drops its end of the channel, so everything it hands
/// over is serviced here. The handler is returned so its state can be
/// inspected.
pub async fn serve<H>(mut handler: H, mut transactions: mpsc::Receiver<Transaction>) -> H
where
    H: TransactionHandler,
{
    debug!("Device emulation started");

    while let Some(mut txn) = transactions.recv().await {
        if let Err(e) = service(&mut handler, &mut txn) {
            error!(event = %txn.event(), error = %e, "Commit failed");
        }
    }

    debug!("Device emulation stopped");
    handler
}
