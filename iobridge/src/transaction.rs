//! One bus message handed to application code.
//!
//! A [`Transaction`] wraps the header fetched from the driver and a handle
//! back into the shared transport. Payload transfer is gated by direction:
//! when the master writes, the emulated slave may only read, and when the
//! master reads, the slave may only write.
//!
//! Committing releases the bus in the driver and wakes the poll loop so it
//! can fetch the next message. A transaction dropped without an explicit
//! commit is committed from `Drop`, because an uncommitted message keeps
//! the physical bus stalled.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::{
    error::{Error, Result},
    tracing::prelude::*,
    transport::{MessageFlags, RawEvent, SlaveTransport},
};

/// Which side of the bus drives the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The master writes; the slave reads the payload.
    MasterWrite,
    /// The master reads; the slave supplies the payload.
    MasterRead,
}

impl Direction {
    pub fn of(event: &RawEvent) -> Self {
        if event.is_read_request() {
            Direction::MasterRead
        } else {
            Direction::MasterWrite
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::MasterWrite => f.write_str("master-write"),
            Direction::MasterRead => f.write_str("master-read"),
        }
    }
}

/// A fetched bus message awaiting service and commit.
pub struct Transaction {
    event: RawEvent,
    transport: Arc<dyn SlaveTransport>,
    /// Wakes the poll loop; taken on commit.
    done: Option<oneshot::Sender<()>>,
}

impl Transaction {
    pub(crate) fn new(
        event: RawEvent,
        transport: Arc<dyn SlaveTransport>,
        done: oneshot::Sender<()>,
    ) -> Self {
        Self {
            event,
            transport,
            done: Some(done),
        }
    }

    pub fn event(&self) -> RawEvent {
        self.event
    }

    pub fn addr(&self) -> u16 {
        self.event.addr
    }

    pub fn flags(&self) -> u16 {
        self.event.flags
    }

    pub fn message_flags(&self) -> MessageFlags {
        self.event.message_flags()
    }

    /// Requested payload length.
    pub fn len(&self) -> usize {
        self.event.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.event.len == 0
    }

    pub fn direction(&self) -> Direction {
        Direction::of(&self.event)
    }

    /// True when the master is reading and the slave must supply bytes.
    pub fn is_read_request(&self) -> bool {
        self.direction() == Direction::MasterRead
    }

    pub fn is_committed(&self) -> bool {
        self.done.is_none()
    }

    /// Read the payload written by the master.
    ///
    /// Fails with [`Error::WrongDirection`] on a master-read message without
    /// touching the device.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_open(Direction::MasterWrite)?;
        self.transport.read_bytes(buf)
    }

    /// Supply the payload the master is reading.
    ///
    /// Fails with [`Error::WrongDirection`] on a master-write message without
    /// touching the device.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_open(Direction::MasterRead)?;
        self.transport.write_bytes(buf)
    }

    /// Commit the message to the driver and release the poll loop.
    ///
    /// The poll loop is released even when the driver rejects the commit. A
    /// second call returns [`Error::AlreadyCommitted`] and does nothing.
    pub fn commit(&mut self) -> Result<()> {
        let done = self.done.take().ok_or(Error::AlreadyCommitted)?;
        let result = self.transport.commit();
        match &result {
            Ok(()) => trace!(event = %self.event, "Committed"),
            Err(e) => warn!(event = %self.event, error = %e, "Commit rejected"),
        }
        // The poll loop may already be gone during shutdown.
        let _ = done.send(());
        result
    }

    fn check_open(&self, allowed: Direction) -> Result<()> {
        if self.is_committed() {
            return Err(Error::AlreadyCommitted);
        }
        let direction = self.direction();
        if direction != allowed {
            return Err(Error::WrongDirection { direction });
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_committed() {
            return;
        }
        warn!(event = %self.event, "Transaction dropped uncommitted, committing");
        if let Err(e) = self.commit() {
            error!(error = %e, "Commit on drop failed");
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("event", &self.event)
            .field("transport", &self.transport.describe())
            .field("committed", &self.is_committed())
            .finish()
    }
}

fn to_io(err: Error) -> io::Error {
    match err {
        Error::Io(e) => e,
        e @ (Error::WrongDirection { .. } | Error::AlreadyCommitted) => {
            io::Error::new(io::ErrorKind::PermissionDenied, e)
        }
        e => io::Error::other(e),
    }
}

impl io::Read for Transaction {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Transaction::read(self, buf).map_err(to_io)
    }
}

impl io::Write for Transaction {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Transaction::write(self, buf).map_err(to_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
