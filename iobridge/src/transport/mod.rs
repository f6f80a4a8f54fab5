//! Transport to the kernel-resident I2C slave driver.
//!
//! The driver exposes one character device per emulated bus. A pending bus
//! message is fetched with an ioctl, its payload is moved with plain
//! `read(2)`/`write(2)` on the same descriptor, and a second ioctl commits
//! the message, releasing the bus which the driver holds stalled until then.
//!
//! The [`SlaveTransport`] trait is the seam between that protocol and the
//! rest of the crate, so the poll loop and transactions can be exercised
//! against a scripted double in tests.

use std::fmt;
use std::path::PathBuf;

use bitflags::bitflags;

use crate::error::{Error, Result};

#[cfg(target_os = "linux")]
mod linux;

#[cfg(test)]
pub(crate) mod mock;

#[cfg(target_os = "linux")]
pub use linux::LinuxSlaveTransport;

/// Device path for a bus index: `<base>-<bus>-master`.
pub fn device_path(base: &str, bus: u32) -> PathBuf {
    PathBuf::from(format!("{}-{}-master", base, bus))
}

/// ioctl request fetching the pending message header.
pub const FETCH_MESSAGE: u32 = 0x1000;

/// ioctl request committing the pending message.
pub const COMMIT_MESSAGE: u32 = 0x2000;

bitflags! {
    /// Flag bits of a Linux `struct i2c_msg`, as forwarded by the driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageFlags: u16 {
        /// Read data, from slave to master.
        const RD = 0x0001;
        /// Ten bit chip address.
        const TEN = 0x0010;
        /// Length will be the first received byte.
        const RECV_LEN = 0x0400;
        const NO_RD_ACK = 0x0800;
        const IGNORE_NAK = 0x1000;
        const REV_DIR_ADDR = 0x2000;
        const NOSTART = 0x4000;
        const STOP = 0x8000;
    }
}

/// Status codes returned by both ioctls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Success,
    /// No slave adapter is registered with the driver.
    NoServer,
    /// Nothing is pending on the bus.
    NoMessage,
    Fail,
}

impl DriverStatus {
    pub const SUCCESS: i32 = 0;
    pub const NO_SERVER: i32 = 1;
    pub const NO_MESSAGE: i32 = 2;
    pub const FAIL: i32 = 3;

    /// Decode a raw ioctl return value. Unknown codes are treated as `Fail`.
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::SUCCESS => DriverStatus::Success,
            Self::NO_SERVER => DriverStatus::NoServer,
            Self::NO_MESSAGE => DriverStatus::NoMessage,
            _ => DriverStatus::Fail,
        }
    }
}

/// Message header as emitted by the driver's fetch ioctl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// Slave address the master addressed.
    pub addr: u16,
    /// `i2c_msg` flags; bit 0 marks a master read.
    pub flags: u16,
    /// Requested payload length in bytes.
    pub len: u16,
}

impl RawEvent {
    pub fn new(addr: u16, flags: u16, len: u16) -> Self {
        Self { addr, flags, len }
    }

    pub fn message_flags(&self) -> MessageFlags {
        MessageFlags::from_bits_retain(self.flags)
    }

    pub fn is_read_request(&self) -> bool {
        self.message_flags().contains(MessageFlags::RD)
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ addr: 0x{:04x}, flags: 0x{:04x}, len: {} }}",
            self.addr, self.flags, self.len
        )
    }
}

/// Result of asking the driver for the next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Event(RawEvent),
    /// The driver has nothing pending; poll again later.
    Empty,
}

/// Access to one bus slave channel of the driver.
///
/// All methods take `&self`: the poll loop and the transaction currently in
/// flight share one transport, but never use it at the same time.
pub trait SlaveTransport: Send + Sync {
    /// Fetch the header of the pending message, if any.
    fn fetch_pending(&self) -> Result<FetchOutcome>;

    /// Read payload bytes written by the bus master.
    fn read_bytes(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write payload bytes for the bus master to read.
    fn write_bytes(&self, buf: &[u8]) -> Result<usize>;

    /// Tell the driver the pending message has been serviced.
    fn commit(&self) -> Result<()>;

    /// Human-readable identity for logs.
    fn describe(&self) -> String;
}

/// Map a fetch status to an outcome.
pub(crate) fn fetch_outcome(code: i32, event: RawEvent) -> Result<FetchOutcome> {
    match DriverStatus::from_code(code) {
        DriverStatus::Success => Ok(FetchOutcome::Event(event)),
        DriverStatus::NoMessage => Ok(FetchOutcome::Empty),
        DriverStatus::NoServer | DriverStatus::Fail => {
            Err(Error::DriverFault { op: "fetch", code })
        }
    }
}

/// Map a commit status to a result.
///
/// `NoMessage` here means the driver already gave up on the message (its
/// transfer timed out), so it is reported like any other fault.
pub(crate) fn commit_result(code: i32) -> Result<()> {
    match DriverStatus::from_code(code) {
        DriverStatus::Success => Ok(()),
        _ => Err(Error::DriverFault { op: "commit", code }),
    }
}
