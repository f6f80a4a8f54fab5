//! Error types for the I2C slave bridge.

use std::path::PathBuf;

use thiserror::Error;

use crate::transaction::Direction;

/// Errors produced by the transport, transactions and the poll loop.
///
/// Polling an idle driver is not an error; see
/// [`FetchOutcome::Empty`](crate::transport::FetchOutcome::Empty).
#[derive(Error, Debug)]
pub enum Error {
    /// The slave character device could not be opened.
    #[error("device {path} unavailable: {source}")]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The driver answered an ioctl with no-server or fail.
    #[error("driver fault during {op}: status {code}")]
    DriverFault { op: &'static str, code: i32 },

    /// The ioctl syscall itself failed.
    #[error("ioctl {op} failed: {source}")]
    Ioctl {
        op: &'static str,
        #[source]
        source: nix::errno::Errno,
    },

    /// Byte transfer attempted against the transaction's direction.
    #[error("transfer not permitted on a {direction} transaction")]
    WrongDirection { direction: Direction },

    /// The driver moved fewer (or more) bytes than requested.
    #[error("short transfer: expected {expected} bytes, moved {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    /// Commit was issued for a transaction that was already committed.
    #[error("transaction already committed")]
    AlreadyCommitted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error must stop the poll loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DeviceUnavailable { .. } | Error::DriverFault { .. } | Error::Ioctl { .. }
        )
    }
}

/// Compare a requested byte count against what actually moved.
pub fn check_transfer(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ShortTransfer { expected, actual })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::DriverFault { op: "fetch", code: 3 }.is_fatal());
        assert!(Error::Ioctl {
            op: "commit",
            source: nix::errno::Errno::EBADF
        }
        .is_fatal());
        assert!(!Error::ShortTransfer {
            expected: 4,
            actual: 2
        }
        .is_fatal());
        assert!(!Error::WrongDirection {
            direction: Direction::MasterRead
        }
        .is_fatal());
    }

    #[test]
    fn check_transfer_reports_mismatch() {
        assert!(check_transfer(3, 3).is_ok());
        match check_transfer(4, 1) {
            Err(Error::ShortTransfer { expected, actual }) => {
                assert_eq!((expected, actual), (4, 1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
