//! I2C slave emulation on Linux.
//!
//! A kernel driver (i2c-loopback) stalls each inbound bus message until user
//! space services it. This crate polls the driver for pending messages,
//! hands them one at a time to application code as [`Transaction`]s, and
//! commits each one back to the driver so the bus can move on.

pub mod config;
#[cfg(target_os = "linux")]
pub mod daemon;
pub mod emulation;
pub mod error;
pub mod poll_loop;
pub mod tracing;
pub mod transaction;
pub mod transport;

pub use error::{Error, Result};
pub use poll_loop::{PollConfig, PollHandle, PollLoop, PollState, PollStatus};
pub use transaction::{Direction, Transaction};
pub use transport::{FetchOutcome, RawEvent, SlaveTransport};
