//! EEPROM-style register file.
//!
//! A fixed byte buffer behind an address pointer, the layout used by small
//! EEPROMs and most register-map peripherals:
//!
//! - A master write sets the pointer from its first byte.
//! - A master read returns bytes starting at the pointer, truncated at the
//!   end of the buffer. The pointer does not advance.

use super::TransactionHandler;
use crate::{
    error::{check_transfer, Result},
    tracing::prelude::*,
    transaction::{Direction, Transaction},
};

/// Buffer size of the stock device.
pub const DEFAULT_SIZE: usize = 256;

/// Emulated register file state.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    data: Vec<u8>,
    address: u16,
}

impl RegisterFile {
    /// Zero-filled buffer of `size` bytes with the pointer at 0.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            address: 0,
        }
    }

    /// Buffer of `size` bytes with `seed` copied to offset 0.
    pub fn with_seed(size: usize, seed: &[u8]) -> Self {
        let mut file = Self::new(size);
        file.seed(0, seed);
        file
    }

    /// Copy `bytes` into the buffer at `offset`, dropping what does not fit.
    pub fn seed(&mut self, offset: usize, bytes: &[u8]) {
        if offset >= self.data.len() {
            return;
        }
        let n = bytes.len().min(self.data.len() - offset);
        self.data[offset..offset + n].copy_from_slice(&bytes[..n]);
    }

    /// Current pointer.
    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bytes available from the pointer, capped at `requested`.
    fn response_len(&self, requested: usize) -> usize {
        requested.min(self.data.len().saturating_sub(self.address as usize))
    }

    fn on_master_write(&mut self, txn: &mut Transaction) -> Result<()> {
        let len = txn.len();
        if len == 0 {
            trace!("Empty write, pointer unchanged");
            return Ok(());
        }

        let mut buf = vec![0u8; len];
        let n = txn.read(&mut buf)?;
        check_transfer(len, n)?;

        self.address = buf[0] as u16;
        debug!(address = %format!("0x{:02x}", self.address), "Pointer set");
        Ok(())
    }

    fn on_master_read(&mut self, txn: &mut Transaction) -> Result<()> {
        let start = self.address as usize;
        let count = self.response_len(txn.len());
        if count == 0 {
            debug!(
                address = start,
                requested = txn.len(),
                "Pointer past end of buffer, nothing to send"
            );
            return Ok(());
        }

        let n = txn.write(&self.data[start..start + count])?;
        check_transfer(count, n)?;

        trace!(address = start, count, "Sent register data");
        Ok(())
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE)
    }
}

impl TransactionHandler for RegisterFile {
    fn handle(&mut self, txn: &mut Transaction) -> Result<()> {
        match txn.direction() {
            Direction::MasterWrite => self.on_master_write(txn),
            Direction::MasterRead => self.on_master_read(txn),
        }
    }
}
