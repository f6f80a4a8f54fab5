//! Linux implementation on top of the i2c-loopback character device.
//!
//! The driver registers `/dev/i2c-<bus>-master`. Only one process may hold
//! it open at a time; a second open fails with `EBUSY`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use super::{commit_result, device_path, fetch_outcome, FetchOutcome, RawEvent, SlaveTransport};
use crate::{
    error::{Error, Result},
    tracing::prelude::*,
};

// The driver uses plain request numbers rather than _IOR/_IO encodings.
nix::ioctl_read_bad!(fetch_message, super::FETCH_MESSAGE, RawEvent);
nix::ioctl_none_bad!(commit_message, super::COMMIT_MESSAGE);

/// Transport owning the driver's character device.
#[derive(Debug)]
pub struct LinuxSlaveTransport {
    file: File,
    path: PathBuf,
}

impl LinuxSlaveTransport {
    /// Open the character device for `bus` under `base` (e.g. `/dev/i2c`).
    pub fn open(base: &str, bus: u32) -> Result<Self> {
        Self::open_path(device_path(base, bus))
    }

    /// Open a specific device node read/write.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| Error::DeviceUnavailable {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Opened slave device");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SlaveTransport for LinuxSlaveTransport {
    fn fetch_pending(&self) -> Result<FetchOutcome> {
        let mut event = RawEvent::default();
        // SAFETY: the descriptor is owned by `self.file` and `event` is a
        // repr(C) struct matching the driver's `struct loopback_msg`.
        let code = unsafe { fetch_message(self.file.as_raw_fd(), &mut event) }
            .map_err(|source| Error::Ioctl { op: "fetch", source })?;
        fetch_outcome(code, event)
    }

    fn read_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        Ok((&self.file).read(buf)?)
    }

    fn write_bytes(&self, buf: &[u8]) -> Result<usize> {
        Ok((&self.file).write(buf)?)
    }

    fn commit(&self) -> Result<()> {
        // SAFETY: the commit request takes no argument.
        let code = unsafe { commit_message(self.file.as_raw_fd()) }
            .map_err(|source| Error::Ioctl { op: "commit", source })?;
        commit_result(code)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_pattern() {
        assert_eq!(
            device_path("/dev/i2c", 0),
            PathBuf::from("/dev/i2c-0-master")
        );
        assert_eq!(
            device_path("/tmp/fake", 12),
            PathBuf::from("/tmp/fake-12-master")
        );
    }

    #[test]
    fn missing_device_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("i2c");
        let err = LinuxSlaveTransport::open(base.to_str().unwrap(), 3).unwrap_err();
        match err {
            Error::DeviceUnavailable { path, .. } => {
                assert!(path.ends_with("i2c-3-master"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Error::DeviceUnavailable {
            path: PathBuf::new(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .is_fatal());
    }

    #[test]
    fn regular_file_passes_bytes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i2c-0-master");
        std::fs::write(&path, [0x10, 0x20]).unwrap();

        let transport = LinuxSlaveTransport::open_path(&path).unwrap();
        assert_eq!(transport.describe(), path.display().to_string());

        let mut buf = [0u8; 2];
        assert_eq!(transport.read_bytes(&mut buf).unwrap(), 2);
        assert_eq!(buf, [0x10, 0x20]);
        assert_eq!(transport.write_bytes(&[0xAA]).unwrap(), 1);
    }

    #[test]
    fn ioctl_on_regular_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i2c-0-master");
        std::fs::write(&path, b"").unwrap();

        let transport = LinuxSlaveTransport::open_path(&path).unwrap();
        let err = transport.fetch_pending().unwrap_err();
        assert!(matches!(err, Error::Ioctl { op: "fetch", .. }));
        assert!(err.is_fatal());
    }
}
