//! Runtime configuration.
//!
//! Options come from the command line, with environment variables as the
//! fallback so the daemon can be configured from a systemd unit.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::{emulation::DEFAULT_SIZE, poll_loop::PollConfig, transport::device_path};

/// Text placed at the start of the emulated buffer unless overridden.
pub const DEFAULT_SEED: &str = "HUEBR WORLD\u{0}\u{1}\u{2}\u{3}\u{4}\u{5}";

const MAX_BUFFER_SIZE: usize = 65536;

/// Emulate an I2C slave through the i2c-loopback driver.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Bus index of the slave channel
    #[arg(short, long, env = "IOBRIDGE_BUS", default_value_t = 0)]
    pub bus: u32,

    /// Device path prefix; the node opened is <base>-<bus>-master
    #[arg(long, env = "IOBRIDGE_DEVICE_BASE", default_value = "/dev/i2c")]
    pub device_base: String,

    /// Sleep between empty polls, in milliseconds
    #[arg(long, env = "IOBRIDGE_POLL_INTERVAL_MS", default_value_t = 1)]
    pub poll_interval_ms: u64,

    /// Size of the emulated register file in bytes (1-65536)
    #[arg(long, env = "IOBRIDGE_BUFFER_SIZE", default_value_t = DEFAULT_SIZE)]
    pub buffer_size: usize,

    /// Text copied to the start of the register file
    #[arg(long, env = "IOBRIDGE_SEED", default_value = DEFAULT_SEED, hide_default_value = true)]
    pub seed: String,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bus: u32,
    pub device_base: String,
    pub poll: PollConfig,
    pub buffer_size: usize,
    pub seed: Vec<u8>,
}

impl BridgeConfig {
    /// Path of the slave character device.
    pub fn device_path(&self) -> PathBuf {
        device_path(&self.device_base, self.bus)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bus: 0,
            device_base: "/dev/i2c".to_string(),
            poll: PollConfig::default(),
            buffer_size: DEFAULT_SIZE,
            seed: DEFAULT_SEED.as_bytes().to_vec(),
        }
    }
}

impl From<Args> for BridgeConfig {
    fn from(args: Args) -> Self {
        Self {
            bus: args.bus,
            device_base: args.device_base,
            poll: PollConfig {
                interval: Duration::from_millis(args.poll_interval_ms),
            },
            buffer_size: args.buffer_size.clamp(1, MAX_BUFFER_SIZE),
            seed: args.seed.into_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "IOBRIDGE_BUS",
        "IOBRIDGE_DEVICE_BASE",
        "IOBRIDGE_POLL_INTERVAL_MS",
        "IOBRIDGE_BUFFER_SIZE",
        "IOBRIDGE_SEED",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults() {
        clear_env();
        let config = BridgeConfig::from(Args::parse_from(["iobridge"]));
        assert_eq!(config.device_path(), PathBuf::from("/dev/i2c-0-master"));
        assert_eq!(config.poll.interval, Duration::from_millis(1));
        assert_eq!(config.buffer_size, 256);
        assert!(config.seed.starts_with(b"HUEBR WORLD"));
    }

    #[test]
    #[serial]
    fn flags_override() {
        clear_env();
        let args = Args::parse_from([
            "iobridge",
            "--bus",
            "3",
            "--device-base",
            "/tmp/loop",
            "--poll-interval-ms",
            "5",
            "--seed",
            "abc",
        ]);
        let config = BridgeConfig::from(args);
        assert_eq!(config.device_path(), PathBuf::from("/tmp/loop-3-master"));
        assert_eq!(config.poll.interval, Duration::from_millis(5));
        assert_eq!(config.seed, b"abc");
    }

    #[test]
    #[serial]
    fn environment_fallback() {
        clear_env();
        std::env::set_var("IOBRIDGE_BUS", "7");
        std::env::set_var("IOBRIDGE_BUFFER_SIZE", "0");
        let config = BridgeConfig::from(Args::parse_from(["iobridge"]));
        clear_env();

        assert_eq!(config.bus, 7);
        assert_eq!(config.buffer_size, 1);
    }

    #[test]
    #[serial]
    fn buffer_size_clamped_high() {
        clear_env();
        let config = BridgeConfig::from(Args::parse_from([
            "iobridge",
            "--buffer-size",
            "1000000",
        ]));
        assert_eq!(config.buffer_size, MAX_BUFFER_SIZE);
    }
}
