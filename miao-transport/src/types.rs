//! Common types for the transport layer

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{device, timing};

/// Shortest allowed poll interval
pub const MIN_POLL_INTERVAL_SECS: f64 = 5.0;
/// Poll interval when none is configured
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 30.0;

/// One enumerated HID interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// OS device path
    pub path: String,
    /// USB interface number, if the platform reports one
    pub interface_number: Option<i32>,
}

/// Device configuration snapshot
///
/// Replaced wholesale on every config update; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Pinned device path; bypasses discovery when non-empty
    pub hid_path: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub poll_interval_seconds: f64,
    pub init_delay_ms: u64,
    pub retry_count: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            hid_path: None,
            vendor_id: None,
            product_id: None,
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            init_delay_ms: timing::DEFAULT_INIT_DELAY_MS,
            retry_count: timing::DEFAULT_RETRY_COUNT,
        }
    }
}

impl DeviceConfig {
    /// Pinned path, ignoring empty strings
    pub fn pinned_path(&self) -> Option<&str> {
        self.hid_path.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// Configured VID/PID, falling back to the receiver's published ids
    pub fn device_ids(&self) -> (u16, u16) {
        (
            self.vendor_id.unwrap_or(device::VENDOR_ID),
            self.product_id.unwrap_or(device::PRODUCT_ID),
        )
    }

    /// Settle delay between activation and telemetry read
    pub fn init_delay(&self) -> Duration {
        Duration::from_millis(self.init_delay_ms)
    }

    /// Effective poll interval, never shorter than 5 seconds
    pub fn poll_interval(&self) -> Duration {
        let secs = if self.poll_interval_seconds.is_finite() {
            self.poll_interval_seconds.max(MIN_POLL_INTERVAL_SECS)
        } else {
            DEFAULT_POLL_INTERVAL_SECS
        };
        Duration::from_millis((secs * 1000.0).round() as u64)
    }

    /// Attempts per read, at least one
    pub fn attempts(&self) -> u32 {
        self.retry_count.max(1)
    }
}
