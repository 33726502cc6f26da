//! Transport error types

use thiserror::Error;

/// Errors that can occur while locating or talking to the receiver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The OS refused to enumerate HID devices (driver or permission issue)
    #[error("HID enumeration failed: {0}")]
    Enumeration(String),

    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    /// The activation report (0xF7) could not be written
    #[error("Init report write failed: {0}")]
    InitWrite(String),

    #[error("Feature report read failed: {0}")]
    Read(String),

    /// Report was absent, short, or carried the wrong id
    #[error("Unexpected report format: {payload}")]
    Parse { payload: String },

    /// All attempts failed; only the most recent failure is kept
    #[error("Battery read failed after {attempts} attempt(s): {last}")]
    BatteryReadFailed {
        attempts: u32,
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Errors that are not per-attempt faults and must not be retried
    pub fn is_fatal_for_read(&self) -> bool {
        matches!(
            self,
            TransportError::Enumeration(_) | TransportError::DeviceNotFound { .. }
        )
    }

    /// The underlying failure, unwrapping a retry aggregate
    pub fn last_error(&self) -> &TransportError {
        match self {
            TransportError::BatteryReadFailed { last, .. } => last,
            other => other,
        }
    }
}

/// Message for a hidapi failure, with permission problems called out
pub(crate) fn describe_hid_error(e: &hidapi::HidError) -> String {
    let msg = e.to_string();
    if msg.contains("Permission denied") || msg.contains("EPERM") {
        format!("permission denied ({msg}); check udev rules for hidraw access")
    } else {
        msg
    }
}
