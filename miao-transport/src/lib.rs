//! Transport layer for Angry Miao battery telemetry
//!
//! The receiver needs a vendor activation write before its 0xF7 feature
//! report carries a valid battery level. This crate covers the whole
//! device-side path:
//!
//! ```text
//! [HidApiBackend / MockBackend]   ← implements HidBackend (raw feature reports)
//!              |
//!       [DeviceLocator]           ← picks the vendor interface by VID/PID
//!              |
//!      [ProtocolSession]          ← open → activate → settle → read → close
//!              |
//!       [BatteryReader]           ← bounded retry, keeps the last failure
//! ```

pub mod discovery;
pub mod error;
pub mod protocol;
pub mod types;

mod hid;
mod retry;
mod session;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use discovery::{select_candidate, DeviceLocator};
pub use error::TransportError;
pub use hid::HidApiBackend;
pub use protocol::{hex_dump, parse_usb_id};
pub use retry::BatteryReader;
pub use session::{DeviceSession, ProtocolSession};
pub use types::{DeviceCandidate, DeviceConfig};

/// Raw HID access - all backends implement this
///
/// Calls are blocking; a single read attempt holds at most one open device.
pub trait HidBackend: Send + Sync {
    /// List every HID interface currently visible to the OS
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>, TransportError>;

    /// Open the interface at `path`
    ///
    /// Fails with [`TransportError::Open`].
    fn open(&self, path: &str) -> Result<Box<dyn FeatureDevice>, TransportError>;
}

/// An open HID interface that speaks feature reports
pub trait FeatureDevice: Send {
    /// Write a feature report (`data[0]` is the report ID)
    ///
    /// Fails with [`TransportError::InitWrite`].
    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Request feature report `report_id`, reading up to `len` bytes
    ///
    /// Returns `None` when the device answered with an empty report.
    /// Fails with [`TransportError::Read`].
    fn get_feature_report(
        &mut self,
        report_id: u8,
        len: usize,
    ) -> Result<Option<Vec<u8>>, TransportError>;

    /// Release the handle. Never fails observably.
    fn close(&mut self);
}
