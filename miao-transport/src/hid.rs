//! hidapi backend

use std::ffi::CString;

use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{describe_hid_error, TransportError};
use crate::types::DeviceCandidate;
use crate::{FeatureDevice, HidBackend};

/// HID backend over the system hidapi library
///
/// hidapi allows a single context per process, so one `HidApi` is created up
/// front and its device list refreshed before every enumeration.
pub struct HidApiBackend {
    api: Mutex<HidApi>,
}

impl HidApiBackend {
    /// Initialise the hidapi context
    pub fn new() -> Result<Self, TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::Enumeration(describe_hid_error(&e)))?;
        Ok(Self {
            api: Mutex::new(api),
        })
    }
}

impl HidBackend for HidApiBackend {
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>, TransportError> {
        let mut api = self.api.lock();
        api.refresh_devices()
            .map_err(|e| TransportError::Enumeration(describe_hid_error(&e)))?;

        let candidates: Vec<DeviceCandidate> = api
            .device_list()
            .map(|info| DeviceCandidate {
                vendor_id: info.vendor_id(),
                product_id: info.product_id(),
                path: info.path().to_string_lossy().to_string(),
                interface_number: Some(info.interface_number()).filter(|n| *n >= 0),
            })
            .collect();

        debug!("Enumerated {} HID interface(s)", candidates.len());
        Ok(candidates)
    }

    fn open(&self, path: &str) -> Result<Box<dyn FeatureDevice>, TransportError> {
        let c_path = CString::new(path).map_err(|_| TransportError::Open {
            path: path.to_string(),
            reason: "path contains an interior NUL byte".into(),
        })?;

        let api = self.api.lock();
        let device = api.open_path(&c_path).map_err(|e| TransportError::Open {
            path: path.to_string(),
            reason: describe_hid_error(&e),
        })?;

        debug!("Opened HID device {}", path);
        Ok(Box::new(HidFeatureDevice {
            device: Some(device),
        }))
    }
}

/// Feature-report handle; the hidapi handle is released on close or drop
struct HidFeatureDevice {
    device: Option<HidDevice>,
}

impl HidFeatureDevice {
    fn handle(&self) -> Result<&HidDevice, TransportError> {
        self.device
            .as_ref()
            .ok_or_else(|| TransportError::Read("device already closed".into()))
    }
}

impl FeatureDevice for HidFeatureDevice {
    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| TransportError::InitWrite("device already closed".into()))?;
        device
            .send_feature_report(data)
            .map_err(|e| TransportError::InitWrite(describe_hid_error(&e)))
    }

    fn get_feature_report(
        &mut self,
        report_id: u8,
        len: usize,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let device = self.handle()?;
        let mut buf = vec![0u8; len.max(1)];
        buf[0] = report_id;
        let read = device
            .get_feature_report(&mut buf)
            .map_err(|e| TransportError::Read(describe_hid_error(&e)))?;

        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some(buf))
    }

    fn close(&mut self) {
        // HidDevice closes on drop
        if self.device.take().is_some() {
            debug!("Closed HID device");
        }
    }
}
