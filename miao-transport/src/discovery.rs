//! Device discovery for the Angry Miao receiver
//!
//! One VID/PID pair exposes several HID interfaces and only one of them
//! accepts the vendor feature reports. Picking another returns garbage
//! without any error, so selection must be deterministic.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::TransportError;
use crate::protocol::device;
use crate::types::DeviceCandidate;
use crate::HidBackend;

/// Pick the vendor interface among enumerated candidates
///
/// Policy, in order:
/// 1. interface number 2
/// 2. path containing `mi_02` (case-insensitive)
/// 3. first match in enumeration order
pub fn select_candidate(
    candidates: &[DeviceCandidate],
    vid: u16,
    pid: u16,
) -> Option<&DeviceCandidate> {
    let matching: Vec<&DeviceCandidate> = candidates
        .iter()
        .filter(|c| c.vendor_id == vid && c.product_id == pid)
        .collect();

    matching
        .iter()
        .find(|c| c.interface_number == Some(device::TARGET_INTERFACE))
        .or_else(|| {
            matching.iter().find(|c| {
                c.path
                    .to_ascii_lowercase()
                    .contains(device::INTERFACE_PATH_MARKER)
            })
        })
        .or_else(|| matching.first())
        .copied()
}

/// Resolves VID/PID to an OS device path
pub struct DeviceLocator {
    backend: Arc<dyn HidBackend>,
}

impl DeviceLocator {
    pub fn new(backend: Arc<dyn HidBackend>) -> Self {
        Self { backend }
    }

    /// Find the device path for `vid`/`pid`
    ///
    /// Enumeration failures are surfaced immediately, not retried.
    pub fn locate(&self, vid: u16, pid: u16) -> Result<String, TransportError> {
        let candidates = self.backend.enumerate()?;
        let selected = select_candidate(&candidates, vid, pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        debug!(
            "Selected VID={:04X} PID={:04X} interface={:?} path={}",
            vid, pid, selected.interface_number, selected.path
        );
        Ok(selected.path.clone())
    }

    /// All interfaces matching `vid`/`pid` (or every interface when both are `None`)
    pub fn list(
        &self,
        vid: Option<u16>,
        pid: Option<u16>,
    ) -> Result<Vec<DeviceCandidate>, TransportError> {
        let candidates: Vec<DeviceCandidate> = self
            .backend
            .enumerate()?
            .into_iter()
            .filter(|c| vid.map_or(true, |v| c.vendor_id == v))
            .filter(|c| pid.map_or(true, |p| c.product_id == p))
            .collect();
        info!("Found {} matching HID interface(s)", candidates.len());
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn candidate(pid: u16, path: &str, interface: Option<i32>) -> DeviceCandidate {
        DeviceCandidate {
            vendor_id: 0x3151,
            product_id: pid,
            path: path.to_string(),
            interface_number: interface,
        }
    }

    #[test]
    fn test_prefers_interface_two() {
        let candidates = vec![
            candidate(0x5007, "/dev/hidraw0", Some(0)),
            candidate(0x5007, "HID#VID_3151&PID_5007&MI_02#a", Some(1)),
            candidate(0x5007, "/dev/hidraw2", Some(2)),
        ];
        let selected = select_candidate(&candidates, 0x3151, 0x5007).unwrap();
        assert_eq!(selected.path, "/dev/hidraw2");
    }

    #[test]
    fn test_falls_back_to_path_marker() {
        let candidates = vec![
            candidate(0x5007, r"\\?\HID#VID_3151&PID_5007&MI_00#x", None),
            candidate(0x5007, r"\\?\HID#VID_3151&PID_5007&Mi_02#y", None),
        ];
        let selected = select_candidate(&candidates, 0x3151, 0x5007).unwrap();
        assert!(selected.path.ends_with("#y"));
    }

    #[test]
    fn test_falls_back_to_first_match() {
        let candidates = vec![
            candidate(0x1234, "/dev/hidraw0", Some(2)),
            candidate(0x5007, "/dev/hidraw1", Some(0)),
            candidate(0x5007, "/dev/hidraw3", Some(1)),
        ];
        let selected = select_candidate(&candidates, 0x3151, 0x5007).unwrap();
        assert_eq!(selected.path, "/dev/hidraw1");
    }

    #[test]
    fn test_ignores_other_products() {
        let candidates = vec![candidate(0x1234, "/dev/hidraw0", Some(2))];
        assert!(select_candidate(&candidates, 0x3151, 0x5007).is_none());
    }

    #[test]
    fn test_locate_not_found() {
        let backend = Arc::new(MockBackend::new());
        let locator = DeviceLocator::new(backend.clone());
        assert_eq!(
            locator.locate(0x3151, 0x5007),
            Err(TransportError::DeviceNotFound {
                vid: 0x3151,
                pid: 0x5007
            })
        );
        assert_eq!(backend.enumerate_calls(), 1);
    }

    #[test]
    fn test_locate_enumeration_error() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_enumeration("access denied");
        let locator = DeviceLocator::new(backend);
        assert_eq!(
            locator.locate(0x3151, 0x5007),
            Err(TransportError::Enumeration("access denied".into()))
        );
    }

    #[test]
    fn test_list_filters() {
        let backend = Arc::new(MockBackend::new());
        backend.add_candidate(candidate(0x5007, "/dev/hidraw1", Some(2)));
        backend.add_candidate(candidate(0x1234, "/dev/hidraw2", Some(0)));
        let locator = DeviceLocator::new(backend);

        assert_eq!(locator.list(None, None).unwrap().len(), 2);
        assert_eq!(locator.list(Some(0x3151), Some(0x5007)).unwrap().len(), 1);
    }
}
