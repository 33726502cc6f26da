//! Bounded-retry battery reads

use std::sync::Arc;

use tracing::{debug, warn};

use crate::discovery::DeviceLocator;
use crate::error::TransportError;
use crate::session::ProtocolSession;
use crate::types::DeviceConfig;
use crate::HidBackend;

/// Reads the battery level with up to `retry_count` handshake attempts
///
/// Attempts run back to back; the settle delay inside each attempt is the
/// only throttle. Only the most recent failure is kept.
pub struct BatteryReader {
    locator: DeviceLocator,
    session: ProtocolSession,
}

impl BatteryReader {
    pub fn new(backend: Arc<dyn HidBackend>) -> Self {
        Self {
            locator: DeviceLocator::new(Arc::clone(&backend)),
            session: ProtocolSession::new(backend),
        }
    }

    /// Device path for this read: the pinned path, or discovery by VID/PID
    pub fn resolve_path(&self, config: &DeviceConfig) -> Result<String, TransportError> {
        if let Some(path) = config.pinned_path() {
            debug!("Using pinned HID path {}", path);
            return Ok(path.to_string());
        }
        let (vid, pid) = config.device_ids();
        self.locator.locate(vid, pid)
    }

    /// Read the battery percentage (0-100)
    ///
    /// Discovery failures return immediately without consuming an attempt.
    pub async fn read(&self, config: &DeviceConfig) -> Result<u8, TransportError> {
        let path = self.resolve_path(config)?;
        let attempts = config.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.session.read_once(&path, config.init_delay()).await {
                Ok(level) => {
                    debug!("Battery {}% on attempt {}/{}", level, attempt, attempts);
                    return Ok(level);
                }
                Err(e) => {
                    debug!("[attempt {}/{}] {}", attempt, attempts, e);
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| TransportError::Read("no attempt made".into()));
        warn!("Battery read failed after {} attempt(s): {}", attempts, last);
        Err(TransportError::BatteryReadFailed {
            attempts,
            last: Box::new(last),
        })
    }
}
