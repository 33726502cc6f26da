//! Single read attempt against an open receiver

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::TransportError;
use crate::protocol::{self, cmd, REPORT_SIZE};
use crate::{FeatureDevice, HidBackend};

/// Scoped device handle, closed when dropped
///
/// A leaked handle blocks every later open of the same path until the
/// process exits, so release happens in `Drop` and covers early returns,
/// errors and panics alike.
pub struct DeviceSession {
    device: Box<dyn FeatureDevice>,
    path: String,
}

impl DeviceSession {
    /// Open the interface at `path`
    pub fn open(backend: &dyn HidBackend, path: &str) -> Result<Self, TransportError> {
        let device = backend.open(path)?;
        Ok(Self {
            device,
            path: path.to_string(),
        })
    }

    /// Send the 0xF7 activation report
    pub fn activate(&mut self) -> Result<(), TransportError> {
        let buf = protocol::build_activation_report();
        debug!("Sending activation 0x{:02X} to {}", cmd::ACTIVATE, self.path);
        self.device.send_feature_report(&buf)
    }

    /// Read the raw 0xF7 telemetry report
    pub fn read_report(&mut self) -> Result<Vec<u8>, TransportError> {
        let data = self
            .device
            .get_feature_report(cmd::BATTERY_REPORT_ID, REPORT_SIZE)?
            .ok_or_else(|| TransportError::Parse {
                payload: protocol::hex_dump(&[]),
            })?;
        debug!(
            "Report 0x{:02X}: {}",
            cmd::BATTERY_REPORT_ID,
            protocol::hex_dump(&data[..data.len().min(8)])
        );
        Ok(data)
    }

    /// Read report 0xF7 and decode the battery byte
    pub fn read_battery(&mut self) -> Result<u8, TransportError> {
        let data = self.read_report()?;
        protocol::parse_battery_report(&data)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.device.close();
        debug!("Released {}", self.path);
    }
}

/// Open → activate → settle → read → close, exactly once
pub struct ProtocolSession {
    backend: Arc<dyn HidBackend>,
}

impl ProtocolSession {
    pub fn new(backend: Arc<dyn HidBackend>) -> Self {
        Self { backend }
    }

    /// Perform one activation handshake and telemetry read
    ///
    /// The settle delay yields to the runtime rather than blocking a worker.
    pub async fn read_once(&self, path: &str, init_delay: Duration) -> Result<u8, TransportError> {
        let mut session = DeviceSession::open(self.backend.as_ref(), path)?;
        session.activate()?;
        if !init_delay.is_zero() {
            tokio::time::sleep(init_delay).await;
        }
        session.read_battery()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAttempt, MockBackend};

    const PATH: &str = "/dev/hidraw3";

    async fn read_with(attempt: MockAttempt) -> (Result<u8, TransportError>, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::with_receiver(PATH));
        backend.push_attempts([attempt]);
        let session = ProtocolSession::new(backend.clone());
        let result = session.read_once(PATH, Duration::from_millis(50)).await;
        (result, backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_read() {
        let (result, backend) = read_with(MockAttempt::battery(57)).await;
        assert_eq!(result, Ok(57));
        assert_eq!(backend.close_calls(), 1);
        assert_eq!(backend.leaked_handles(), 0);

        let writes = backend.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 65);
        assert_eq!(writes[0][1], 0xF7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clamps_out_of_range() {
        let (result, _) = read_with(MockAttempt::battery(250)).await;
        assert_eq!(result, Ok(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_opens_nothing() {
        let (result, backend) = read_with(MockAttempt::OpenFails("busy".into())).await;
        assert!(matches!(result, Err(TransportError::Open { .. })));
        assert_eq!(backend.close_calls(), 0);
        assert_eq!(backend.leaked_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_closed_on_write_failure() {
        let (result, backend) = read_with(MockAttempt::WriteFails("pipe".into())).await;
        assert_eq!(result, Err(TransportError::InitWrite("pipe".into())));
        assert_eq!(backend.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_closed_on_read_failure() {
        let (result, backend) = read_with(MockAttempt::ReadFails("io".into())).await;
        assert_eq!(result, Err(TransportError::Read("io".into())));
        assert_eq!(backend.leaked_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_report_is_parse_error() {
        let (result, backend) =
            read_with(MockAttempt::Report(Some(vec![0xF7, 0x00, 0x00]))).await;
        assert_eq!(
            result,
            Err(TransportError::Parse {
                payload: "F7 00 00".into()
            })
        );
        assert_eq!(backend.leaked_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_report_is_parse_error() {
        let (result, _) = read_with(MockAttempt::Report(None)).await;
        assert!(matches!(result, Err(TransportError::Parse { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_init_delay() {
        let backend = Arc::new(MockBackend::with_receiver(PATH));
        let session = ProtocolSession::new(backend);
        let start = tokio::time::Instant::now();
        session
            .read_once(PATH, Duration::from_millis(120))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}
