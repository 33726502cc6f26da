//! In-memory HID backend for testing without a receiver attached
//!
//! Each `open()` consumes the next scripted [`MockAttempt`]; once the script
//! is exhausted the fallback attempt is used for every further open.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::protocol::{cmd, report, REPORT_SIZE};
use crate::types::DeviceCandidate;
use crate::{FeatureDevice, HidBackend};

/// Behaviour of one scripted open/activate/read cycle
#[derive(Debug, Clone)]
pub enum MockAttempt {
    /// `open()` fails
    OpenFails(String),
    /// Activation write fails
    WriteFails(String),
    /// Feature report read fails
    ReadFails(String),
    /// Read returns this raw report (`None` = empty answer)
    Report(Option<Vec<u8>>),
}

impl MockAttempt {
    /// A well-formed 0xF7 report carrying `level`
    pub fn battery(level: u8) -> Self {
        let mut data = vec![0u8; REPORT_SIZE];
        data[0] = cmd::BATTERY_REPORT_ID;
        data[report::BATTERY_OFFSET] = level;
        MockAttempt::Report(Some(data))
    }
}

#[derive(Default)]
struct Counters {
    enumerate: AtomicUsize,
    open: AtomicUsize,
    close: AtomicUsize,
}

/// Scripted HID backend
pub struct MockBackend {
    candidates: Mutex<Vec<DeviceCandidate>>,
    enumeration_error: Mutex<Option<String>>,
    script: Mutex<VecDeque<MockAttempt>>,
    fallback: Mutex<MockAttempt>,
    opened_paths: Mutex<Vec<String>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    counters: Arc<Counters>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Backend with no devices; every open reads a 50% report
    pub fn new() -> Self {
        Self {
            candidates: Mutex::new(Vec::new()),
            enumeration_error: Mutex::new(None),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(MockAttempt::battery(50)),
            opened_paths: Mutex::new(Vec::new()),
            writes: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Backend exposing the receiver's vendor interface at `path`
    pub fn with_receiver(path: &str) -> Self {
        let backend = Self::new();
        backend.add_candidate(DeviceCandidate {
            vendor_id: crate::protocol::device::VENDOR_ID,
            product_id: crate::protocol::device::PRODUCT_ID,
            path: path.to_string(),
            interface_number: Some(crate::protocol::device::TARGET_INTERFACE),
        });
        backend
    }

    pub fn add_candidate(&self, candidate: DeviceCandidate) {
        self.candidates.lock().push(candidate);
    }

    pub fn fail_enumeration(&self, reason: &str) {
        *self.enumeration_error.lock() = Some(reason.to_string());
    }

    /// Queue attempts consumed one per `open()`
    pub fn push_attempts(&self, attempts: impl IntoIterator<Item = MockAttempt>) {
        self.script.lock().extend(attempts);
    }

    /// Behaviour once the script is exhausted
    pub fn set_fallback(&self, attempt: MockAttempt) {
        *self.fallback.lock() = attempt;
    }

    pub fn enumerate_calls(&self) -> usize {
        self.counters.enumerate.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.counters.close.load(Ordering::SeqCst)
    }

    /// Handles opened successfully but never closed
    pub fn leaked_handles(&self) -> usize {
        let opened = self.opened_paths.lock().len();
        opened.saturating_sub(self.close_calls())
    }

    /// Paths successfully opened, in order
    pub fn opened_paths(&self) -> Vec<String> {
        self.opened_paths.lock().clone()
    }

    /// Every feature report written, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    fn next_attempt(&self) -> MockAttempt {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone())
    }
}

impl HidBackend for MockBackend {
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>, TransportError> {
        self.counters.enumerate.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.enumeration_error.lock().clone() {
            return Err(TransportError::Enumeration(reason));
        }
        Ok(self.candidates.lock().clone())
    }

    fn open(&self, path: &str) -> Result<Box<dyn FeatureDevice>, TransportError> {
        self.counters.open.fetch_add(1, Ordering::SeqCst);
        let attempt = self.next_attempt();
        if let MockAttempt::OpenFails(reason) = attempt {
            return Err(TransportError::Open {
                path: path.to_string(),
                reason,
            });
        }
        self.opened_paths.lock().push(path.to_string());
        Ok(Box::new(MockDevice {
            attempt,
            writes: Arc::clone(&self.writes),
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

struct MockDevice {
    attempt: MockAttempt,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    counters: Arc<Counters>,
    closed: bool,
}

impl FeatureDevice for MockDevice {
    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if let MockAttempt::WriteFails(reason) = &self.attempt {
            return Err(TransportError::InitWrite(reason.clone()));
        }
        self.writes.lock().push(data.to_vec());
        Ok(())
    }

    fn get_feature_report(
        &mut self,
        _report_id: u8,
        len: usize,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        match &self.attempt {
            MockAttempt::ReadFails(reason) => Err(TransportError::Read(reason.clone())),
            MockAttempt::Report(data) => Ok(data.clone().map(|mut d| {
                d.truncate(len);
                d
            })),
            _ => Ok(None),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.close.fetch_add(1, Ordering::SeqCst);
        }
    }
}
