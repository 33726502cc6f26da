//! Status renderers
//!
//! Provides committed battery status via:
//! 1. Console lines (`watch` command)
//! 2. Simple file export mimicking a sysfs power_supply directory

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::scheduler::ConsumerId;
use crate::status::Status;

/// Receives every committed status, once per active consumer
pub trait Renderer: Send + 'static {
    fn render(&mut self, consumer: &ConsumerId, status: &Status);
}

impl Renderer for Vec<Box<dyn Renderer>> {
    fn render(&mut self, consumer: &ConsumerId, status: &Status) {
        for renderer in self.iter_mut() {
            renderer.render(consumer, status);
        }
    }
}

/// Output format for [`ConsoleRenderer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleFormat {
    /// `[consumer]  57%  57%`
    #[default]
    Text,
    /// Bare percentage, empty line when unavailable
    Quiet,
    /// One JSON object per line
    Json,
}

/// Prints one line per committed status
pub struct ConsoleRenderer {
    format: ConsoleFormat,
}

impl ConsoleRenderer {
    pub fn new(format: ConsoleFormat) -> Self {
        Self { format }
    }

    fn line(&self, consumer: &ConsumerId, status: &Status) -> String {
        match self.format {
            ConsoleFormat::Text => format!("[{consumer}] {:>4}  {status}", status.display_text()),
            ConsoleFormat::Quiet => status
                .percent()
                .map(|percent| percent.to_string())
                .unwrap_or_default(),
            ConsoleFormat::Json => serde_json::json!({
                "consumer": consumer,
                "status": status,
            })
            .to_string(),
        }
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, consumer: &ConsumerId, status: &Status) {
        println!("{}", self.line(consumer, status));
    }
}

/// Power supply status values (matching kernel power_supply.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSupplyStatus {
    Unknown,
    Discharging,
    Full,
}

impl PowerSupplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Discharging => "Discharging",
            Self::Full => "Full",
        }
    }

    /// The receiver does not report charging state
    pub fn from_status(status: &Status) -> Self {
        match status {
            Status::Value { percent } if *percent >= 100 => Self::Full,
            Status::Value { .. } => Self::Discharging,
            _ => Self::Unknown,
        }
    }
}

const TYPE_FILE: &str = "type";
const PRESENT_FILE: &str = "present";
const CAPACITY_FILE: &str = "capacity";
const STATUS_FILE: &str = "status";
const ERROR_FILE: &str = "error";

/// Sysfs-like export directory (`capacity`, `status`, `present`, `type`, `error`)
///
/// The directory is removed when the renderer is dropped.
pub struct StatusFileRenderer {
    base_path: PathBuf,
}

impl StatusFileRenderer {
    /// Create the export directory and write initial "unknown" files
    pub fn new(base_path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        let renderer = Self { base_path };
        renderer.write_file(TYPE_FILE, "Battery")?;
        renderer.sync(&Status::Unknown)?;
        Ok(renderer)
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn sync(&self, status: &Status) -> io::Result<()> {
        let percent = status.percent();
        self.write_file(PRESENT_FILE, if percent.is_some() { "1" } else { "0" })?;
        self.write_file(CAPACITY_FILE, &percent.unwrap_or(0).to_string())?;
        self.write_file(STATUS_FILE, PowerSupplyStatus::from_status(status).as_str())?;
        match status {
            Status::Error { detail, .. } => self.write_file(ERROR_FILE, detail),
            _ => self.write_file(ERROR_FILE, ""),
        }
    }

    fn write_file(&self, name: &str, value: &str) -> io::Result<()> {
        let path = self.base_path.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        writeln!(file, "{}", value)?;
        Ok(())
    }
}

impl Renderer for StatusFileRenderer {
    fn render(&mut self, _consumer: &ConsumerId, status: &Status) {
        if let Err(e) = self.sync(status) {
            warn!("Failed to export status to {}: {}", self.base_path.display(), e);
        }
    }
}

impl Drop for StatusFileRenderer {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.base_path);
        debug!("Removed status export {}", self.base_path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(dir: &Path, name: &str) -> String {
        fs::read_to_string(dir.join(name)).unwrap().trim().to_string()
    }

    #[test]
    fn test_console_lines() {
        let consumer = "key-1".to_string();
        let status = Status::Value { percent: 57 };

        let text = ConsoleRenderer::new(ConsoleFormat::Text).line(&consumer, &status);
        assert_eq!(text, "[key-1]  57%  57%");

        let quiet = ConsoleRenderer::new(ConsoleFormat::Quiet);
        assert_eq!(quiet.line(&consumer, &status), "57");
        assert_eq!(quiet.line(&consumer, &Status::Unknown), "");

        let json = ConsoleRenderer::new(ConsoleFormat::Json).line(&consumer, &status);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["consumer"], "key-1");
        assert_eq!(parsed["status"]["percent"], 57);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(
            PowerSupplyStatus::from_status(&Status::Value { percent: 100 }),
            PowerSupplyStatus::Full
        );
        assert_eq!(
            PowerSupplyStatus::from_status(&Status::Value { percent: 40 }).as_str(),
            "Discharging"
        );
        assert_eq!(
            PowerSupplyStatus::from_status(&Status::Unknown).as_str(),
            "Unknown"
        );
    }

    #[test]
    fn test_file_export() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("angry-miao");
        let mut renderer = StatusFileRenderer::new(&dir).unwrap();
        assert_eq!(read(&dir, "type"), "Battery");
        assert_eq!(read(&dir, "present"), "0");

        renderer.render(&"export".to_string(), &Status::Value { percent: 57 });
        assert_eq!(read(&dir, "capacity"), "57");
        assert_eq!(read(&dir, "present"), "1");
        assert_eq!(read(&dir, "status"), "Discharging");

        renderer.render(
            &"export".to_string(),
            &Status::Error {
                label: "error".into(),
                detail: "Device not found".into(),
            },
        );
        assert_eq!(read(&dir, "capacity"), "0");
        assert_eq!(read(&dir, "status"), "Unknown");
        assert_eq!(read(&dir, "error"), "Device not found");

        drop(renderer);
        assert!(!dir.exists());
    }
}
