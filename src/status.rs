//! Committed battery status shown to consumers

use std::fmt;

use miao_transport::TransportError;
use serde::Serialize;

/// Label used for every read failure
pub const ERROR_LABEL: &str = "error";

/// The value consumers see
///
/// Equality drives redraw dedup: values compare by percentage, errors by
/// label and detail, and different kinds never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Status {
    /// Nothing read yet
    #[default]
    Unknown,
    Value { percent: u8 },
    Error { label: String, detail: String },
}

impl Status {
    pub fn from_read(result: &Result<u8, TransportError>) -> Self {
        match result {
            Ok(percent) => Status::Value { percent: *percent },
            Err(e) => Status::Error {
                label: ERROR_LABEL.to_string(),
                detail: e.to_string(),
            },
        }
    }

    /// Short title for a key or tray icon
    pub fn display_text(&self) -> String {
        match self {
            Status::Unknown => "--".to_string(),
            Status::Value { percent } => format!("{percent}%"),
            Status::Error { .. } => "ERR".to_string(),
        }
    }

    pub fn percent(&self) -> Option<u8> {
        match self {
            Status::Value { percent } => Some(*percent),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unknown => write!(f, "unknown"),
            Status::Value { percent } => write!(f, "{percent}%"),
            Status::Error { label, detail } => write!(f, "{label}: {detail}"),
        }
    }
}
