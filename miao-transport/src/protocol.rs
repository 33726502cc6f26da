//! Protocol constants and report codec for the Angry Miao receiver
//!
//! The receiver only reports battery telemetry after an activation write:
//!
//! ```text
//! SET_REPORT  [0x00, 0xF7, 0x00 × 63]        report id 0, command 0xF7
//! (settle ~50ms)
//! GET_REPORT  id 0xF7, 65 bytes → [0xF7, ?, ?, battery, ...]
//! ```

use crate::error::TransportError;

/// Feature report length: report ID + 64 payload bytes
pub const REPORT_SIZE: usize = 65;

/// Vendor commands
pub mod cmd {
    /// Activation command; must precede every telemetry read
    pub const ACTIVATE: u8 = 0xF7;
    /// Feature report id carrying battery telemetry
    pub const BATTERY_REPORT_ID: u8 = 0xF7;
}

/// Layout of the 0xF7 telemetry report
pub mod report {
    /// Minimum length of a usable report
    pub const MIN_LEN: usize = 4;
    /// Offset of the battery percentage byte
    pub const BATTERY_OFFSET: usize = 3;
    /// Highest valid percentage
    pub const MAX_PERCENT: u8 = 100;
}

/// Timing defaults (milliseconds)
pub mod timing {
    /// Settle time between activation and telemetry read
    pub const DEFAULT_INIT_DELAY_MS: u64 = 50;
    /// Attempts per read
    pub const DEFAULT_RETRY_COUNT: u32 = 3;
}

/// Device identification
pub mod device {
    /// Angry Miao USB vendor ID
    pub const VENDOR_ID: u16 = 0x3151;
    /// Wireless receiver product ID
    pub const PRODUCT_ID: u16 = 0x5007;
    /// The receiver exposes several interfaces; only #2 speaks the vendor protocol
    pub const TARGET_INTERFACE: i32 = 2;
    /// Interface suffix in OS device paths (e.g. `...&MI_02#...` on Windows)
    pub const INTERFACE_PATH_MARKER: &str = "mi_02";
}

/// Build the 65-byte activation report
pub fn build_activation_report() -> [u8; REPORT_SIZE] {
    let mut buf = [0u8; REPORT_SIZE];
    buf[0] = 0; // Report ID
    buf[1] = cmd::ACTIVATE;
    buf
}

/// Extract the battery percentage from a 0xF7 telemetry report
///
/// Out-of-range bytes are clamped to 100 rather than rejected. The receiver
/// occasionally reports them; whether they indicate a read taken before the
/// handshake settled is not known yet.
pub fn parse_battery_report(data: &[u8]) -> Result<u8, TransportError> {
    if data.len() < report::MIN_LEN || data[0] != cmd::BATTERY_REPORT_ID {
        return Err(TransportError::Parse {
            payload: hex_dump(data),
        });
    }
    Ok(data[report::BATTERY_OFFSET].min(report::MAX_PERCENT))
}

/// Space separated upper-case hex, e.g. `F7 00 00 39`
pub fn hex_dump(data: &[u8]) -> String {
    if data.is_empty() {
        return "<empty>".to_string();
    }
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a USB identifier: `12625`, `0x3151` or `3151h`
pub fn parse_usb_id(value: &str) -> Result<u16, String> {
    let cleaned = value.trim().to_ascii_lowercase();
    let parsed = if let Some(hex) = cleaned.strip_prefix("0x") {
        u16::from_str_radix(hex, 16)
    } else if let Some(hex) = cleaned.strip_suffix('h') {
        u16::from_str_radix(hex, 16)
    } else {
        cleaned.parse::<u16>()
    };
    parsed.map_err(|e| format!("invalid USB id '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with_battery(level: u8) -> Vec<u8> {
        let mut data = vec![0u8; REPORT_SIZE];
        data[0] = cmd::BATTERY_REPORT_ID;
        data[report::BATTERY_OFFSET] = level;
        data
    }

    #[test]
    fn test_activation_report_layout() {
        let buf = build_activation_report();
        assert_eq!(buf.len(), 65);
        assert_eq!(buf[0], 0x00);
        assert_eq!(buf[1], 0xF7);
        assert!(buf[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parse_battery_level() {
        assert_eq!(parse_battery_report(&report_with_battery(57)), Ok(57));
        assert_eq!(parse_battery_report(&report_with_battery(0)), Ok(0));
        assert_eq!(parse_battery_report(&report_with_battery(100)), Ok(100));
    }

    #[test]
    fn test_parse_clamps_out_of_range() {
        assert_eq!(parse_battery_report(&report_with_battery(250)), Ok(100));
        assert_eq!(parse_battery_report(&report_with_battery(101)), Ok(100));
    }

    #[test]
    fn test_parse_short_report() {
        let err = parse_battery_report(&[0xF7, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err,
            TransportError::Parse {
                payload: "F7 00 00".into()
            }
        );
    }

    #[test]
    fn test_parse_id_mismatch() {
        let mut data = report_with_battery(57);
        data[0] = 0x05;
        match parse_battery_report(&data) {
            Err(TransportError::Parse { payload }) => assert!(payload.starts_with("05 00 00 39")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0xF7, 0x0a, 0x39]), "F7 0A 39");
        assert_eq!(hex_dump(&[]), "<empty>");
    }

    #[test]
    fn test_parse_usb_id_formats() {
        assert_eq!(parse_usb_id("0x3151"), Ok(0x3151));
        assert_eq!(parse_usb_id("0X5007"), Ok(0x5007));
        assert_eq!(parse_usb_id("3151h"), Ok(0x3151));
        assert_eq!(parse_usb_id(" 12625 "), Ok(12625));
        assert!(parse_usb_id("zz").is_err());
        assert!(parse_usb_id("0x10000").is_err());
    }
}
