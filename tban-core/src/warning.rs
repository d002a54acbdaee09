//! Advisory states reported by the device itself
//!
//! These are not errors: the controller publishes a warning level in the base
//! buffer and the mini add-on publishes a status code. Both are plain lookups.

use serde::Serialize;

/// Warning level entry: (code, short text, description)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarningLevel {
    pub code: u8,
    pub text: &'static str,
    pub description: &'static str,
}

pub const WARNING_LEVELS: [WarningLevel; 11] = [
    WarningLevel { code: 0, text: "Normal", description: "Normal" },
    WarningLevel { code: 1, text: "Startup", description: "Starting up" },
    WarningLevel { code: 3, text: "USB reset", description: "USB has been reset" },
    WarningLevel { code: 4, text: "HeatsinkWarn", description: "Heatsink onboard warning" },
    WarningLevel { code: 5, text: "SensorAssignment", description: "Sensor assignment" },
    WarningLevel {
        code: 8,
        text: "HeatsinkCritical",
        description: "Heatsink onboard critical - Reaction: after 10s all to PWM, after 20s all to 100%",
    },
    WarningLevel { code: 10, text: "FanBlock", description: "One of the fans are blocked" },
    WarningLevel { code: 12, text: "Flow", description: "Flowmeter range" },
    WarningLevel { code: 18, text: "TempCritical", description: "Critical temperature reached" },
    WarningLevel { code: 19, text: "SwitchOffWarn", description: "Switch off warning" },
    WarningLevel { code: 20, text: "SwitchOff", description: "Switching off" },
];

/// Look up a device warning level
pub fn warning_level(code: u8) -> Option<&'static WarningLevel> {
    WARNING_LEVELS.iter().find(|w| w.code == code)
}

/// Short text for a warning level, `"Unknown"` for unlisted codes
pub fn warning_text(code: u8) -> &'static str {
    warning_level(code).map(|w| w.text).unwrap_or("Unknown")
}

const MINI_STATUS_TEXT: [&str; 16] = [
    "nothing",
    "remote control active channel A",
    "remote control active channel B",
    "remote control active both channels",
    "no sensor found at channel A",
    "no sensor found at channel B",
    "no sensor found on both channels",
    "RPM fail at channel A",
    "RPM fail at channel B",
    "RPM fail at both channels",
    "fan block at channel A",
    "fan block at channel B",
    "fan block at both channels",
    "channel 1 overtemp",
    "channel 2 overtemp",
    "both channels overtemp",
];

/// Text for the mini status byte
pub fn mini_status_text(code: u8) -> Option<&'static str> {
    MINI_STATUS_TEXT.get(code as usize).copied()
}
