//! Diagnostic trouble code decoding

use crate::framer::is_negative;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Description used when a code is not in the dictionary
pub const UNKNOWN_CODE: &str = "Unknown code";

/// System a trouble code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtcCategory {
    Powertrain,
    Chassis,
    Body,
    Network,
}

impl DtcCategory {
    /// Category from the first hex digit of a code group (0-3)
    pub fn from_digit(digit: u32) -> Option<Self> {
        match digit {
            0 => Some(DtcCategory::Powertrain),
            1 => Some(DtcCategory::Chassis),
            2 => Some(DtcCategory::Body),
            3 => Some(DtcCategory::Network),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }
}

/// A decoded trouble code with its description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroubleCode {
    /// Five characters, e.g. `P0133`
    pub code: String,
    pub description: String,
}

impl TroubleCode {
    /// Build a code and look up its description
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let description = describe_code(&code).to_string();
        Self { code, description }
    }

    pub fn category(&self) -> Option<DtcCategory> {
        match self.code.chars().next()? {
            'P' => Some(DtcCategory::Powertrain),
            'C' => Some(DtcCategory::Chassis),
            'B' => Some(DtcCategory::Body),
            'U' => Some(DtcCategory::Network),
            _ => None,
        }
    }
}

impl fmt::Display for TroubleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

/// Decode a mode 03 reply into trouble codes.
///
/// The hex string is read in 4-digit groups. The first digit picks the
/// category letter and the other three follow a `0`, so `0133` reads as
/// `P0133`. `0000` groups are padding, groups with a category digit above 3
/// are skipped, and a trailing partial group is ignored.
pub fn decode_trouble_codes(response: &str) -> Vec<TroubleCode> {
    if is_negative(response) {
        return Vec::new();
    }

    let compact: Vec<char> = response.chars().filter(|c| !c.is_whitespace()).collect();

    compact
        .chunks_exact(4)
        .filter_map(|group| {
            if group.iter().all(|&c| c == '0') {
                return None;
            }
            if !group.iter().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            let category = group[0].to_digit(16).and_then(DtcCategory::from_digit)?;
            let mut code = String::with_capacity(5);
            code.push(category.letter());
            code.push('0');
            code.extend(&group[1..]);
            Some(TroubleCode::new(code))
        })
        .collect()
}

/// Description for a code, or [`UNKNOWN_CODE`]
pub fn describe_code(code: &str) -> &'static str {
    DESCRIPTIONS
        .binary_search_by_key(&code, |&(c, _)| c)
        .map(|i| DESCRIPTIONS[i].1)
        .unwrap_or(UNKNOWN_CODE)
}

/// Known codes, sorted by code
static DESCRIPTIONS: &[(&str, &str)] = &[
    ("P0100", "Mass or Volume Air Flow Circuit Malfunction"),
    ("P0101", "Mass or Volume Air Flow Circuit Range/Performance Problem"),
    ("P0102", "Mass or Volume Air Flow Circuit Low Input"),
    ("P0103", "Mass or Volume Air Flow Circuit High Input"),
    ("P0104", "Mass or Volume Air Flow Circuit Intermittent"),
    ("P0105", "Manifold Absolute Pressure/Barometric Pressure Circuit Malfunction"),
    ("P0106", "Manifold Absolute Pressure/Barometric Pressure Circuit Range/Performance Problem"),
    ("P0107", "Manifold Absolute Pressure/Barometric Pressure Circuit Low Input"),
    ("P0108", "Manifold Absolute Pressure/Barometric Pressure Circuit High Input"),
    ("P0109", "Manifold Absolute Pressure/Barometric Pressure Circuit Intermittent"),
    ("P0110", "Intake Air Temperature Circuit Malfunction"),
    ("P0111", "Intake Air Temperature Circuit Range/Performance Problem"),
    ("P0112", "Intake Air Temperature Circuit Low Input"),
    ("P0113", "Intake Air Temperature Circuit High Input"),
    ("P0114", "Intake Air Temperature Circuit Intermittent"),
    ("P0115", "Engine Coolant Temperature Circuit Malfunction"),
    ("P0116", "Engine Coolant Temperature Circuit Range/Performance Problem"),
    ("P0117", "Engine Coolant Temperature Circuit Low Input"),
    ("P0118", "Engine Coolant Temperature Circuit High Input"),
    ("P0119", "Engine Coolant Temperature Circuit Intermittent"),
    ("P0120", "Throttle Position Sensor/Switch A Circuit Malfunction"),
    ("P0121", "Throttle Position Sensor/Switch A Circuit Range/Performance Problem"),
    ("P0122", "Throttle Position Sensor/Switch A Circuit Low Input"),
    ("P0123", "Throttle Position Sensor/Switch A Circuit High Input"),
    ("P0124", "Throttle Position Sensor/Switch A Circuit Intermittent"),
    ("P0125", "Insufficient Coolant Temperature for Closed Loop Fuel Control"),
    ("P0126", "Insufficient Coolant Temperature for Stable Operation"),
    ("P0128", "Coolant Thermostat (Coolant Temperature Below Thermostat Regulating Temperature)"),
    ("P0130", "O2 Sensor Circuit Malfunction (Bank 1 Sensor 1)"),
    ("P0131", "O2 Sensor Circuit Low Voltage (Bank 1 Sensor 1)"),
    ("P0132", "O2 Sensor Circuit High Voltage (Bank 1 Sensor 1)"),
    ("P0133", "O2 Sensor Circuit Slow Response (Bank 1 Sensor 1)"),
    ("P0134", "O2 Sensor Circuit No Activity Detected (Bank 1 Sensor 1)"),
    ("P0135", "O2 Sensor Heater Circuit Malfunction (Bank 1 Sensor 1)"),
    ("P0171", "System Too Lean (Bank 1)"),
    ("P0172", "System Too Rich (Bank 1)"),
    ("P0300", "Random/Multiple Cylinder Misfire Detected"),
    ("P0301", "Cylinder 1 Misfire Detected"),
    ("P0302", "Cylinder 2 Misfire Detected"),
    ("P0303", "Cylinder 3 Misfire Detected"),
    ("P0304", "Cylinder 4 Misfire Detected"),
];
