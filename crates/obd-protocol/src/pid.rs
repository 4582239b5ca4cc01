//! OBD-II PID Definitions and Response Parsing
//!
//! Every queryable parameter is a variant of the closed [`Pid`] type with one
//! static [`ParameterDefinition`]. Vehicle profiles choose which vendor PIDs
//! get polled; they never add decoding logic.

use crate::error::ObdError;
use crate::framer::is_negative;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mode 01 PIDs known to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(u8)]
pub enum Pid {
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Intake manifold absolute pressure (0x0B)
    IntakePressure = 0x0B,
    /// Engine RPM (0x0C)
    EngineRpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
    /// Engine oil temperature, VAG (0x5C)
    OilTemperature = 0x5C,
    /// Fuel consumption, Toyota (0x5E)
    FuelConsumption = 0x5E,
    /// Turbo pressure, Fiat (0x5F)
    TurboPressure = 0x5F,
    /// Clutch engaged flag, Fiat (0x60)
    ClutchStatus = 0x60,
    /// Hybrid battery charge, Toyota (0xA2)
    HybridBattery = 0xA2,
    /// Boost pressure, VAG (0xA6)
    BoostPressure = 0xA6,
}

impl Pid {
    /// Standard PIDs in poll order
    pub const STANDARD: [Pid; 5] = [
        Pid::Speed,
        Pid::EngineRpm,
        Pid::CoolantTemp,
        Pid::FuelLevel,
        Pid::IntakePressure,
    ];

    /// Every PID in the registry
    pub const ALL: [Pid; 11] = [
        Pid::CoolantTemp,
        Pid::IntakePressure,
        Pid::EngineRpm,
        Pid::Speed,
        Pid::FuelLevel,
        Pid::OilTemperature,
        Pid::FuelConsumption,
        Pid::TurboPressure,
        Pid::ClutchStatus,
        Pid::HybridBattery,
        Pid::BoostPressure,
    ];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Look up a PID by its hex value
    pub fn from_hex(value: u8) -> Option<Pid> {
        Self::ALL.into_iter().find(|pid| pid.as_hex() == value)
    }

    /// Request command, e.g. `010D`
    pub fn request(&self) -> String {
        format!("{:02X}{:02X}", crate::mode::CURRENT_DATA, self.as_hex())
    }

    /// Data-type digits that must appear in a matching response, e.g. `0D`
    pub fn signature(&self) -> String {
        format!("{:02X}", self.as_hex())
    }

    /// Static decode rule for this PID
    pub fn definition(&self) -> &'static ParameterDefinition {
        match self {
            Pid::Speed => &SPEED,
            Pid::EngineRpm => &ENGINE_RPM,
            Pid::CoolantTemp => &COOLANT_TEMP,
            Pid::FuelLevel => &FUEL_LEVEL,
            Pid::IntakePressure => &INTAKE_PRESSURE,
            Pid::TurboPressure => &TURBO_PRESSURE,
            Pid::BoostPressure => &BOOST_PRESSURE,
            Pid::ClutchStatus => &CLUTCH_STATUS,
            Pid::FuelConsumption => &FUEL_CONSUMPTION,
            Pid::OilTemperature => &OIL_TEMPERATURE,
            Pid::HybridBattery => &HYBRID_BATTERY,
        }
    }

    /// Whether this PID is polled on every vehicle
    pub fn is_standard(&self) -> bool {
        Self::STANDARD.contains(self)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.request())
    }
}

impl FromStr for Pid {
    type Err = ObdError;

    /// Accepts `010D`, `0D` or `0x0D`, any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let digits = match digits.len() {
            4 if digits.starts_with("01") => &digits[2..],
            2 => digits,
            _ => return Err(ObdError::UnknownPid(s.to_string())),
        };
        u8::from_str_radix(digits, 16)
            .ok()
            .and_then(Pid::from_hex)
            .ok_or_else(|| ObdError::UnknownPid(s.to_string()))
    }
}

impl TryFrom<String> for Pid {
    type Error = ObdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pid> for String {
    fn from(pid: Pid) -> Self {
        pid.request()
    }
}

/// Physical unit of a decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "km/h")]
    KilometresPerHour,
    #[serde(rename = "rpm")]
    Rpm,
    #[serde(rename = "°C")]
    Celsius,
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "kPa")]
    Kilopascal,
    #[serde(rename = "L/100km")]
    LitresPer100Km,
    #[serde(rename = "")]
    Dimensionless,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::KilometresPerHour => "km/h",
            Unit::Rpm => "rpm",
            Unit::Celsius => "°C",
            Unit::Percent => "%",
            Unit::Kilopascal => "kPa",
            Unit::LitresPer100Km => "L/100km",
            Unit::Dimensionless => "",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Conversion from the raw payload integer to a physical value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formula {
    /// A
    Identity,
    /// (256·A + B) / 4
    QuarterWord,
    /// A − 40
    Offset40,
    /// A × 100 / 255
    Percent,
    /// A × 2
    Double,
    /// A / 10
    Tenth,
}

impl Formula {
    /// Raw payload integer to physical value
    pub fn apply(self, raw: u32) -> f64 {
        let raw = raw as f64;
        match self {
            Formula::Identity => raw,
            Formula::QuarterWord => raw / 4.0,
            Formula::Offset40 => raw - 40.0,
            Formula::Percent => raw * 100.0 / 255.0,
            Formula::Double => raw * 2.0,
            Formula::Tenth => raw / 10.0,
        }
    }

    /// Physical value back to the (unrounded) raw integer
    pub fn invert(self, value: f64) -> f64 {
        match self {
            Formula::Identity => value,
            Formula::QuarterWord => value * 4.0,
            Formula::Offset40 => value + 40.0,
            Formula::Percent => value * 255.0 / 100.0,
            Formula::Double => value / 2.0,
            Formula::Tenth => value * 10.0,
        }
    }
}

/// Decode rule and labels for one PID
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDefinition {
    pub pid: Pid,
    /// Snapshot key
    pub key: &'static str,
    /// Human label
    pub label: &'static str,
    /// Payload bytes consumed from the end of the response
    pub bytes: usize,
    pub formula: Formula,
    pub unit: Unit,
}

static SPEED: ParameterDefinition = ParameterDefinition {
    pid: Pid::Speed,
    key: "speed",
    label: "Speed",
    bytes: 1,
    formula: Formula::Identity,
    unit: Unit::KilometresPerHour,
};

static ENGINE_RPM: ParameterDefinition = ParameterDefinition {
    pid: Pid::EngineRpm,
    key: "rpm",
    label: "RPM",
    bytes: 2,
    formula: Formula::QuarterWord,
    unit: Unit::Rpm,
};

static COOLANT_TEMP: ParameterDefinition = ParameterDefinition {
    pid: Pid::CoolantTemp,
    key: "engine_temp",
    label: "Engine Temperature",
    bytes: 1,
    formula: Formula::Offset40,
    unit: Unit::Celsius,
};

static FUEL_LEVEL: ParameterDefinition = ParameterDefinition {
    pid: Pid::FuelLevel,
    key: "fuel_level",
    label: "Fuel Level",
    bytes: 1,
    formula: Formula::Percent,
    unit: Unit::Percent,
};

static INTAKE_PRESSURE: ParameterDefinition = ParameterDefinition {
    pid: Pid::IntakePressure,
    key: "intake_pressure",
    label: "Intake Pressure",
    bytes: 1,
    formula: Formula::Identity,
    unit: Unit::Kilopascal,
};

static TURBO_PRESSURE: ParameterDefinition = ParameterDefinition {
    pid: Pid::TurboPressure,
    key: "turbo_pressure",
    label: "Turbo Pressure",
    bytes: 1,
    formula: Formula::Double,
    unit: Unit::Kilopascal,
};

static BOOST_PRESSURE: ParameterDefinition = ParameterDefinition {
    pid: Pid::BoostPressure,
    key: "boost_pressure",
    label: "Boost Pressure",
    bytes: 1,
    formula: Formula::Double,
    unit: Unit::Kilopascal,
};

static CLUTCH_STATUS: ParameterDefinition = ParameterDefinition {
    pid: Pid::ClutchStatus,
    key: "clutch_status",
    label: "Clutch Status",
    bytes: 1,
    formula: Formula::Identity,
    unit: Unit::Dimensionless,
};

static FUEL_CONSUMPTION: ParameterDefinition = ParameterDefinition {
    pid: Pid::FuelConsumption,
    key: "fuel_consumption",
    label: "Fuel Consumption",
    bytes: 1,
    formula: Formula::Tenth,
    unit: Unit::LitresPer100Km,
};

static OIL_TEMPERATURE: ParameterDefinition = ParameterDefinition {
    pid: Pid::OilTemperature,
    key: "oil_temperature",
    label: "Oil Temperature",
    bytes: 1,
    formula: Formula::Offset40,
    unit: Unit::Celsius,
};

static HYBRID_BATTERY: ParameterDefinition = ParameterDefinition {
    pid: Pid::HybridBattery,
    key: "hybrid_battery",
    label: "Hybrid Battery",
    bytes: 1,
    formula: Formula::Percent,
    unit: Unit::Percent,
};

impl ParameterDefinition {
    /// Largest raw integer the payload can hold
    pub fn max_raw(&self) -> u32 {
        (1u32 << (8 * self.bytes as u32)) - 1
    }

    /// Decode a normalized adapter response for this PID.
    ///
    /// The payload is right-aligned: the last `2 * bytes` hex digits are the
    /// data. Anything that does not look like an answer to this PID is `None`.
    pub fn decode(&self, response: &str) -> Option<f64> {
        if is_negative(response) {
            return None;
        }

        let compact: String = response.chars().filter(|c| !c.is_whitespace()).collect();
        if !compact
            .to_ascii_uppercase()
            .contains(&self.pid.signature())
        {
            return None;
        }

        let width = self.bytes * 2;
        if compact.len() < width + 2 {
            return None;
        }

        let payload = compact.get(compact.len() - width..)?;
        if !payload.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        let raw = u32::from_str_radix(payload, 16).ok()?;
        Some(self.formula.apply(raw))
    }

    /// Raw payload integer that decodes to `value`, if representable
    pub fn encode(&self, value: f64) -> Option<u32> {
        let raw = self.formula.invert(value).round();
        if !raw.is_finite() || raw < 0.0 || raw > self.max_raw() as f64 {
            return None;
        }
        Some(raw as u32)
    }

    /// Adapter-style response carrying `value`, e.g. `41 0D 3C`
    pub fn response_for(&self, value: f64) -> Option<String> {
        let raw = self.encode(value)?;
        let mut response = format!("41 {}", self.pid.signature());
        for i in (0..self.bytes).rev() {
            response.push_str(&format!(" {:02X}", (raw >> (8 * i)) & 0xFF));
        }
        Some(response)
    }
}

/// Decode `response` as an answer to `pid`
pub fn decode_metric(response: &str, pid: Pid) -> Option<f64> {
    pid.definition().decode(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_speed_decode() {
        assert_eq!(decode_metric("41 0D 00", Pid::Speed), Some(0.0));
        assert_eq!(decode_metric("41 0D 3C", Pid::Speed), Some(60.0));
    }

    #[test]
    fn test_rpm_decode() {
        // (256 * 0x1A + 0xF8) / 4 = (6656 + 248) / 4
        assert_eq!(decode_metric("41 0C 1A F8", Pid::EngineRpm), Some(1718.0));
    }

    #[test]
    fn test_coolant_temp_decode() {
        assert_eq!(decode_metric("41 05 7B", Pid::CoolantTemp), Some(83.0));
        assert_eq!(decode_metric("41 05 00", Pid::CoolantTemp), Some(-40.0));
    }

    #[test]
    fn test_vendor_formulas() {
        assert_eq!(decode_metric("41 5F 64", Pid::TurboPressure), Some(200.0));
        assert_eq!(decode_metric("41 A6 10", Pid::BoostPressure), Some(32.0));
        assert_eq!(decode_metric("41 60 01", Pid::ClutchStatus), Some(1.0));
        assert_eq!(decode_metric("41 5E 4B", Pid::FuelConsumption), Some(7.5));
        assert_eq!(decode_metric("41 5C 82", Pid::OilTemperature), Some(90.0));
        assert_eq!(decode_metric("41 A2 FF", Pid::HybridBattery), Some(100.0));
        let fuel = decode_metric("41 2F 80", Pid::FuelLevel).unwrap();
        assert!((fuel - 50.196).abs() < 0.001);
    }

    #[test]
    fn test_negative_responses_are_unavailable() {
        for pid in Pid::ALL {
            assert_eq!(decode_metric("", pid), None);
            assert_eq!(decode_metric("NO DATA", pid), None);
            assert_eq!(decode_metric("CAN ERROR", pid), None);
            assert_eq!(decode_metric(&format!("41 {} NO DATA", pid.signature()), pid), None);
        }
    }

    #[test]
    fn test_missing_signature_is_unavailable() {
        assert_eq!(decode_metric("41 0C 3C", Pid::Speed), None);
    }

    #[test]
    fn test_signature_match_is_case_insensitive() {
        assert_eq!(decode_metric("41 0d 3c", Pid::Speed), Some(60.0));
    }

    #[test]
    fn test_signature_heuristic_accepts_coincidental_overlap() {
        // An RPM reply whose payload happens to contain 0D passes the speed
        // check and decodes its last byte as speed.
        assert_eq!(decode_metric("41 0C 0D 10", Pid::Speed), Some(16.0));
    }

    #[test]
    fn test_malformed_payload_is_unavailable() {
        assert_eq!(decode_metric("41 0D 3G", Pid::Speed), None);
        assert_eq!(decode_metric("0D", Pid::Speed), None);
        assert_eq!(decode_metric("0C1", Pid::EngineRpm), None);
        assert_eq!(decode_metric("41 0D +F", Pid::Speed), None);
    }

    #[test]
    fn test_short_payload_reads_trailing_digits() {
        // One data byte short: the PID byte is consumed as the high byte
        assert_eq!(decode_metric("41 0C 1A", Pid::EngineRpm), Some(774.5));
    }

    #[test]
    fn test_pid_parsing() {
        assert_eq!("010D".parse::<Pid>().unwrap(), Pid::Speed);
        assert_eq!("0d".parse::<Pid>().unwrap(), Pid::Speed);
        assert_eq!("0xA6".parse::<Pid>().unwrap(), Pid::BoostPressure);
        assert!("0199".parse::<Pid>().is_err());
        assert!("020D".parse::<Pid>().is_err());
        assert_eq!(Pid::HybridBattery.request(), "01A2");
    }

    #[test]
    fn test_pid_serde_as_request_string() {
        let json = serde_json::to_string(&Pid::FuelLevel).unwrap();
        assert_eq!(json, "\"012F\"");
        let pid: Pid = serde_json::from_str("\"015F\"").unwrap();
        assert_eq!(pid, Pid::TurboPressure);
    }

    #[test]
    fn test_response_for_matches_decoder() {
        let rpm = Pid::EngineRpm.definition();
        assert_eq!(rpm.response_for(1718.0).unwrap(), "41 0C 1A F8");
        assert_eq!(Pid::Speed.definition().response_for(300.0), None);
        assert_eq!(Pid::CoolantTemp.definition().response_for(-41.0), None);
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<_> = Pid::ALL.iter().map(|p| p.definition().key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), Pid::ALL.len());
    }

    proptest! {
        #[test]
        fn single_byte_formulas_round_trip(raw in 0u32..=255) {
            for pid in Pid::ALL.into_iter().filter(|p| p.definition().bytes == 1) {
                let definition = pid.definition();
                let response = format!("41 {} {:02X}", pid.signature(), raw);
                let value = definition.decode(&response).unwrap();
                prop_assert_eq!(definition.encode(value), Some(raw));
            }
        }

        #[test]
        fn rpm_round_trips(raw in 0u32..=0xFFFF) {
            let definition = Pid::EngineRpm.definition();
            let response = format!("41 0C {:02X} {:02X}", raw >> 8, raw & 0xFF);
            let value = definition.decode(&response).unwrap();
            prop_assert_eq!(definition.encode(value), Some(raw));
        }

        #[test]
        fn garbage_never_panics(response in ".{0,24}") {
            for pid in Pid::ALL {
                let _ = decode_metric(&response, pid);
            }
        }
    }
}
