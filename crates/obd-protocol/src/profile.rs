//! Vehicle profiles and the per-cycle poll plan

use crate::pid::Pid;
use crate::protocol::ObdProtocol;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A vendor parameter polled for one vehicle family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileParameter {
    /// Display name, e.g. "Turbo Pressure"
    pub name: String,
    pub pid: Pid,
}

impl ProfileParameter {
    pub fn new(name: impl Into<String>, pid: Pid) -> Self {
        Self {
            name: name.into(),
            pid,
        }
    }

    /// Snapshot key: lower-case name with spaces as underscores
    pub fn key(&self) -> String {
        self.name.trim().to_lowercase().replace(' ', "_")
    }
}

/// Protocol selection and vendor PIDs for one vehicle family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleProfile {
    pub name: String,
    /// Tried first during session setup
    pub protocol: ObdProtocol,
    /// Tried once if the adapter rejects `protocol`
    pub fallback: ObdProtocol,
    /// Polled after the standard PIDs, in this order
    #[serde(default)]
    pub parameters: Vec<ProfileParameter>,
}

impl VehicleProfile {
    /// Profiles shipped with the client
    pub fn builtin() -> Vec<VehicleProfile> {
        vec![
            VehicleProfile {
                name: "Fiat 500 Series 1".to_string(),
                protocol: ObdProtocol::Iso14230_4Kwp,
                fallback: ObdProtocol::Iso9141_2,
                parameters: vec![
                    ProfileParameter::new("Turbo Pressure", Pid::TurboPressure),
                    ProfileParameter::new("Clutch Status", Pid::ClutchStatus),
                ],
            },
            VehicleProfile {
                name: "Toyota C-HR/Corolla".to_string(),
                protocol: ObdProtocol::Iso15765_4Can11bit500,
                fallback: ObdProtocol::Auto,
                parameters: vec![
                    ProfileParameter::new("Fuel Consumption", Pid::FuelConsumption),
                    ProfileParameter::new("Hybrid Battery", Pid::HybridBattery),
                ],
            },
            VehicleProfile {
                name: "Volkswagen Group".to_string(),
                protocol: ObdProtocol::Iso15765_4Can11bit500,
                fallback: ObdProtocol::Iso14230_4KwpFast,
                parameters: vec![
                    ProfileParameter::new("Boost Pressure", Pid::BoostPressure),
                    ProfileParameter::new("Oil Temperature", Pid::OilTemperature),
                ],
            },
        ]
    }

    /// Find a profile by name (case-insensitive) among `profiles`
    pub fn find<'a>(profiles: &'a [VehicleProfile], name: &str) -> Option<&'a VehicleProfile> {
        profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn protocol_command(&self) -> &'static str {
        self.protocol.to_elm_command()
    }

    pub fn fallback_command(&self) -> &'static str {
        self.fallback.to_elm_command()
    }
}

/// One metric requested every poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMetric {
    /// Snapshot key
    pub key: String,
    pub label: String,
    pub pid: Pid,
}

/// Standard PIDs in fixed order, then the profile's parameters.
///
/// Profile entries only extend the plan: one whose key or PID is already
/// planned is skipped.
pub fn poll_plan(profile: Option<&VehicleProfile>) -> Vec<PlannedMetric> {
    let mut plan: Vec<PlannedMetric> = Pid::STANDARD
        .iter()
        .map(|pid| {
            let definition = pid.definition();
            PlannedMetric {
                key: definition.key.to_string(),
                label: definition.label.to_string(),
                pid: *pid,
            }
        })
        .collect();

    for parameter in profile.map(|p| p.parameters.as_slice()).unwrap_or_default() {
        let key = parameter.key();
        if plan.iter().any(|m| m.key == key || m.pid == parameter.pid) {
            warn!(
                "Profile parameter {:?} ({}) duplicates a planned metric, skipping",
                parameter.name, parameter.pid
            );
            continue;
        }
        plan.push(PlannedMetric {
            key,
            label: parameter.name.clone(),
            pid: parameter.pid,
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles() {
        let profiles = VehicleProfile::builtin();
        assert_eq!(profiles.len(), 3);

        let fiat = VehicleProfile::find(&profiles, "fiat 500 series 1").unwrap();
        assert_eq!(fiat.protocol_command(), "ATSP4");
        assert_eq!(fiat.fallback_command(), "ATSP3");

        let vag = VehicleProfile::find(&profiles, "Volkswagen Group").unwrap();
        assert_eq!(vag.protocol_command(), "ATSP6");
        assert_eq!(vag.fallback_command(), "ATSP5");

        assert!(VehicleProfile::find(&profiles, "Saab 900").is_none());
    }

    #[test]
    fn test_standard_plan_order() {
        let keys: Vec<_> = poll_plan(None).into_iter().map(|m| m.key).collect();
        assert_eq!(keys, ["speed", "rpm", "engine_temp", "fuel_level", "intake_pressure"]);
    }

    #[test]
    fn test_profile_extends_plan_in_declared_order() {
        let profiles = VehicleProfile::builtin();
        let toyota = VehicleProfile::find(&profiles, "Toyota C-HR/Corolla").unwrap();
        let plan = poll_plan(Some(toyota));
        assert_eq!(plan.len(), 7);
        assert_eq!(plan[5].key, "fuel_consumption");
        assert_eq!(plan[5].pid, Pid::FuelConsumption);
        assert_eq!(plan[6].key, "hybrid_battery");
    }

    #[test]
    fn test_profile_never_overwrites_standard_entries() {
        let profile = VehicleProfile {
            name: "Custom".to_string(),
            protocol: ObdProtocol::Auto,
            fallback: ObdProtocol::Auto,
            parameters: vec![
                ProfileParameter::new("Speed", Pid::TurboPressure),
                ProfileParameter::new("Other Rpm", Pid::EngineRpm),
                ProfileParameter::new("Oil Temperature", Pid::OilTemperature),
            ],
        };
        let plan = poll_plan(Some(&profile));
        assert_eq!(plan.len(), 6);
        assert_eq!(plan[0].pid, Pid::Speed);
        assert_eq!(plan[5].key, "oil_temperature");
    }
}
