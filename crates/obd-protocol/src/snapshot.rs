//! Per-cycle metric snapshots

use crate::pid::{Pid, Unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded metric; `value` is `None` when unavailable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub name: String,
    pub pid: Pid,
    pub value: Option<f64>,
    pub unit: Unit,
}

/// All metrics captured in one poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    timestamp: DateTime<Utc>,
    readings: Vec<MetricReading>,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>, readings: Vec<MetricReading>) -> Self {
        Self {
            timestamp,
            readings,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Readings in poll order
    pub fn readings(&self) -> &[MetricReading] {
        &self.readings
    }

    pub fn reading(&self, name: &str) -> Option<&MetricReading> {
        self.readings.iter().find(|r| r.name == name)
    }

    /// Decoded value for `name`; `None` if unavailable or not polled
    pub fn value(&self, name: &str) -> Option<f64> {
        self.reading(name).and_then(|r| r.value)
    }

    /// Metric names in poll order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.readings.iter().map(|r| r.name.as_str())
    }

    /// Number of metrics that decoded successfully
    pub fn available_count(&self) -> usize {
        self.readings.iter().filter(|r| r.value.is_some()).count()
    }
}
