//! Snapshot Log Implementation

use crate::export::write_csv;
use crate::SnapshotLogError;
use chrono::{DateTime, Utc};
use obd_protocol::Snapshot;
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Snapshots kept by [`SnapshotLog::new`] (about 80 minutes at 2 Hz)
pub const DEFAULT_RETENTION: usize = 10_000;

/// Append-only log of poll snapshots, oldest evicted first
pub struct SnapshotLog {
    snapshots: Mutex<VecDeque<Snapshot>>,
    max_snapshots: usize,
}

impl SnapshotLog {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Log keeping at most `max_snapshots` entries (minimum one)
    pub fn with_retention(max_snapshots: usize) -> Self {
        let max_snapshots = max_snapshots.max(1);
        info!("Creating snapshot log (retention {})", max_snapshots);
        Self {
            snapshots: Mutex::new(VecDeque::with_capacity(max_snapshots.min(1024))),
            max_snapshots,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<Snapshot>>, SnapshotLogError> {
        self.snapshots
            .lock()
            .map_err(|e| SnapshotLogError::Lock(e.to_string()))
    }

    pub fn insert(&self, snapshot: Snapshot) -> Result<(), SnapshotLogError> {
        let mut log = self.lock()?;

        // Enforce retention
        while log.len() >= self.max_snapshots {
            log.pop_front();
        }

        log.push_back(snapshot);
        Ok(())
    }

    /// Most recent snapshots, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<Snapshot>, SnapshotLogError> {
        let log = self.lock()?;
        Ok(log.iter().rev().take(limit).cloned().collect())
    }

    /// Snapshots taken at or after `since`, oldest first
    pub fn since(&self, since: DateTime<Utc>) -> Result<Vec<Snapshot>, SnapshotLogError> {
        let log = self.lock()?;
        Ok(log
            .iter()
            .filter(|s| s.timestamp() >= since)
            .cloned()
            .collect())
    }

    /// Snapshot taken exactly at `timestamp`
    pub fn at(&self, timestamp: DateTime<Utc>) -> Result<Snapshot, SnapshotLogError> {
        let log = self.lock()?;
        log.iter()
            .find(|s| s.timestamp() == timestamp)
            .cloned()
            .ok_or_else(|| SnapshotLogError::NotFound(timestamp.to_rfc3339()))
    }

    /// Value of `metric` in the snapshot at `timestamp`.
    ///
    /// `Ok(None)` means the metric was polled but unavailable in that cycle.
    pub fn value_at(
        &self,
        timestamp: DateTime<Utc>,
        metric: &str,
    ) -> Result<Option<f64>, SnapshotLogError> {
        let snapshot = self.at(timestamp)?;
        snapshot
            .reading(metric)
            .map(|r| r.value)
            .ok_or_else(|| SnapshotLogError::UnknownMetric(metric.to_string()))
    }

    /// The last `window` available values of `metric`, oldest first
    pub fn series(
        &self,
        metric: &str,
        window: usize,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, SnapshotLogError> {
        let log = self.lock()?;
        let mut points: Vec<_> = log
            .iter()
            .rev()
            .filter_map(|s| s.value(metric).map(|v| (s.timestamp(), v)))
            .take(window)
            .collect();
        points.reverse();
        Ok(points)
    }

    /// Every metric name seen, in first-seen order
    pub fn metric_names(&self) -> Result<Vec<String>, SnapshotLogError> {
        let log = self.lock()?;
        let mut names: Vec<String> = Vec::new();
        for name in log.iter().flat_map(|s| s.names()) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Write the whole log as CSV to `path`, returning the row count
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<usize, SnapshotLogError> {
        let path = path.as_ref();
        let snapshots: Vec<Snapshot> = self.lock()?.iter().cloned().collect();

        let mut writer = BufWriter::new(File::create(path)?);
        let rows = write_csv(&mut writer, &snapshots)?;
        info!("Exported {} snapshots to {}", rows, path.display());
        Ok(rows)
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut log) = self.snapshots.lock() {
            debug!("Clearing {} snapshots", log.len());
            log.clear();
        }
    }
}

impl Default for SnapshotLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use obd_protocol::{MetricReading, Pid};

    fn at(second: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(second)
    }

    fn snapshot(second: i64, speed: Option<f64>) -> Snapshot {
        let reading = |pid: Pid, value| MetricReading {
            name: pid.definition().key.to_string(),
            pid,
            value,
            unit: pid.definition().unit,
        };
        Snapshot::new(
            at(second),
            vec![reading(Pid::Speed, speed), reading(Pid::EngineRpm, Some(900.0))],
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let log = SnapshotLog::new();
        log.insert(snapshot(0, Some(10.0))).unwrap();
        log.insert(snapshot(1, None)).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.value_at(at(0), "speed").unwrap(), Some(10.0));
        assert_eq!(log.value_at(at(1), "speed").unwrap(), None);
        assert!(matches!(
            log.value_at(at(0), "boost_pressure"),
            Err(SnapshotLogError::UnknownMetric(_))
        ));
        assert!(matches!(log.at(at(5)), Err(SnapshotLogError::NotFound(_))));
    }

    #[test]
    fn test_recent_and_since() {
        let log = SnapshotLog::new();
        for second in 0..5 {
            log.insert(snapshot(second, Some(second as f64))).unwrap();
        }

        let recent = log.recent(2).unwrap();
        assert_eq!(recent[0].timestamp(), at(4));
        assert_eq!(recent[1].timestamp(), at(3));
        assert_eq!(log.since(at(3)).unwrap().len(), 2);
    }

    #[test]
    fn test_retention_limit() {
        let log = SnapshotLog::with_retention(3);
        for second in 0..10 {
            log.insert(snapshot(second, Some(1.0))).unwrap();
        }

        assert_eq!(log.len(), 3);
        assert!(log.at(at(6)).is_err());
        assert!(log.at(at(7)).is_ok());
    }

    #[test]
    fn test_series_skips_unavailable_values() {
        let log = SnapshotLog::new();
        log.insert(snapshot(0, Some(10.0))).unwrap();
        log.insert(snapshot(1, None)).unwrap();
        log.insert(snapshot(2, Some(30.0))).unwrap();
        log.insert(snapshot(3, Some(40.0))).unwrap();

        let series = log.series("speed", 2).unwrap();
        assert_eq!(series, vec![(at(2), 30.0), (at(3), 40.0)]);
        assert_eq!(log.series("speed", 10).unwrap().len(), 3);
        assert!(log.series("oil_temperature", 10).unwrap().is_empty());
    }

    #[test]
    fn test_export_to_file() {
        let log = SnapshotLog::new();
        log.insert(snapshot(0, Some(10.0))).unwrap();
        log.insert(snapshot(1, None)).unwrap();

        let path = std::env::temp_dir().join(format!("snapshot-log-{}.csv", std::process::id()));
        assert_eq!(log.export_csv(&path).unwrap(), 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines[0], "timestamp,speed,rpm");
        assert_eq!(lines[2], "2024-05-01T12:00:01.000Z,,900");
    }

    #[test]
    fn test_clear() {
        let log = SnapshotLog::new();
        log.insert(snapshot(0, None)).unwrap();
        log.clear();
        assert!(log.is_empty());
        assert!(log.metric_names().unwrap().is_empty());
    }
}
