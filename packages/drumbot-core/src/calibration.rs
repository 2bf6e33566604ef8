//! # Calibration Table
//!
//! Empirical lookup between travel distance and move duration for one fixed
//! `(velocity, acceleration)` setting.
//!
//! ## Purpose
//! The actuator's real move time is not linear in distance (acceleration ramps
//! dominate short moves), so the scheduler asks this table how long a move will
//! take before deciding when to send it.
//!
//! ## Lookup Rules
//! - Samples are filtered to the single speed setting in use
//! - Each direction sorts by its own key (distance for
//!   [`CalibrationTable::duration_from_distance`], duration for
//!   [`CalibrationTable::distance_from_duration`]) and interpolates linearly
//!   between the two bracketing samples
//! - Queries outside the sampled range clamp to the nearest extreme sample;
//!   there is no extrapolation
//! - An empty table answers every query with a fixed fallback so the session
//!   runs with reduced accuracy instead of failing
//!
//! ## Input Formats
//! Rows `(distance, target_velocity, target_acceleration, actual_duration)` from
//! CSV, JSON or YAML. The column names written by the tuning sweep
//! (`distance_mm`, `avg_duration_s`) are accepted as aliases.
//!
//! ## Example
//! ```rust
//! use drumbot_core::calibration::{CalibrationSample, CalibrationTable};
//!
//! let samples = vec![
//!     CalibrationSample::new(10.0, 1000.0, 1000.0, 0.10),
//!     CalibrationSample::new(30.0, 1000.0, 1000.0, 0.20),
//!     CalibrationSample::new(30.0, 500.0, 500.0, 0.90), // other speed, ignored
//! ];
//! let table = CalibrationTable::from_samples(&samples, 1000.0, 1000.0);
//!
//! assert_eq!(table.len(), 2);
//! assert!((table.duration_from_distance(20.0) - 0.15).abs() < 1e-9);
//! assert_eq!(table.duration_from_distance(500.0), 0.20); // clamped
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::DrumbotError;

/// Returned by `duration_from_distance` when the table is empty.
pub const FALLBACK_DURATION_S: f64 = 0.2;
/// Returned by `distance_from_duration` when the table is empty.
pub const FALLBACK_DISTANCE_MM: f64 = 30.0;

const SPEED_MATCH_TOLERANCE: f64 = 1e-6;

/// One measured move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    #[serde(alias = "distance_mm")]
    pub distance: f64,
    #[serde(alias = "target_velocity")]
    pub velocity: f64,
    #[serde(alias = "target_acceleration")]
    pub acceleration: f64,
    #[serde(alias = "actual_duration_s", alias = "avg_duration_s")]
    pub actual_duration: f64,
}

impl CalibrationSample {
    pub fn new(distance: f64, velocity: f64, acceleration: f64, actual_duration: f64) -> Self {
        Self {
            distance,
            velocity,
            acceleration,
            actual_duration,
        }
    }
}

/// Read calibration rows from a file. The format follows the extension:
/// `.json`, `.yaml`/`.yml`, anything else is read as CSV with a header row.
pub fn load_samples(path: &Path) -> Result<Vec<CalibrationSample>, DrumbotError> {
    let calibration_error = |message: String| DrumbotError::Calibration {
        path: path.display().to_string(),
        message,
    };
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => {
            let text = fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|e| calibration_error(e.to_string()))
        }
        Some("yaml") | Some("yml") => {
            let text = fs::read_to_string(path)?;
            serde_yaml::from_str(&text).map_err(|e| calibration_error(e.to_string()))
        }
        _ => {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_path(path)
                .map_err(|e| calibration_error(e.to_string()))?;
            reader
                .deserialize()
                .collect::<Result<Vec<CalibrationSample>, _>>()
                .map_err(|e| calibration_error(e.to_string()))
        }
    }
}

/// Distance <-> duration lookup for one speed setting.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    velocity: f64,
    acceleration: f64,
    /// `(distance, duration)` sorted by distance.
    by_distance: Vec<(f64, f64)>,
    /// `(duration, distance)` sorted by duration.
    by_duration: Vec<(f64, f64)>,
    fallback_duration_s: f64,
    fallback_distance_mm: f64,
}

impl CalibrationTable {
    /// Build a table from every sample taken at `(velocity, acceleration)`.
    pub fn from_samples(samples: &[CalibrationSample], velocity: f64, acceleration: f64) -> Self {
        let matching: Vec<&CalibrationSample> = samples
            .iter()
            .filter(|s| {
                (s.velocity - velocity).abs() <= SPEED_MATCH_TOLERANCE
                    && (s.acceleration - acceleration).abs() <= SPEED_MATCH_TOLERANCE
                    && s.distance.is_finite()
                    && s.actual_duration.is_finite()
            })
            .collect();

        let mut by_distance: Vec<(f64, f64)> =
            matching.iter().map(|s| (s.distance, s.actual_duration)).collect();
        by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let mut by_duration: Vec<(f64, f64)> =
            matching.iter().map(|s| (s.actual_duration, s.distance)).collect();
        by_duration.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        Self {
            velocity,
            acceleration,
            by_distance,
            by_duration,
            fallback_duration_s: FALLBACK_DURATION_S,
            fallback_distance_mm: FALLBACK_DISTANCE_MM,
        }
    }

    /// A table with no samples; every lookup returns the fallback.
    pub fn empty(velocity: f64, acceleration: f64) -> Self {
        Self::from_samples(&[], velocity, acceleration)
    }

    pub fn with_fallbacks(mut self, duration_s: f64, distance_mm: f64) -> Self {
        self.fallback_duration_s = duration_s;
        self.fallback_distance_mm = distance_mm;
        self
    }

    /// Load a table from disk. A missing file degrades to an empty table.
    pub fn load(path: &Path, velocity: f64, acceleration: f64) -> Result<Self, DrumbotError> {
        if !path.exists() {
            warn!(
                path = %path.display(),
                "calibration table not found; move durations fall back to a fixed estimate"
            );
            return Ok(Self::empty(velocity, acceleration));
        }
        let samples = load_samples(path)?;
        let table = Self::from_samples(&samples, velocity, acceleration);
        info!(
            path = %path.display(),
            total = samples.len(),
            matched = table.len(),
            velocity,
            acceleration,
            "loaded calibration table"
        );
        if table.is_empty() {
            warn!(velocity, acceleration, "no calibration samples for this speed setting");
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.by_distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_distance.is_empty()
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Expected move duration in seconds for a travel distance in millimetres.
    pub fn duration_from_distance(&self, distance_mm: f64) -> f64 {
        interpolate(&self.by_distance, distance_mm).unwrap_or(self.fallback_duration_s)
    }

    /// Travel distance in millimetres that takes `seconds` to complete.
    pub fn distance_from_duration(&self, seconds: f64) -> f64 {
        interpolate(&self.by_duration, seconds).unwrap_or(self.fallback_distance_mm)
    }
}

/// Linear interpolation over `(key, value)` pairs sorted by key, clamped at both ends.
fn interpolate(points: &[(f64, f64)], key: f64) -> Option<f64> {
    let (first, last) = (points.first()?, points.last()?);
    if key <= first.0 {
        return Some(first.1);
    }
    if key >= last.0 {
        return Some(last.1);
    }

    let upper = points.partition_point(|p| p.0 < key);
    let (k2, v2) = points[upper];
    let (k1, v1) = points[upper - 1];
    if k2 == k1 {
        return Some(v1);
    }
    let ratio = (key - k1) / (k2 - k1);
    Some(v1 + ratio * (v2 - v1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sweep() -> Vec<CalibrationSample> {
        vec![
            CalibrationSample::new(5.0, 1000.0, 1000.0, 0.08),
            CalibrationSample::new(15.0, 1000.0, 1000.0, 0.12),
            CalibrationSample::new(25.0, 1000.0, 1000.0, 0.15),
            CalibrationSample::new(45.0, 1000.0, 1000.0, 0.21),
            CalibrationSample::new(25.0, 200.0, 200.0, 0.60),
        ]
    }

    #[test]
    fn test_filters_to_speed_setting() {
        let table = CalibrationTable::from_samples(&sweep(), 1000.0, 1000.0);
        assert_eq!(table.len(), 4);
        let slow = CalibrationTable::from_samples(&sweep(), 200.0, 200.0);
        assert_eq!(slow.len(), 1);
        assert_eq!(slow.duration_from_distance(3.0), 0.60);
    }

    #[test]
    fn test_interpolates_between_brackets() {
        let table = CalibrationTable::from_samples(&sweep(), 1000.0, 1000.0);
        assert!((table.duration_from_distance(10.0) - 0.10).abs() < 1e-12);
        assert!((table.duration_from_distance(35.0) - 0.18).abs() < 1e-12);
        assert!((table.distance_from_duration(0.135) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_sample_hits() {
        let table = CalibrationTable::from_samples(&sweep(), 1000.0, 1000.0);
        assert_eq!(table.duration_from_distance(15.0), 0.12);
        assert_eq!(table.distance_from_duration(0.21), 45.0);
    }

    #[test]
    fn test_clamps_outside_range() {
        let table = CalibrationTable::from_samples(&sweep(), 1000.0, 1000.0);
        assert_eq!(table.duration_from_distance(0.0), 0.08);
        assert_eq!(table.duration_from_distance(1000.0), 0.21);
        assert_eq!(table.distance_from_duration(0.01), 5.0);
        assert_eq!(table.distance_from_duration(5.0), 45.0);
    }

    #[test]
    fn test_round_trip_within_range() {
        let table = CalibrationTable::from_samples(&sweep(), 1000.0, 1000.0);
        for sample in sweep().iter().filter(|s| s.velocity == 1000.0) {
            let back = table.duration_from_distance(table.distance_from_duration(sample.actual_duration));
            assert!((back - sample.actual_duration).abs() < 1e-9, "sample {:?}", sample);
        }
        for t in [0.09, 0.13, 0.2] {
            let back = table.duration_from_distance(table.distance_from_duration(t));
            assert!((back - t).abs() < 1e-9);
        }
    }

    #[test]
    fn test_each_direction_sorts_by_its_own_key() {
        // A noisy sweep where the longer distance was measured faster.
        let samples = vec![
            CalibrationSample::new(10.0, 1000.0, 1000.0, 0.20),
            CalibrationSample::new(20.0, 1000.0, 1000.0, 0.18),
            CalibrationSample::new(30.0, 1000.0, 1000.0, 0.30),
        ];
        let table = CalibrationTable::from_samples(&samples, 1000.0, 1000.0);
        assert!((table.duration_from_distance(15.0) - 0.19).abs() < 1e-12);
        assert_eq!(table.distance_from_duration(0.18), 20.0);
    }

    #[test]
    fn test_empty_table_uses_fallbacks() {
        let table = CalibrationTable::empty(1000.0, 1000.0);
        assert!(table.is_empty());
        assert_eq!(table.duration_from_distance(12.0), FALLBACK_DURATION_S);
        assert_eq!(table.distance_from_duration(0.3), FALLBACK_DISTANCE_MM);

        let custom = CalibrationTable::empty(1000.0, 1000.0).with_fallbacks(0.0, 0.0);
        assert_eq!(custom.duration_from_distance(12.0), 0.0);
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let a = CalibrationTable::from_samples(&sweep(), 1000.0, 1000.0);
        let mut reversed = sweep();
        reversed.reverse();
        let b = CalibrationTable::from_samples(&reversed, 1000.0, 1000.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_csv_with_sweep_headers() {
        let dir = std::env::temp_dir().join(format!("drumbot-cal-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tuning_data.csv");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "distance_mm,target_velocity,target_acceleration,avg_duration_s").unwrap();
        writeln!(file, "10.0,1000,1000,0.10").unwrap();
        writeln!(file, "30.0,1000,1000,0.20").unwrap();
        writeln!(file, "30.0,100,100,0.90").unwrap();
        drop(file);

        let table = CalibrationTable::load(&path, 1000.0, 1000.0).unwrap();
        assert_eq!(table.len(), 2);
        assert!((table.duration_from_distance(20.0) - 0.15).abs() < 1e-12);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file_degrades() {
        let table = CalibrationTable::load(Path::new("/nonexistent/tuning.csv"), 1000.0, 1000.0).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_load_malformed_json_is_error() {
        let dir = std::env::temp_dir().join(format!("drumbot-cal-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tuning.json");
        fs::write(&path, "{not json").unwrap();
        let err = CalibrationTable::load(&path, 1000.0, 1000.0).unwrap_err();
        assert!(matches!(err, DrumbotError::Calibration { .. }));
        fs::remove_dir_all(&dir).ok();
    }
}
