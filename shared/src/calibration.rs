//! Per-vehicle turn-rate calibration.
//!
//! Every vessel turns at a different rate on each axis, and the rate also
//! depends on the speed regime. Small corrections are further from linear
//! than large ones (the control input ramps up before reaching full rate), so
//! each axis keeps a small-angle table alongside its flat rate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Strictly positive lower bound on any turn rate, in degrees per second
pub const RATE_FLOOR_DEG_PER_SEC: f64 = 1.0;

/// Rotational control axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    Pitch,
    Yaw,
    Roll,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Pitch, Axis::Yaw, Axis::Roll];

    /// Default flat rate for a vessel with no calibration on file
    pub fn default_rate(&self) -> f64 {
        match self {
            Axis::Pitch => 33.0,
            Axis::Yaw => 8.0,
            Axis::Roll => 80.0,
        }
    }

    /// Upper bound on any learned rate
    pub fn default_max_rate(&self) -> f64 {
        self.default_rate() * 3.0
    }

    /// Angle below which the small-angle table is used instead of the flat rate
    pub fn table_threshold_deg(&self) -> f64 {
        match self {
            Axis::Roll => 45.0,
            Axis::Pitch | Axis::Yaw => 30.0,
        }
    }

    /// Smallest movement a one second calibration pulse must produce to be trusted
    pub fn min_credible_movement_deg(&self) -> f64 {
        match self {
            Axis::Pitch => 2.0,
            Axis::Yaw => 1.0,
            Axis::Roll => 5.0,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Pitch => write!(f, "pitch"),
            Axis::Yaw => write!(f, "yaw"),
            Axis::Roll => write!(f, "roll"),
        }
    }
}

/// Vessel model identifier, e.g. "python_mk_ii"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Speed regime the rates were measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpeedRegime {
    /// Normal space flight at half throttle
    Normal,
    /// Supercruise at half throttle
    Supercruise,
}

impl SpeedRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedRegime::Normal => "normal",
            SpeedRegime::Supercruise => "supercruise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(SpeedRegime::Normal),
            "supercruise" => Some(SpeedRegime::Supercruise),
            _ => None,
        }
    }
}

impl fmt::Display for SpeedRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one axis calibration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalibrationKey {
    pub vehicle: VehicleId,
    pub axis: Axis,
    pub regime: SpeedRegime,
}

/// Small-angle rate lookup: ordered `(threshold_deg, rate_deg_per_sec)` pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    entries: Vec<(f64, f64)>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary pairs; non-finite and non-positive entries are dropped
    pub fn from_entries(entries: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut table = Self::new();
        for (threshold, rate) in entries {
            table.insert(threshold, rate);
        }
        table
    }

    /// Insert or replace the entry at `threshold_deg`, keeping the table sorted
    pub fn insert(&mut self, threshold_deg: f64, rate: f64) {
        if !(threshold_deg.is_finite() && rate.is_finite() && threshold_deg > 0.0 && rate > 0.0) {
            return;
        }
        match self
            .entries
            .binary_search_by(|(t, _)| t.total_cmp(&threshold_deg))
        {
            Ok(index) => self.entries[index].1 = rate,
            Err(index) => self.entries.insert(index, (threshold_deg, rate)),
        }
    }

    pub fn entries(&self) -> &[(f64, f64)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interpolated rate for a correction of `distance_deg`.
    ///
    /// Interpolates linearly from the origin to the first entry and between
    /// successive entries. Returns `None` past the last entry or for an empty
    /// table.
    pub fn interpolate(&self, distance_deg: f64) -> Option<f64> {
        let distance = distance_deg.abs();
        let (mut last_deg, mut last_rate) = (0.0, 0.0);
        for &(threshold, rate) in &self.entries {
            if distance <= threshold {
                let span = threshold - last_deg;
                if span <= f64::EPSILON {
                    return Some(rate);
                }
                return Some(last_rate + (distance - last_deg) * (rate - last_rate) / span);
            }
            last_deg = threshold;
            last_rate = rate;
        }
        None
    }
}

/// Turn-rate knowledge for one (vehicle, axis, regime)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    /// Best known flat turn rate
    pub rate_deg_per_sec: f64,
    /// Hard ceiling on learned rates
    pub max_rate_deg_per_sec: f64,
    /// Small-angle lookup, used below `table_threshold_deg`
    #[serde(default)]
    pub rate_table: RateTable,
    /// Corrections smaller than this use the table
    pub table_threshold_deg: f64,
}

impl AxisCalibration {
    /// Hard-coded defaults for an uncalibrated vessel
    pub fn default_for(axis: Axis) -> Self {
        Self {
            rate_deg_per_sec: axis.default_rate(),
            max_rate_deg_per_sec: axis.default_max_rate(),
            rate_table: RateTable::new(),
            table_threshold_deg: axis.table_threshold_deg(),
        }
    }

    /// Rate to plan a correction of `distance_deg` with.
    ///
    /// Uses the table for small corrections and the flat rate otherwise; never
    /// exceeds the flat rate and never drops below [`RATE_FLOOR_DEG_PER_SEC`].
    pub fn rate_for(&self, distance_deg: f64) -> f64 {
        let flat = self.rate_deg_per_sec.max(RATE_FLOOR_DEG_PER_SEC);
        let rate = if distance_deg.abs() < self.table_threshold_deg {
            self.rate_table
                .interpolate(distance_deg)
                .map_or(flat, |r| r.min(flat))
        } else {
            flat
        };
        rate.max(RATE_FLOOR_DEG_PER_SEC)
    }

    /// Overwrite the flat rate, clamped to `[floor, max_rate]`
    pub fn set_rate(&mut self, rate: f64, floor: f64) {
        let floor = floor.max(RATE_FLOOR_DEG_PER_SEC);
        let ceiling = self.max_rate_deg_per_sec.max(floor);
        if rate.is_finite() {
            self.rate_deg_per_sec = rate.clamp(floor, ceiling);
        }
    }
}

/// All axis calibrations for one vessel in one regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleCalibration {
    pub vehicle: VehicleId,
    pub regime: SpeedRegime,
    /// Calibrated axes; missing axes fall back to defaults
    pub axes: BTreeMap<Axis, AxisCalibration>,
}

impl VehicleCalibration {
    /// Empty calibration (every axis at defaults)
    pub fn new(vehicle: VehicleId, regime: SpeedRegime) -> Self {
        Self {
            vehicle,
            regime,
            axes: BTreeMap::new(),
        }
    }

    /// Calibration for `axis`, or the defaults if never calibrated
    pub fn axis(&self, axis: Axis) -> AxisCalibration {
        self.axes
            .get(&axis)
            .cloned()
            .unwrap_or_else(|| AxisCalibration::default_for(axis))
    }

    pub fn set_axis(&mut self, axis: Axis, calibration: AxisCalibration) {
        self.axes.insert(axis, calibration);
    }

    pub fn key(&self, axis: Axis) -> CalibrationKey {
        CalibrationKey {
            vehicle: self.vehicle.clone(),
            axis,
            regime: self.regime,
        }
    }

    /// True when every axis has a stored calibration
    pub fn is_complete(&self) -> bool {
        Axis::ALL.iter().all(|axis| self.axes.contains_key(axis))
    }

    pub fn load_from_file(path: &std::path::Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let pitch = AxisCalibration::default_for(Axis::Pitch);
        assert_eq!(pitch.rate_deg_per_sec, 33.0);
        assert_eq!(pitch.table_threshold_deg, 30.0);
        assert_eq!(AxisCalibration::default_for(Axis::Roll).table_threshold_deg, 45.0);
        assert_eq!(AxisCalibration::default_for(Axis::Yaw).rate_deg_per_sec, 8.0);
    }

    #[test]
    fn test_table_keeps_order_and_replaces() {
        let mut table = RateTable::from_entries([(4.0, 20.0), (1.0, 5.0), (2.0, 10.0)]);
        table.insert(2.0, 12.0);
        table.insert(-1.0, 3.0);
        table.insert(3.0, f64::NAN);
        assert_eq!(table.entries(), &[(1.0, 5.0), (2.0, 12.0), (4.0, 20.0)]);
    }

    #[test]
    fn test_interpolation_from_origin() {
        let table = RateTable::from_entries([(1.0, 10.0), (3.0, 20.0)]);
        assert_relative_eq!(table.interpolate(0.5).unwrap(), 5.0);
        assert_relative_eq!(table.interpolate(1.0).unwrap(), 10.0);
        assert_relative_eq!(table.interpolate(-2.0).unwrap(), 15.0);
        assert!(table.interpolate(3.5).is_none());
        assert!(RateTable::new().interpolate(1.0).is_none());
    }

    #[test]
    fn test_rate_for_uses_table_below_threshold() {
        let mut cal = AxisCalibration::default_for(Axis::Pitch);
        cal.rate_table = RateTable::from_entries([(2.0, 10.0), (30.0, 33.0)]);

        assert_relative_eq!(cal.rate_for(1.0), 5.0);
        assert_relative_eq!(cal.rate_for(45.0), 33.0);
        // Floor applies near zero
        assert_relative_eq!(cal.rate_for(0.01), RATE_FLOOR_DEG_PER_SEC);
    }

    #[test]
    fn test_rate_for_capped_by_flat_rate() {
        let mut cal = AxisCalibration::default_for(Axis::Yaw);
        cal.rate_table = RateTable::from_entries([(10.0, 50.0)]);
        assert_relative_eq!(cal.rate_for(10.0), 8.0);
    }

    #[test]
    fn test_set_rate_clamps() {
        let mut cal = AxisCalibration::default_for(Axis::Pitch);
        cal.set_rate(0.0, 1.0);
        assert_eq!(cal.rate_deg_per_sec, 1.0);
        cal.set_rate(10_000.0, 1.0);
        assert_eq!(cal.rate_deg_per_sec, cal.max_rate_deg_per_sec);
        cal.set_rate(f64::INFINITY, 1.0);
        assert_eq!(cal.rate_deg_per_sec, cal.max_rate_deg_per_sec);
    }

    #[test]
    fn test_vehicle_calibration_falls_back_to_defaults() {
        let mut vehicle = VehicleCalibration::new(VehicleId::new("cobra"), SpeedRegime::Supercruise);
        assert!(!vehicle.is_complete());
        assert_eq!(vehicle.axis(Axis::Roll), AxisCalibration::default_for(Axis::Roll));

        for axis in Axis::ALL {
            vehicle.set_axis(axis, AxisCalibration::default_for(axis));
        }
        assert!(vehicle.is_complete());
        assert_eq!(vehicle.key(Axis::Yaw).regime, SpeedRegime::Supercruise);
    }
}
