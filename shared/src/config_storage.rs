//! Configuration storage for per-vehicle calibration data.
//!
//! Provides centralized storage for the turn-rate calibration of each vessel
//! and speed regime. All config is stored in ~/.helm_config/ by default.

use crate::calibration::{SpeedRegime, VehicleCalibration, VehicleId};
use std::path::{Path, PathBuf};

/// Configuration storage manager for vehicle calibration data.
///
/// Manages loading and saving of calibration files from a centralized
/// directory (defaults to ~/.helm_config/).
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g., ~/.helm_config)
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a new config storage with default path (~/.helm_config)
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        let root_path = PathBuf::from(home).join(".helm_config");
        Ok(Self { root_path })
    }

    /// Create a new config storage with custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Get the root configuration path
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn vehicles_dir(&self) -> PathBuf {
        self.root_path.join("vehicles")
    }

    /// Generate filename for a vehicle calibration
    fn calibration_filename(&self, vehicle: &VehicleId, regime: SpeedRegime) -> PathBuf {
        assert!(
            !vehicle.as_str().contains('-'),
            "Vehicle id cannot contain dash character"
        );

        let vehicle_safe = vehicle.as_str().replace(' ', "_");
        let filename = format!("{vehicle_safe}-{regime}.json");
        self.vehicles_dir().join(filename)
    }

    /// Get the calibration for a vehicle in a speed regime.
    ///
    /// Returns None if no calibration exists for this vehicle.
    /// Returns Some(Err) if the file exists but cannot be loaded.
    pub fn get_calibration(
        &self,
        vehicle: &VehicleId,
        regime: SpeedRegime,
    ) -> Option<Result<VehicleCalibration, std::io::Error>> {
        let path = self.calibration_filename(vehicle, regime);

        if !path.exists() {
            return None;
        }

        Some(VehicleCalibration::load_from_file(&path))
    }

    /// Load a calibration, falling back to an all-defaults one when absent
    pub fn load_or_default(
        &self,
        vehicle: &VehicleId,
        regime: SpeedRegime,
    ) -> std::io::Result<VehicleCalibration> {
        match self.get_calibration(vehicle, regime) {
            Some(result) => result,
            None => Ok(VehicleCalibration::new(vehicle.clone(), regime)),
        }
    }

    /// Save a vehicle calibration.
    ///
    /// Creates the vehicles directory if it doesn't exist.
    /// Returns the path where the calibration was saved.
    pub fn save_calibration(&self, calibration: &VehicleCalibration) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(self.vehicles_dir())?;

        let path = self.calibration_filename(&calibration.vehicle, calibration.regime);
        calibration.save_to_file(&path)?;
        Ok(path)
    }

    /// List all stored calibrations as (vehicle, regime) pairs.
    pub fn list_calibrations(&self) -> std::io::Result<Vec<(VehicleId, SpeedRegime)>> {
        let dir = self.vehicles_dir();

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(filename) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Some((vehicle, regime)) = filename.split_once('-') {
                        if let Some(regime) = SpeedRegime::parse(regime) {
                            found.push((VehicleId::new(vehicle.replace('_', " ")), regime));
                        }
                    }
                }
            }
        }

        Ok(found)
    }

    /// Delete a vehicle calibration.
    ///
    /// Returns Ok(true) if the file was deleted, Ok(false) if it didn't exist.
    pub fn delete_calibration(
        &self,
        vehicle: &VehicleId,
        regime: SpeedRegime,
    ) -> std::io::Result<bool> {
        let path = self.calibration_filename(vehicle, regime);

        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(path)?;
        Ok(true)
    }
}

impl Default for ConfigStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(".helm_config")))
    }
}
