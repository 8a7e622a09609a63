//! Servo calibration overlays
//!
//! The calibration tools measure each servo's real pulse limits and mounting corrections and
//! write them to a JSON file. When present, the overlay overrides the defaults baked into the
//! parameter file at arm construction. Absent servos, and absent fields within a servo, fall
//! back to the parameter file values.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

// Internal
use crate::servo_ctrl::ServoConfig;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Calibration overrides for one servo.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ServoCalibration {
    /// Measured pulse width at the minimum angle.
    ///
    /// Units: microseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_pulse_us: Option<u32>,

    /// Measured pulse width at the maximum angle.
    ///
    /// Units: microseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pulse_us: Option<u32>,

    /// Measured angle bias.
    ///
    /// Units: degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_deg: Option<f64>,

    /// Whether the servo is mounted mirrored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invert: Option<bool>,
}

/// Calibration overrides keyed by servo name.
pub type CalibrationMap = HashMap<String, ServoCalibration>;

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while saving a calibration overlay.
#[derive(Debug, Error)]
pub enum CalibSaveError {
    #[error("Cannot create the calibration directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error("Cannot write the calibration file: {0}")]
    WriteError(std::io::Error),

    #[error("Cannot serialise the calibration data: {0}")]
    SerialiseError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl ServoCalibration {
    /// Apply the measured overrides to a servo configuration.
    pub fn apply_to(&self, config: &mut ServoConfig) {
        if let Some(p) = self.min_pulse_us {
            config.min_pulse_us = p;
        }
        if let Some(p) = self.max_pulse_us {
            config.max_pulse_us = p;
        }
        if let Some(o) = self.offset_deg {
            config.offset_deg = o;
        }
        if let Some(i) = self.invert {
            config.invert = i;
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Load a calibration overlay.
///
/// A missing or unreadable file yields an empty overlay with a warning, the arm remains operable
/// on parameter file defaults.
pub fn load<P: AsRef<Path>>(path: P) -> CalibrationMap {
    let path = path.as_ref();

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => {
            warn!(
                "No calibration overlay at {:?}, using parameter file defaults",
                path
            );
            return CalibrationMap::new();
        }
    };

    match serde_json::from_str(&text) {
        Ok(map) => {
            info!("Loaded calibration overlay from {:?}", path);
            map
        }
        Err(e) => {
            warn!("Could not parse calibration overlay {:?}: {}", path, e);
            CalibrationMap::new()
        }
    }
}

/// Save a calibration overlay, creating parent directories as needed.
pub fn save<P: AsRef<Path>>(path: P, map: &CalibrationMap) -> Result<(), CalibSaveError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(CalibSaveError::CannotCreateDir)?;
    }

    let json = serde_json::to_string_pretty(map).map_err(CalibSaveError::SerialiseError)?;
    std::fs::write(path, json).map_err(CalibSaveError::WriteError)?;

    info!("Saved calibration overlay to {:?}", path);

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::servo_ctrl::ServoKindConfig;

    fn base_config() -> ServoConfig {
        ServoConfig {
            channel: 0,
            min_angle_deg: 0.0,
            max_angle_deg: 180.0,
            min_pulse_us: 500,
            max_pulse_us: 2500,
            home_angle_deg: 0.0,
            neutral_angle_deg: 0.0,
            offset_deg: 0.0,
            invert: false,
            smooth_rate_hz: 10.0,
            kind: ServoKindConfig::Position,
        }
    }

    #[test]
    fn test_apply_overrides_present_fields_only() {
        let mut config = base_config();

        let cal = ServoCalibration {
            min_pulse_us: Some(520),
            max_pulse_us: None,
            offset_deg: Some(-2.5),
            invert: None,
        };
        cal.apply_to(&mut config);

        assert_eq!(config.min_pulse_us, 520);
        assert_eq!(config.max_pulse_us, 2500);
        assert_eq!(config.offset_deg, -2.5);
        assert!(!config.invert);
    }

    #[test]
    fn test_overlay_round_trip() {
        let mut map = CalibrationMap::new();
        map.insert(
            "shoulder".to_string(),
            ServoCalibration {
                min_pulse_us: Some(520),
                max_pulse_us: Some(2410),
                offset_deg: None,
                invert: Some(true),
            },
        );

        let json = serde_json::to_string(&map).unwrap();
        let parsed: CalibrationMap = serde_json::from_str(&json).unwrap();

        let shoulder = &parsed["shoulder"];
        assert_eq!(shoulder.min_pulse_us, Some(520));
        assert_eq!(shoulder.max_pulse_us, Some(2410));
        assert_eq!(shoulder.offset_deg, None);
        assert_eq!(shoulder.invert, Some(true));
    }

    #[test]
    fn test_missing_file_yields_empty_overlay() {
        let map = load("/nonexistent/calibration.json");
        assert!(map.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let mut path = std::env::temp_dir();
        path.push("arm_calib_test");
        path.push("servo_calib.json");

        let mut map = CalibrationMap::new();
        map.insert(
            "elbow".to_string(),
            ServoCalibration {
                min_pulse_us: Some(600),
                ..Default::default()
            },
        );

        save(&path, &map).unwrap();
        let loaded = load(&path);

        assert_eq!(loaded["elbow"].min_pulse_us, Some(600));

        std::fs::remove_file(&path).unwrap();
    }
}
