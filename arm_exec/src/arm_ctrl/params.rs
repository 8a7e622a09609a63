//! Parameters structure for ArmCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::collections::HashMap;

use crate::servo_ctrl::ServoConfig;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for arm control.
#[derive(Debug, Deserialize)]
pub struct Params {
    /// Movement speed used when a command does not give one.
    ///
    /// Units: degrees/second
    pub default_speed_degs: f64,

    /// Pause inserted after a sequence step when the step does not give one.
    ///
    /// Units: seconds
    #[serde(default = "default_step_pause")]
    pub default_step_pause_s: f64,

    /// Configuration for each servo, keyed by servo name.
    pub servos: HashMap<String, ServoConfig>,

    /// Path of the pose table, relative to the software root.
    pub poses_file: Option<String>,

    /// Path of the calibration overlay, relative to the software root.
    pub calibration_file: Option<String>,
}

// ---------------------------------------------------------------------------
// DEFAULTS
// ---------------------------------------------------------------------------

fn default_step_pause() -> f64 {
    0.5
}
