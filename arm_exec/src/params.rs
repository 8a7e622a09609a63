//! # Arm Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::arm_ctrl;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the arm executables.
#[derive(Debug, Deserialize)]
pub struct ArmExecParams {
    /// PWM driver board setup.
    pub pwm: PwmParams,

    /// Arm control parameters.
    pub arm: arm_ctrl::Params,
}

/// Parameters for the PWM driver board.
#[derive(Debug, Deserialize)]
pub struct PwmParams {
    /// The I2C bus the board is connected to.
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    /// The I2C address of the board.
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u8,

    /// PWM update frequency.
    ///
    /// Units: hertz
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
}

// ------------------------------------------------------------------------------------------------
// DEFAULTS
// ------------------------------------------------------------------------------------------------

fn default_i2c_bus() -> u8 {
    1
}

fn default_i2c_address() -> u8 {
    0x40
}

fn default_frequency() -> f64 {
    50.0
}
