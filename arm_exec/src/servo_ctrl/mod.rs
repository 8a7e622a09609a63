//! # Servo Controller Module
//!
//! This module provides a unified servo control interface which can abstract over different types
//! of servo driver boards.
//!
//! The [`PulseDriver`] trait is the only way the rest of the software touches the hardware: it
//! commands a channel to a pulse width in microseconds, or disables it. [`Servo`] implements the
//! per-joint logic on top of that capability: clamping, calibration, angle to pulse mapping,
//! smoothed moves for positional servos and timed open-loop moves for continuous rotation servos.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Per-servo configuration structures.
mod config;

/// [`PulseDriver`] implementation for the Adafruit PCA9685 16 channel servo driver board.
pub mod pca9685;

/// Single servo control logic.
mod servo;

/// [`PulseDriver`] implementation used when no board is connected.
pub mod sim;

/// Stop token used to interrupt in-flight timed motion.
mod stop;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// Internal
pub use config::*;
pub use servo::*;
pub use stop::*;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// The number of output channels on a servo driver board.
pub const NUM_CHANNELS: u8 = 16;

/// Maximum commandable pulse width.
///
/// Units: microseconds
pub const MAX_PULSE_WIDTH_US: u32 = 10000;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing servo driver boards.
pub trait PulseDriver {
    /// Command a channel to output the given pulse width.
    ///
    /// ## Arguments
    /// - `channel` - The channel to command. Must be below [`NUM_CHANNELS`].
    /// - `pulse_width_us` - The high time of the output signal in microseconds. Must not exceed
    ///   [`MAX_PULSE_WIDTH_US`].
    fn set_pulse_width_us(&mut self, channel: u8, pulse_width_us: u32) -> Result<(), ServoError>;

    /// Disable a channel's output entirely (0% duty).
    ///
    /// For most servos this removes holding torque.
    fn disable_channel(&mut self, channel: u8) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while driving a servo.
#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Channel must be between 0 and 15, got {0}")]
    InvalidChannel(u8),

    #[error("Pulse width {0} us is outside the range 0 to {MAX_PULSE_WIDTH_US} us")]
    InvalidPulseWidth(u32),

    #[error("Motion was interrupted by a stop request")]
    MotionInterrupted,
}

// ------------------------------------------------------------------------------------------------
// TEST UTILITIES
// ------------------------------------------------------------------------------------------------
