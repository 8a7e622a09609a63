//! Configuration structures for individual servos

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use super::NUM_CHANNELS;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Configuration for a single servo.
///
/// Loaded from the arm parameter file, with pulse limits and calibration optionally overridden by
/// a [`crate::calib`] overlay.
#[derive(Debug, Clone, Deserialize)]
pub struct ServoConfig {
    /// The driver board channel the servo is connected to (0-15).
    pub channel: u8,

    /// Minimum allowed logical angle.
    ///
    /// Units: degrees
    #[serde(default)]
    pub min_angle_deg: f64,

    /// Maximum allowed logical angle.
    ///
    /// Units: degrees
    #[serde(default = "default_max_angle")]
    pub max_angle_deg: f64,

    /// Pulse width at `min_angle_deg`.
    ///
    /// Units: microseconds
    #[serde(default = "default_min_pulse")]
    pub min_pulse_us: u32,

    /// Pulse width at `max_angle_deg`.
    ///
    /// Units: microseconds
    #[serde(default = "default_max_pulse")]
    pub max_pulse_us: u32,

    /// Default "home" position.
    ///
    /// Units: degrees
    #[serde(default)]
    pub home_angle_deg: f64,

    /// Neutral/rest position.
    ///
    /// Units: degrees
    #[serde(default)]
    pub neutral_angle_deg: f64,

    /// Additive calibration bias applied to the logical angle before it is mapped to a pulse.
    ///
    /// Units: degrees
    #[serde(default)]
    pub offset_deg: f64,

    /// Whether increasing logical angle maps to decreasing pulse width.
    ///
    /// Set for servos mounted mirrored, so that pose data does not have to change with the
    /// mounting.
    #[serde(default)]
    pub invert: bool,

    /// Update rate used for smoothed position moves.
    ///
    /// Units: hertz
    #[serde(default = "default_smooth_rate")]
    pub smooth_rate_hz: f64,

    /// The kind of servo connected to the channel.
    #[serde(default)]
    pub kind: ServoKindConfig,
}

/// Extra configuration for continuous rotation servos.
#[derive(Debug, Clone, Deserialize)]
pub struct ContinuousConfig {
    /// Pulse width at which the servo does not rotate.
    ///
    /// Units: microseconds
    #[serde(default = "default_stop_pulse")]
    pub stop_pulse_us: u32,

    /// Maximum pulse deviation from the stop pulse used to drive the servo.
    ///
    /// Units: microseconds
    #[serde(default = "default_speed_pulse_range")]
    pub speed_pulse_range_us: u32,

    /// Calibrated rotation rate at full pulse deviation.
    ///
    /// Units: degrees/second
    #[serde(default = "default_degrees_per_second")]
    pub degrees_per_second: f64,

    /// Deadband below which no movement is driven.
    ///
    /// Units: degrees
    #[serde(default = "default_min_move")]
    pub min_move_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The kind of servo on a channel, with kind-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServoKindConfig {
    /// Standard positional servo, the pulse width commands an absolute angle.
    Position,

    /// Continuous rotation servo, the pulse width commands rotation speed and direction. Angle
    /// changes are made by timed runs and are estimates only.
    Continuous(ContinuousConfig),
}

/// Errors raised by an invalid servo configuration.
#[derive(Debug, thiserror::Error)]
pub enum ServoConfigError {
    #[error("Channel must be between 0 and 15, got {0}")]
    InvalidChannel(u8),

    #[error("min_angle_deg ({0}) must not be greater than max_angle_deg ({1})")]
    InvalidAngleRange(f64, f64),

    #[error("min_pulse_us ({0}) must be less than max_pulse_us ({1})")]
    InvalidPulseRange(u32, u32),

    #[error("{0}_angle_deg ({1}) is outside the range {2} to {3} deg")]
    AngleOutsideRange(&'static str, f64, f64, f64),

    #[error("degrees_per_second must be positive, got {0}")]
    InvalidRate(f64),

    #[error("smooth_rate_hz must be positive, got {0}")]
    InvalidSmoothRate(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServoConfig {
    /// Check that the configuration is valid.
    ///
    /// Configuration errors cannot be safely corrected once the servo is driving hardware, so
    /// they fail here, at construction time.
    pub fn validate(&self) -> Result<(), ServoConfigError> {
        if self.channel >= NUM_CHANNELS {
            return Err(ServoConfigError::InvalidChannel(self.channel));
        }
        if self.min_angle_deg > self.max_angle_deg {
            return Err(ServoConfigError::InvalidAngleRange(
                self.min_angle_deg,
                self.max_angle_deg,
            ));
        }
        if self.min_pulse_us >= self.max_pulse_us {
            return Err(ServoConfigError::InvalidPulseRange(
                self.min_pulse_us,
                self.max_pulse_us,
            ));
        }
        if self.smooth_rate_hz <= 0.0 {
            return Err(ServoConfigError::InvalidSmoothRate(self.smooth_rate_hz));
        }

        for &(name, angle) in &[
            ("home", self.home_angle_deg),
            ("neutral", self.neutral_angle_deg),
        ] {
            if angle < self.min_angle_deg || angle > self.max_angle_deg {
                return Err(ServoConfigError::AngleOutsideRange(
                    name,
                    angle,
                    self.min_angle_deg,
                    self.max_angle_deg,
                ));
            }
        }

        if let ServoKindConfig::Continuous(ref c) = self.kind {
            if c.degrees_per_second <= 0.0 {
                return Err(ServoConfigError::InvalidRate(c.degrees_per_second));
            }
        }

        Ok(())
    }
}

impl Default for ServoKindConfig {
    fn default() -> Self {
        ServoKindConfig::Position
    }
}

// ------------------------------------------------------------------------------------------------
// DEFAULTS
// ------------------------------------------------------------------------------------------------

fn default_max_angle() -> f64 {
    180.0
}

fn default_min_pulse() -> u32 {
    500
}

fn default_max_pulse() -> u32 {
    2500
}

fn default_smooth_rate() -> f64 {
    10.0
}

fn default_stop_pulse() -> u32 {
    1500
}

fn default_speed_pulse_range() -> u32 {
    100
}

fn default_degrees_per_second() -> f64 {
    120.0
}

fn default_min_move() -> f64 {
    1.0
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn valid_config() -> ServoConfig {
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
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let mut config = valid_config();
        config.channel = 16;
        assert!(matches!(
            config.validate(),
            Err(ServoConfigError::InvalidChannel(16))
        ));
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let mut config = valid_config();
        config.min_angle_deg = 200.0;
        assert!(matches!(
            config.validate(),
            Err(ServoConfigError::InvalidAngleRange(_, _))
        ));

        let mut config = valid_config();
        config.min_pulse_us = 2500;
        assert!(matches!(
            config.validate(),
            Err(ServoConfigError::InvalidPulseRange(_, _))
        ));
    }

    #[test]
    fn test_home_outside_range_rejected() {
        let mut config = valid_config();
        config.home_angle_deg = 200.0;
        assert!(matches!(
            config.validate(),
            Err(ServoConfigError::AngleOutsideRange("home", _, _, _))
        ));
    }

    #[test]
    fn test_continuous_rate_must_be_positive() {
        let mut config = valid_config();
        config.kind = ServoKindConfig::Continuous(ContinuousConfig {
            stop_pulse_us: 1500,
            speed_pulse_range_us: 100,
            degrees_per_second: 0.0,
            min_move_deg: 1.0,
        });
        assert!(matches!(
            config.validate(),
            Err(ServoConfigError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_deserialise_from_toml() {
        let config: ServoConfig = toml::from_str(
            r#"
            channel = 1
            min_angle_deg = 0.0
            max_angle_deg = 270.0

            [kind.continuous]
            stop_pulse_us = 1480
            degrees_per_second = 90.0
            "#,
        )
        .unwrap();

        assert_eq!(config.channel, 1);
        assert_eq!(config.max_angle_deg, 270.0);
        match config.kind {
            ServoKindConfig::Continuous(c) => {
                assert_eq!(c.stop_pulse_us, 1480);
                assert_eq!(c.speed_pulse_range_us, 100);
                assert_eq!(c.degrees_per_second, 90.0);
            }
            _ => panic!("expected a continuous servo"),
        }
    }
}
