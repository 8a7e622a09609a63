//! Single servo control logic
//!
//! A [`Servo`] owns the calibration and motion state for one joint and issues pulse width
//! commands through a [`PulseDriver`]. Two kinds of servo are supported:
//!
//! - Positional servos, where the pulse width commands an absolute angle which the servo then
//!   holds.
//! - Continuous rotation servos, where the pulse width commands a rotation speed and direction.
//!   These have no position feedback, so angle changes are made by driving the servo for a
//!   calculated time and the resulting position is an estimate which drifts with every move.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use std::time::Duration;

// Internal
use super::{
    ContinuousConfig, PulseDriver, ServoConfig, ServoConfigError, ServoError, ServoKindConfig,
    StopToken,
};
use util::maths::{clamp, lin_map};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Position moves smaller than this are treated as already arrived.
///
/// Units: degrees
const ARRIVAL_THRESHOLD_DEG: f64 = 0.5;

/// Lowest accepted move speed, avoids degenerate timing calculations.
///
/// Units: degrees/second
pub const MIN_SPEED_DEGS: f64 = 1e-6;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A single servo on a driver board channel.
pub struct Servo {
    name: String,
    channel: u8,

    min_angle_deg: f64,
    max_angle_deg: f64,
    home_angle_deg: f64,
    neutral_angle_deg: f64,

    min_pulse_us: u32,
    max_pulse_us: u32,

    offset_deg: f64,
    invert: bool,
    smooth_rate_hz: f64,

    mode: ServoMode,

    stop_token: StopToken,
}

/// Kind-specific state of a servo.
///
/// Keeping the two kinds as separate variants means continuous-only settings such as the stop
/// pulse simply do not exist for a positional servo.
enum ServoMode {
    Position(PositionState),
    Continuous(ContinuousState),
}

#[derive(Default)]
struct PositionState {
    /// Last commanded angle, `None` until the first command.
    ///
    /// Units: degrees
    current_angle_deg: Option<f64>,

    /// Last requested target angle.
    ///
    /// Units: degrees
    target_angle_deg: Option<f64>,
}

struct ContinuousState {
    config: ContinuousConfig,

    /// Open loop position estimate.
    ///
    /// Updated only by this software's own commands, never confirmed by sensing, and drifts with
    /// every move.
    ///
    /// Units: degrees
    estimated_pos_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// An angle reading from a servo.
///
/// Continuous rotation servos have no position feedback, so their angle is a dead-reckoned
/// estimate. The reading keeps that distinction so a caller cannot mistake an estimate for a
/// measurement.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub enum ServoAngle {
    /// The last commanded angle of a positional servo.
    Commanded(f64),

    /// The estimated angle of a continuous servo. Believed, never measured.
    Estimated(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServoAngle {
    /// The angle in degrees, discarding how trustworthy the reading is.
    pub fn degrees(&self) -> f64 {
        match self {
            ServoAngle::Commanded(a) | ServoAngle::Estimated(a) => *a,
        }
    }
}

impl Servo {
    /// Build a servo from its configuration.
    ///
    /// Fails on an invalid configuration, see [`ServoConfig::validate`].
    pub fn from_config(name: &str, config: &ServoConfig) -> Result<Self, ServoConfigError> {
        config.validate()?;

        let mode = match &config.kind {
            ServoKindConfig::Position => ServoMode::Position(PositionState::default()),
            ServoKindConfig::Continuous(c) => ServoMode::Continuous(ContinuousState {
                config: c.clone(),
                estimated_pos_deg: config.home_angle_deg,
            }),
        };

        info!(
            "Initialised {} servo on channel {} ({} mode) (angle range: {}-{} deg, home: {} deg)",
            name,
            config.channel,
            match mode {
                ServoMode::Position(_) => "POSITION",
                ServoMode::Continuous(_) => "CONTINUOUS",
            },
            config.min_angle_deg,
            config.max_angle_deg,
            config.home_angle_deg
        );

        Ok(Servo {
            name: name.to_owned(),
            channel: config.channel,
            min_angle_deg: config.min_angle_deg,
            max_angle_deg: config.max_angle_deg,
            home_angle_deg: config.home_angle_deg,
            neutral_angle_deg: config.neutral_angle_deg,
            min_pulse_us: config.min_pulse_us,
            max_pulse_us: config.max_pulse_us,
            offset_deg: config.offset_deg,
            invert: config.invert,
            smooth_rate_hz: config.smooth_rate_hz,
            mode,
            stop_token: StopToken::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self.mode, ServoMode::Continuous(_))
    }

    pub fn home_angle_deg(&self) -> f64 {
        self.home_angle_deg
    }

    pub fn neutral_angle_deg(&self) -> f64 {
        self.neutral_angle_deg
    }

    /// Replace the servo's stop token with one shared across the arm.
    pub(crate) fn share_stop_token(&mut self, token: StopToken) {
        self.stop_token = token;
    }

    /// Clamp an angle into the servo's legal range.
    ///
    /// Out of range angles are clamped, never rejected, so that an upstream coordinate bug can
    /// never command a physical over-travel.
    pub fn clamp_angle(&self, angle_deg: f64) -> f64 {
        if angle_deg < self.min_angle_deg {
            warn!(
                "{}: angle {} deg below min {} deg, clamping",
                self.name, angle_deg, self.min_angle_deg
            );
            return self.min_angle_deg;
        }
        if angle_deg > self.max_angle_deg {
            warn!(
                "{}: angle {} deg above max {} deg, clamping",
                self.name, angle_deg, self.max_angle_deg
            );
            return self.max_angle_deg;
        }
        angle_deg
    }

    /// Apply offset/invert calibration to a logical angle before mapping it to a pulse.
    fn apply_calibration(&self, angle_deg: f64) -> f64 {
        let mut a = angle_deg + self.offset_deg;
        if self.invert {
            a = self.max_angle_deg - (a - self.min_angle_deg);
        }
        a
    }

    /// Convert a calibrated angle to a pulse width (positional servos).
    fn angle_to_pulse(&self, angle_deg: f64) -> u32 {
        if self.max_angle_deg == self.min_angle_deg {
            warn!(
                "{}: max_angle == min_angle, defaulting to midpoint pulse",
                self.name
            );
            return (self.min_pulse_us + self.max_pulse_us) / 2;
        }

        let ratio = (angle_deg - self.min_angle_deg) / (self.max_angle_deg - self.min_angle_deg);
        let ratio = clamp(&ratio, &0.0, &1.0);

        let pulse = lin_map(
            (0.0, 1.0),
            (self.min_pulse_us as f64, self.max_pulse_us as f64),
            ratio,
        )
        .round() as u32;

        pulse.max(self.min_pulse_us).min(self.max_pulse_us)
    }

    /// Set the servo to a specific angle.
    ///
    /// For a continuous servo this is a full speed timed run, which blocks.
    pub fn set_angle<D: PulseDriver>(
        &mut self,
        driver: &mut D,
        angle_deg: f64,
        validate: bool,
    ) -> Result<(), ServoError> {
        let a = if validate {
            self.clamp_angle(angle_deg)
        } else {
            angle_deg
        };

        if self.is_continuous() {
            return self.move_continuous(driver, a, None);
        }

        let calibrated = self.apply_calibration(a);
        let pulse = self.angle_to_pulse(calibrated);

        driver.set_pulse_width_us(self.channel, pulse)?;

        // Only update the believed state once the pulse has actually been issued. The stored
        // angle is always kept inside the legal range, even when validation was skipped.
        let stored = clamp(&a, &self.min_angle_deg, &self.max_angle_deg);
        if let ServoMode::Position(state) = &mut self.mode {
            state.current_angle_deg = Some(stored);
            state.target_angle_deg = Some(stored);
        }

        debug!(
            "{}: set {} deg (cal = {} deg -> {} us)",
            self.name, a, calibrated, pulse
        );

        Ok(())
    }

    /// Move the servo to an angle with optional speed control.
    ///
    /// For a positional servo with a speed and a known current angle, the move is linearly
    /// interpolated at the configured smoothing rate, sleeping between steps when `blocking`.
    /// Without a speed, or before the first commanded angle, the move is immediate.
    ///
    /// For a continuous servo this is a timed run and always blocks, see
    /// [`Self::move_continuous`].
    pub fn move_to<D: PulseDriver>(
        &mut self,
        driver: &mut D,
        angle_deg: f64,
        speed_degs: Option<f64>,
        blocking: bool,
    ) -> Result<(), ServoError> {
        let target = self.clamp_angle(angle_deg);

        if self.is_continuous() {
            return self.move_continuous(driver, target, speed_degs);
        }

        let current = match &self.mode {
            ServoMode::Position(state) => state.current_angle_deg,
            ServoMode::Continuous(_) => None,
        };

        let (speed, start) = match (speed_degs, current) {
            (Some(s), Some(c)) => (s, c),
            _ => return self.set_angle(driver, target, false),
        };

        let delta = target - start;
        if delta.abs() < ARRIVAL_THRESHOLD_DEG {
            if let ServoMode::Position(state) = &mut self.mode {
                state.target_angle_deg = Some(target);
            }
            return Ok(());
        }

        let speed = speed.max(MIN_SPEED_DEGS);
        let move_time_s = delta.abs() / speed;

        let steps = ((move_time_s * self.smooth_rate_hz).round() as u64).max(1);
        let step_delay = Duration::from_secs_f64(move_time_s / steps as f64);

        debug!(
            "{}: moving {} deg -> {} deg at {} deg/s ({:.2} s, {} steps)",
            self.name, start, target, speed, move_time_s, steps
        );

        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            self.set_angle(driver, start + delta * t, false)?;

            if blocking && i < steps {
                let (_, completed) = self.stop_token.wait_for(step_delay);
                if !completed {
                    warn!("{}: move interrupted by stop request", self.name);
                    return Err(ServoError::MotionInterrupted);
                }
            }
        }

        // Force the final state to the exact target to remove any rounding drift from the
        // interpolation
        if let ServoMode::Position(state) = &mut self.mode {
            state.current_angle_deg = Some(target);
            state.target_angle_deg = Some(target);
        }

        Ok(())
    }

    /// Move a continuous rotation servo to an approximate angle by driving it for a calculated
    /// time.
    ///
    /// There is no position feedback: the run time comes from the calibrated rotation rate, the
    /// resulting position is assumed, and calibration drift compounds over repeated moves.
    fn move_continuous<D: PulseDriver>(
        &mut self,
        driver: &mut D,
        angle_deg: f64,
        speed: Option<f64>,
    ) -> Result<(), ServoError> {
        let target = self.clamp_angle(angle_deg);

        let (config, start) = match &self.mode {
            ServoMode::Continuous(state) => (state.config.clone(), state.estimated_pos_deg),
            // Positional servos have no timed run
            ServoMode::Position(_) => return Ok(()),
        };

        let delta = target - start;

        // Sub-deadband moves are not worth a drive pulse, just update the estimate
        if delta.abs() < config.min_move_deg {
            debug!("{}: already at target ({} deg)", self.name, target);
            self.set_estimated(target);
            return Ok(());
        }

        let factor = normalise_speed(speed);

        // A factor of zero is an explicit stop, not a zero-length move
        if factor == 0.0 {
            return self.stop(driver);
        }

        // Drive direction, flipped if the servo is mounted mirrored
        let mut direction = if delta > 0.0 { 1.0 } else { -1.0 };
        if self.invert {
            direction = -direction;
        }

        // The deviation is at least one microsecond so a decided move can never round down to a
        // no-op
        let deviation_us = (config.speed_pulse_range_us as f64 * factor).round().max(1.0);
        let drive_pulse_us =
            (config.stop_pulse_us as f64 + direction * deviation_us).max(0.0) as u32;

        let rate_degs = (config.degrees_per_second * factor).max(MIN_SPEED_DEGS);
        let move_time_s = delta.abs() / rate_degs;

        info!(
            "{}: driving {:.1} deg ({:.1} -> {:.1} deg) for {:.2} s at pulse {} us",
            self.name,
            delta.abs(),
            start,
            target,
            move_time_s,
            drive_pulse_us
        );

        driver.set_pulse_width_us(self.channel, drive_pulse_us)?;

        let (waited, completed) = self
            .stop_token
            .wait_for(Duration::from_secs_f64(move_time_s));

        // Always return to the stop pulse, interrupted or not
        let stop_result = driver.set_pulse_width_us(self.channel, config.stop_pulse_us);

        if completed {
            self.set_estimated(target);
            debug!("{}: stopped at estimated {} deg", self.name, target);
            stop_result
        } else {
            // Dead-reckon the part of the run that did happen into the estimate
            let travelled = (rate_degs * waited.as_secs_f64()).min(delta.abs());
            let reached = start + delta.signum() * travelled;
            self.set_estimated(reached);

            warn!(
                "{}: drive interrupted after {:.2} s at estimated {:.1} deg",
                self.name,
                waited.as_secs_f64(),
                reached
            );

            stop_result?;
            Err(ServoError::MotionInterrupted)
        }
    }

    /// Move to the configured home position.
    pub fn home<D: PulseDriver>(
        &mut self,
        driver: &mut D,
        speed_degs: Option<f64>,
        blocking: bool,
    ) -> Result<(), ServoError> {
        info!(
            "{}: moving to home position ({} deg)",
            self.name, self.home_angle_deg
        );
        let home = self.home_angle_deg;
        self.move_to(driver, home, speed_degs, blocking)
    }

    /// Move to the configured neutral position.
    pub fn neutral<D: PulseDriver>(
        &mut self,
        driver: &mut D,
        speed_degs: Option<f64>,
        blocking: bool,
    ) -> Result<(), ServoError> {
        info!(
            "{}: moving to neutral position ({} deg)",
            self.name, self.neutral_angle_deg
        );
        let neutral = self.neutral_angle_deg;
        self.move_to(driver, neutral, speed_degs, blocking)
    }

    /// Get the servo's angle.
    ///
    /// `None` is returned for a positional servo which has not yet been commanded.
    pub fn get_angle(&self) -> Option<ServoAngle> {
        match &self.mode {
            ServoMode::Position(state) => state.current_angle_deg.map(ServoAngle::Commanded),
            ServoMode::Continuous(state) => Some(ServoAngle::Estimated(state.estimated_pos_deg)),
        }
    }

    /// Stop a continuous servo immediately.
    ///
    /// Positional servos hold their commanded angle and do not run, so this is a no-op for them.
    pub fn stop<D: PulseDriver>(&mut self, driver: &mut D) -> Result<(), ServoError> {
        if let ServoMode::Continuous(state) = &self.mode {
            info!("{}: stopping continuous servo", self.name);
            return driver.set_pulse_width_us(self.channel, state.config.stop_pulse_us);
        }
        Ok(())
    }

    /// Disable the servo's output (0% duty).
    ///
    /// The stored angle state is kept, so a later move resumes from the last known or estimated
    /// angle. Disabling removes holding torque and the joint may sag, which the stored angle does
    /// not track.
    pub fn disable<D: PulseDriver>(&mut self, driver: &mut D) -> Result<(), ServoError> {
        info!("{}: disabling output", self.name);
        driver.disable_channel(self.channel)
    }

    /// Update the open loop estimate, clamped into the legal angle range.
    fn set_estimated(&mut self, angle_deg: f64) {
        let a = clamp(&angle_deg, &self.min_angle_deg, &self.max_angle_deg);
        if let ServoMode::Continuous(state) = &mut self.mode {
            state.estimated_pos_deg = a;
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Normalise a requested speed into a drive factor in `[0, 1]`.
///
/// Accepts either a fraction (at most 1.0) or a percentage in `(1, 100]`. Values above 100
/// saturate at full speed, values at or below zero mean stop.
fn normalise_speed(speed: Option<f64>) -> f64 {
    match speed {
        None => 1.0,
        Some(s) if s <= 0.0 => 0.0,
        Some(s) if s <= 1.0 => s,
        Some(s) if s <= 100.0 => s / 100.0,
        Some(_) => 1.0,
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::servo_ctrl::test_utils::RecordingOutput;

    fn position_config(channel: u8) -> ServoConfig {
        ServoConfig {
            channel,
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

    fn continuous_config(channel: u8) -> ServoConfig {
        ServoConfig {
            kind: ServoKindConfig::Continuous(ContinuousConfig {
                stop_pulse_us: 1500,
                speed_pulse_range_us: 100,
                degrees_per_second: 120.0,
                min_move_deg: 1.0,
            }),
            ..position_config(channel)
        }
    }

    #[test]
    fn test_clamp_angle() {
        let servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        assert_eq!(servo.clamp_angle(90.0), 90.0);
        assert_eq!(servo.clamp_angle(-10.0), 0.0);
        assert_eq!(servo.clamp_angle(200.0), 180.0);
        assert_eq!(servo.clamp_angle(0.0), 0.0);
        assert_eq!(servo.clamp_angle(180.0), 180.0);
    }

    #[test]
    fn test_set_angle_maps_to_pulse() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        servo.set_angle(&mut driver, 90.0, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(1500));
        assert_eq!(servo.get_angle(), Some(ServoAngle::Commanded(90.0)));

        // Out of range commands are clamped, never driven past the limit
        servo.set_angle(&mut driver, 200.0, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(2500));
        assert_eq!(servo.get_angle(), Some(ServoAngle::Commanded(180.0)));
    }

    #[test]
    fn test_pulse_mapping_endpoints() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        servo.set_angle(&mut driver, 0.0, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(500));

        servo.set_angle(&mut driver, 180.0, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(2500));
    }

    #[test]
    fn test_pulse_mapping_monotonic() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        let mut last = 0;
        for angle in (0..=180).step_by(5) {
            servo.set_angle(&mut driver, angle as f64, true).unwrap();
            let pulse = driver.last_pulse(0).unwrap();
            assert!(pulse >= last);
            last = pulse;
        }
    }

    #[test]
    fn test_inverted_mapping_reverses() {
        let mut driver = RecordingOutput::default();
        let mut config = position_config(0);
        config.invert = true;
        let mut servo = Servo::from_config("shoulder", &config).unwrap();

        servo.set_angle(&mut driver, 0.0, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(2500));

        servo.set_angle(&mut driver, 180.0, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(500));

        // Midpoint is unchanged by the mirror
        servo.set_angle(&mut driver, 90.0, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(1500));
    }

    #[test]
    fn test_offset_shifts_pulse() {
        let mut driver = RecordingOutput::default();
        let mut config = position_config(0);
        config.offset_deg = 10.0;
        let mut servo = Servo::from_config("shoulder", &config).unwrap();

        // 80 deg + 10 deg offset maps as 90 deg
        servo.set_angle(&mut driver, 80.0, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(1500));
    }

    #[test]
    fn test_degenerate_angle_range_maps_to_midpoint() {
        let mut driver = RecordingOutput::default();
        let mut config = position_config(0);
        config.min_angle_deg = 90.0;
        config.max_angle_deg = 90.0;
        config.home_angle_deg = 90.0;
        config.neutral_angle_deg = 90.0;
        let mut servo = Servo::from_config("shoulder", &config).unwrap();

        servo.set_angle(&mut driver, 90.0, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(1500));
    }

    #[test]
    fn test_set_angle_is_idempotent() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        servo.set_angle(&mut driver, 45.0, true).unwrap();
        servo.set_angle(&mut driver, 45.0, true).unwrap();

        let pulses = driver.pulses(0);
        assert_eq!(pulses.len(), 2);
        assert_eq!(pulses[0], pulses[1]);
        assert_eq!(servo.get_angle(), Some(ServoAngle::Commanded(45.0)));
    }

    #[test]
    fn test_move_without_speed_is_immediate() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        servo.move_to(&mut driver, 90.0, None, true).unwrap();

        assert_eq!(driver.pulses(0).len(), 1);
        assert_eq!(driver.last_pulse(0), Some(1500));
    }

    #[test]
    fn test_smoothed_move_steps() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        servo.set_angle(&mut driver, 0.0, true).unwrap();

        // 100 deg at 50 deg/s is a 2 s move: 20 steps at 10 Hz, 21 samples
        servo
            .move_to(&mut driver, 100.0, Some(50.0), false)
            .unwrap();

        let pulses = driver.pulses(0);
        assert_eq!(pulses.len(), 1 + 21);

        // Final sample is the exact target
        assert_eq!(*pulses.last().unwrap(), 1611);
        assert_eq!(servo.get_angle(), Some(ServoAngle::Commanded(100.0)));
    }

    #[test]
    fn test_move_below_threshold_is_a_no_op() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        servo.set_angle(&mut driver, 90.0, true).unwrap();
        servo.move_to(&mut driver, 90.3, Some(50.0), true).unwrap();

        assert_eq!(driver.pulses(0).len(), 1);
        assert_eq!(servo.get_angle(), Some(ServoAngle::Commanded(90.0)));
    }

    #[test]
    fn test_continuous_timed_move() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("elbow", &continuous_config(1)).unwrap();

        assert_eq!(servo.get_angle(), Some(ServoAngle::Estimated(0.0)));

        let start = std::time::Instant::now();
        servo
            .move_to(&mut driver, 90.0, Some(100.0), true)
            .unwrap();
        let elapsed = start.elapsed();

        // 90 deg at 120 deg/s is a 0.75 s run at full positive deviation
        assert_eq!(driver.pulses(1), vec![1600, 1500]);
        assert!(elapsed >= Duration::from_millis(700));
        assert_eq!(servo.get_angle(), Some(ServoAngle::Estimated(90.0)));
    }

    #[test]
    fn test_continuous_reverse_direction() {
        let mut driver = RecordingOutput::default();
        let mut config = continuous_config(1);
        config.home_angle_deg = 90.0;
        config.kind = ServoKindConfig::Continuous(ContinuousConfig {
            stop_pulse_us: 1500,
            speed_pulse_range_us: 100,
            degrees_per_second: 3600.0,
            min_move_deg: 1.0,
        });
        let mut servo = Servo::from_config("elbow", &config).unwrap();

        servo.move_to(&mut driver, 45.0, None, true).unwrap();

        assert_eq!(driver.pulses(1), vec![1400, 1500]);
        assert_eq!(servo.get_angle(), Some(ServoAngle::Estimated(45.0)));
    }

    #[test]
    fn test_continuous_invert_flips_drive_direction() {
        let mut driver = RecordingOutput::default();
        let mut config = continuous_config(1);
        config.invert = true;
        config.kind = ServoKindConfig::Continuous(ContinuousConfig {
            stop_pulse_us: 1500,
            speed_pulse_range_us: 100,
            degrees_per_second: 3600.0,
            min_move_deg: 1.0,
        });
        let mut servo = Servo::from_config("elbow", &config).unwrap();

        // A positive logical move drives with negative deviation when inverted
        servo.move_to(&mut driver, 45.0, None, true).unwrap();

        assert_eq!(driver.pulses(1), vec![1400, 1500]);
        assert_eq!(servo.get_angle(), Some(ServoAngle::Estimated(45.0)));
    }

    #[test]
    fn test_continuous_deadband_updates_estimate_only() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("elbow", &continuous_config(1)).unwrap();

        servo.move_to(&mut driver, 0.5, None, true).unwrap();

        assert!(driver.pulses(1).is_empty());
        assert_eq!(servo.get_angle(), Some(ServoAngle::Estimated(0.5)));
    }

    #[test]
    fn test_continuous_zero_speed_is_a_stop() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("elbow", &continuous_config(1)).unwrap();

        servo.move_to(&mut driver, 90.0, Some(0.0), true).unwrap();

        assert_eq!(driver.pulses(1), vec![1500]);
        assert_eq!(servo.get_angle(), Some(ServoAngle::Estimated(0.0)));
    }

    #[test]
    fn test_continuous_percentage_speed() {
        let mut driver = RecordingOutput::default();
        let mut config = continuous_config(1);
        config.kind = ServoKindConfig::Continuous(ContinuousConfig {
            stop_pulse_us: 1500,
            speed_pulse_range_us: 100,
            degrees_per_second: 3600.0,
            min_move_deg: 1.0,
        });
        let mut servo = Servo::from_config("elbow", &config).unwrap();

        // 50 is read as 50%, so half deviation
        servo.move_to(&mut driver, 90.0, Some(50.0), true).unwrap();

        assert_eq!(driver.pulses(1), vec![1550, 1500]);
    }

    #[test]
    fn test_continuous_interrupted_move() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("elbow", &continuous_config(1)).unwrap();

        let token = StopToken::new();
        token.trip();
        servo.share_stop_token(token);

        let result = servo.move_to(&mut driver, 90.0, None, true);

        assert!(matches!(result, Err(ServoError::MotionInterrupted)));
        // The stop pulse is still issued on the way out
        assert_eq!(driver.pulses(1), vec![1600, 1500]);
        // Essentially no travel happened, so the estimate stays near the start
        match servo.get_angle() {
            Some(ServoAngle::Estimated(a)) => assert!(a < 1.0),
            other => panic!("unexpected angle: {:?}", other),
        }
    }

    #[test]
    fn test_driver_failure_leaves_state_unchanged() {
        let mut driver = RecordingOutput {
            fail_channels: vec![0],
            ..Default::default()
        };
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        assert!(servo.set_angle(&mut driver, 90.0, true).is_err());
        assert_eq!(servo.get_angle(), None);
    }

    #[test]
    fn test_stop_is_a_no_op_for_positional() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        servo.stop(&mut driver).unwrap();
        assert!(driver.cmds.is_empty());
    }

    #[test]
    fn test_disable_keeps_angle_state() {
        let mut driver = RecordingOutput::default();
        let mut servo = Servo::from_config("shoulder", &position_config(0)).unwrap();

        servo.set_angle(&mut driver, 45.0, true).unwrap();
        servo.disable(&mut driver).unwrap();

        assert!(driver.is_disabled(0));
        assert_eq!(servo.get_angle(), Some(ServoAngle::Commanded(45.0)));
    }

    #[test]
    fn test_home_moves_to_home_angle() {
        let mut driver = RecordingOutput::default();
        let mut config = position_config(0);
        config.home_angle_deg = 90.0;
        let mut servo = Servo::from_config("shoulder", &config).unwrap();

        servo.home(&mut driver, None, true).unwrap();
        assert_eq!(driver.last_pulse(0), Some(1500));
    }

    #[test]
    fn test_normalise_speed() {
        assert_eq!(normalise_speed(None), 1.0);
        assert_eq!(normalise_speed(Some(0.0)), 0.0);
        assert_eq!(normalise_speed(Some(-5.0)), 0.0);
        assert_eq!(normalise_speed(Some(0.5)), 0.5);
        assert_eq!(normalise_speed(Some(1.0)), 1.0);
        assert_eq!(normalise_speed(Some(50.0)), 0.5);
        assert_eq!(normalise_speed(Some(100.0)), 1.0);
        assert_eq!(normalise_speed(Some(250.0)), 1.0);
    }
}
