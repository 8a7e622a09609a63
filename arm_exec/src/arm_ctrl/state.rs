//! Implementations for the ArmCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Duration;

// Internal
use super::{ArmCtrlError, Params, PoseAngles, PoseTable, SequenceStep};
use crate::calib::CalibrationMap;
use crate::servo_ctrl::{PulseDriver, Servo, ServoAngle, ServoError, StopToken, MIN_SPEED_DEGS};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Coordinated control of the full set of arm servos.
///
/// The arm exclusively owns its pulse driver: nothing else may touch the board while the arm is
/// alive, and no internal locking is performed. All timed motion blocks the calling thread; the
/// only pre-emption path is the shared [`StopToken`] (see [`Self::stop_token`]), which a
/// supervising thread can trip to make the motion thread itself abandon an in-flight wait.
///
/// Dropping the arm stops continuous servos and disables every output, so the board is released
/// safely on every exit path.
pub struct ArmCtrl<D: PulseDriver> {
    driver: D,

    servos: HashMap<String, Servo>,

    poses: PoseTable,

    /// Speed used when a motion command does not give one.
    ///
    /// Units: degrees/second
    default_speed_degs: f64,

    /// Pause after sequence steps which do not give one.
    ///
    /// Units: seconds
    default_step_pause_s: f64,

    /// While false all motion commands are refused.
    enabled: bool,

    /// The last pose successfully reached.
    current_pose: Option<String>,

    stop_token: StopToken,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<D: PulseDriver> ArmCtrl<D> {
    /// Build the arm from its parameters.
    ///
    /// The calibration overlay and pose table are loaded by the caller and passed in, the arm
    /// never reaches for hidden global state. Servo configuration errors fail here, fast, since
    /// they cannot be corrected once hardware is moving.
    pub fn new(
        driver: D,
        params: &Params,
        calib: &CalibrationMap,
        poses: PoseTable,
    ) -> Result<Self, ArmCtrlError> {
        let stop_token = StopToken::new();
        let mut servos = HashMap::new();

        for (name, config) in &params.servos {
            let mut config = config.clone();

            if let Some(cal) = calib.get(name) {
                debug!("Applying calibration overlay to {}", name);
                cal.apply_to(&mut config);
            }

            let mut servo = Servo::from_config(name, &config)
                .map_err(|e| ArmCtrlError::BadServoConfig(name.clone(), e))?;
            servo.share_stop_token(stop_token.clone());

            servos.insert(name.clone(), servo);
        }

        info!(
            "Arm control initialised with {} servos and {} poses",
            servos.len(),
            poses.len()
        );

        Ok(ArmCtrl {
            driver,
            servos,
            poses,
            default_speed_degs: params.default_speed_degs,
            default_step_pause_s: params.default_step_pause_s,
            enabled: true,
            current_pose: None,
            stop_token,
        })
    }

    /// Set multiple servos simultaneously.
    ///
    /// Every entry is attempted: an unknown name or a failed output is reported in the error but
    /// does not stop the other entries being applied.
    pub fn set_angles(&mut self, angles: &PoseAngles, validate: bool) -> Result<(), ArmCtrlError> {
        if !self.enabled {
            warn!("Arm is disabled, refusing set_angles");
            return Err(ArmCtrlError::Disabled);
        }

        debug!("Setting angles: {:?}", angles);

        let mut failed: Vec<String> = vec![];

        for (name, angle) in sorted_entries(angles) {
            match self.servos.get_mut(name) {
                Some(servo) => {
                    if let Err(e) = servo.set_angle(&mut self.driver, *angle, validate) {
                        warn!("{}: demand failed: {}", name, e);
                        failed.push(name.clone());
                    }
                }
                None => {
                    warn!("Unknown servo: {}", name);
                    failed.push(name.clone());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ArmCtrlError::FailedDemands(failed))
        }
    }

    /// Move multiple servos with coordinated motion.
    ///
    /// Positional servos are synchronised: each one's speed is scaled so that all of them arrive
    /// together with the slowest, making a multi servo move look like a single smooth arrival.
    /// All positional pulse commands are issued before the single blocking wait, so the servos
    /// themselves move concurrently even though this thread is sequential.
    ///
    /// Continuous servos run sequentially after the positional wait: their timed runs block and
    /// cannot overlap without a second thread, so no attempt is made to synchronise them.
    pub fn move_to_angles(
        &mut self,
        angles: &PoseAngles,
        speed_degs: Option<f64>,
        blocking: bool,
    ) -> Result<(), ArmCtrlError> {
        if !self.enabled {
            warn!("Arm is disabled, refusing move_to_angles");
            return Err(ArmCtrlError::Disabled);
        }

        let speed = speed_degs
            .unwrap_or(self.default_speed_degs)
            .max(MIN_SPEED_DEGS);

        info!("Moving to angles {:?} at {} deg/s", angles, speed);

        let mut failed: Vec<String> = vec![];

        // Partition the demands. Positional servos with a known angle get synchronised timing,
        // ones with no known angle have no delta to time and are set directly.
        let mut timed: Vec<(String, f64, f64)> = vec![];
        let mut immediate: Vec<(String, f64)> = vec![];
        let mut continuous: Vec<(String, f64)> = vec![];

        for (name, target) in sorted_entries(angles) {
            match self.servos.get(name) {
                Some(servo) if servo.is_continuous() => continuous.push((name.clone(), *target)),
                Some(servo) => match servo.get_angle() {
                    Some(current) => {
                        let delta = (*target - current.degrees()).abs();
                        timed.push((name.clone(), *target, delta));
                    }
                    None => immediate.push((name.clone(), *target)),
                },
                None => {
                    warn!("Unknown servo: {}", name);
                    failed.push(name.clone());
                }
            }
        }

        // The servo moving the furthest sets the pace
        let max_time_s = timed.iter().map(|(_, _, d)| d / speed).fold(0.0, f64::max);

        for (name, target) in immediate {
            if let Some(servo) = self.servos.get_mut(&name) {
                if let Err(e) = servo.set_angle(&mut self.driver, target, true) {
                    warn!("{}: demand failed: {}", name, e);
                    failed.push(name);
                }
            }
        }

        // Issue every positional move without blocking, scaling each servo's speed so they all
        // finish at max_time
        for (name, target, delta) in &timed {
            let servo = match self.servos.get_mut(name) {
                Some(s) => s,
                None => continue,
            };

            let result = if max_time_s > 0.0 {
                let servo_speed = (delta / max_time_s).max(MIN_SPEED_DEGS);
                servo.move_to(&mut self.driver, *target, Some(servo_speed), false)
            } else {
                servo.set_angle(&mut self.driver, *target, true)
            };

            if let Err(e) = result {
                warn!("{}: demand failed: {}", name, e);
                failed.push(name.clone());
            }
        }

        // Single wait while the servos themselves do the moving
        if blocking && max_time_s > 0.0 {
            let (_, completed) = self
                .stop_token
                .wait_for(Duration::from_secs_f64(max_time_s));
            if !completed {
                warn!("Coordinated move interrupted by stop request");
                return Err(ArmCtrlError::Interrupted);
            }
        }

        // Continuous servos run one at a time once the positional wait is over
        for (name, target) in continuous {
            if self.stop_token.is_tripped() {
                warn!("Coordinated move interrupted by stop request");
                return Err(ArmCtrlError::Interrupted);
            }

            if let Some(servo) = self.servos.get_mut(&name) {
                match servo.move_to(&mut self.driver, target, speed_degs, blocking) {
                    Ok(_) => (),
                    Err(ServoError::MotionInterrupted) => return Err(ArmCtrlError::Interrupted),
                    Err(e) => {
                        warn!("{}: demand failed: {}", name, e);
                        failed.push(name);
                    }
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ArmCtrlError::FailedDemands(failed))
        }
    }

    /// Move to a predefined pose.
    ///
    /// The pose is recorded as current only if the move succeeds.
    pub fn go_to_pose(
        &mut self,
        pose_name: &str,
        speed_degs: Option<f64>,
        blocking: bool,
    ) -> Result<(), ArmCtrlError> {
        let angles = match self.poses.get(pose_name) {
            Some(a) => a.clone(),
            None => {
                warn!("Unknown pose: {}", pose_name);
                return Err(ArmCtrlError::UnknownPose(pose_name.to_string()));
            }
        };

        info!("Moving to pose: {}", pose_name);

        self.move_to_angles(&angles, speed_degs, blocking)?;
        self.current_pose = Some(pose_name.to_string());

        Ok(())
    }

    /// Move to the home pose.
    ///
    /// If no `home` pose is loaded every servo is sent to zero instead, a safe default that
    /// works before any pose data exists.
    pub fn home(&mut self, speed_degs: Option<f64>, blocking: bool) -> Result<(), ArmCtrlError> {
        info!("Moving to home");
        self.pose_or_all_zero("home", speed_degs, blocking)
    }

    /// Move to the neutral pose, falling back to all zero like [`Self::home`].
    pub fn neutral(
        &mut self,
        speed_degs: Option<f64>,
        blocking: bool,
    ) -> Result<(), ArmCtrlError> {
        info!("Moving to neutral");
        self.pose_or_all_zero("neutral", speed_degs, blocking)
    }

    /// Execute a sequence of pose steps.
    ///
    /// Steps run strictly in order, each blocking until complete. The sequence aborts at the
    /// first failing step: carrying on after a missed step would compound the physical error,
    /// especially for continuous servos whose position is already only estimated. The reported
    /// step index is 1-based.
    pub fn execute_sequence(
        &mut self,
        steps: &[SequenceStep],
        default_pause_s: Option<f64>,
    ) -> Result<(), ArmCtrlError> {
        let default_pause_s = default_pause_s.unwrap_or(self.default_step_pause_s);

        info!("Executing sequence of {} steps", steps.len());

        for (i, step) in steps.iter().enumerate() {
            let step_num = i + 1;
            info!("Step {}/{}: {}", step_num, steps.len(), step.pose);

            if let Err(e) = self.go_to_pose(&step.pose, step.speed_degs, true) {
                warn!("Sequence failed at step {}", step_num);
                return Err(ArmCtrlError::SequenceFailed {
                    step: step_num,
                    pose: step.pose.clone(),
                    source: Box::new(e),
                });
            }

            let pause_s = step.pause_s.unwrap_or(default_pause_s);
            if pause_s > 0.0 {
                let (_, completed) = self
                    .stop_token
                    .wait_for(Duration::from_secs_f64(pause_s));
                if !completed {
                    return Err(ArmCtrlError::SequenceFailed {
                        step: step_num,
                        pose: step.pose.clone(),
                        source: Box::new(ArmCtrlError::Interrupted),
                    });
                }
            }
        }

        info!("Sequence complete");

        Ok(())
    }

    /// Emergency stop.
    ///
    /// Trips the stop token so any in-flight wait ends at its next poll, issues stop pulses to
    /// every continuous servo, then disables every output. The arm stays disabled until
    /// [`Self::enable`] is called.
    pub fn emergency_stop(&mut self) -> Result<(), ArmCtrlError> {
        warn!("EMERGENCY STOP");

        self.stop_token.trip();

        let mut first_err: Option<ServoError> = None;

        for name in self.sorted_servo_names() {
            if let Some(servo) = self.servos.get_mut(&name) {
                if let Err(e) = servo.stop(&mut self.driver) {
                    warn!("{}: stop failed: {}", name, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        for name in self.sorted_servo_names() {
            if let Some(servo) = self.servos.get_mut(&name) {
                if let Err(e) = servo.disable(&mut self.driver) {
                    warn!("{}: disable failed: {}", name, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        self.enabled = false;

        match first_err {
            None => Ok(()),
            Some(e) => Err(ArmCtrlError::Servo(e)),
        }
    }

    /// Disable all servo outputs and refuse motion commands until re-enabled.
    ///
    /// Angle state is kept, so re-enabling and moving resumes from the last known angles. While
    /// disabled the servos have no holding torque and the arm may sag, which the stored angles
    /// do not track.
    pub fn disable(&mut self) -> Result<(), ArmCtrlError> {
        info!("Disabling arm");

        let mut first_err: Option<ServoError> = None;

        for name in self.sorted_servo_names() {
            if let Some(servo) = self.servos.get_mut(&name) {
                if let Err(e) = servo.stop(&mut self.driver) {
                    warn!("{}: stop failed: {}", name, e);
                    first_err.get_or_insert(e);
                }
                if let Err(e) = servo.disable(&mut self.driver) {
                    warn!("{}: disable failed: {}", name, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        self.enabled = false;

        match first_err {
            None => Ok(()),
            Some(e) => Err(ArmCtrlError::Servo(e)),
        }
    }

    /// Re-enable motion commands after a disable or emergency stop.
    pub fn enable(&mut self) {
        info!("Enabling arm");
        self.stop_token.clear();
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Move a single servo by name.
    pub fn move_servo(
        &mut self,
        name: &str,
        angle_deg: f64,
        speed_degs: Option<f64>,
        blocking: bool,
    ) -> Result<(), ArmCtrlError> {
        if !self.enabled {
            warn!("Arm is disabled, refusing move_servo");
            return Err(ArmCtrlError::Disabled);
        }

        match self.servos.get_mut(name) {
            Some(servo) => {
                servo.move_to(&mut self.driver, angle_deg, speed_degs, blocking)?;
                Ok(())
            }
            None => {
                warn!("Unknown servo: {}", name);
                Err(ArmCtrlError::UnknownServo(name.to_string()))
            }
        }
    }

    /// Get the angles of all servos, keyed by name.
    ///
    /// Continuous servos report [`ServoAngle::Estimated`] readings which are believed, never
    /// measured.
    pub fn get_current_angles(&self) -> HashMap<String, Option<ServoAngle>> {
        self.servos
            .iter()
            .map(|(n, s)| (n.clone(), s.get_angle()))
            .collect()
    }

    /// Names of all available poses, sorted.
    pub fn list_poses(&self) -> Vec<String> {
        self.poses.names()
    }

    /// Names of all servos, sorted.
    pub fn servo_names(&self) -> Vec<String> {
        self.sorted_servo_names()
    }

    /// The last pose successfully reached, if any.
    pub fn current_pose(&self) -> Option<&str> {
        self.current_pose.as_deref()
    }

    /// A clone of the arm's stop token, for supervising threads and signal handlers.
    pub fn stop_token(&self) -> StopToken {
        self.stop_token.clone()
    }

    /// Move to a pose if it exists, or send every servo to zero if it does not.
    fn pose_or_all_zero(
        &mut self,
        pose_name: &str,
        speed_degs: Option<f64>,
        blocking: bool,
    ) -> Result<(), ArmCtrlError> {
        if self.poses.get(pose_name).is_some() {
            return self.go_to_pose(pose_name, speed_degs, blocking);
        }

        let zeros: PoseAngles = self.servos.keys().map(|n| (n.clone(), 0.0)).collect();
        self.move_to_angles(&zeros, speed_degs, blocking)
    }

    fn sorted_servo_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servos.keys().cloned().collect();
        names.sort();
        names
    }

    #[cfg(test)]
    pub(crate) fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: PulseDriver> Drop for ArmCtrl<D> {
    /// Release the outputs on every exit path: stop continuous servos and disable all channels.
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            warn!("Could not disable the arm on shutdown: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Iterate a demand map in a deterministic (sorted by name) order.
fn sorted_entries(angles: &PoseAngles) -> Vec<(&String, &f64)> {
    let mut entries: Vec<_> = angles.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::servo_ctrl::test_utils::RecordingOutput;
    use crate::servo_ctrl::{ContinuousConfig, ServoConfig, ServoKindConfig};

    const SHOULDER_CH: u8 = 0;
    const ELBOW_CH: u8 = 1;
    const GRIPPER_CH: u8 = 2;

    fn position_config(channel: u8, max_angle_deg: f64) -> ServoConfig {
        ServoConfig {
            channel,
            min_angle_deg: 0.0,
            max_angle_deg,
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

    fn test_params() -> Params {
        let mut servos = HashMap::new();
        servos.insert("shoulder".to_string(), position_config(SHOULDER_CH, 180.0));
        servos.insert("gripper".to_string(), position_config(GRIPPER_CH, 90.0));
        servos.insert(
            "elbow".to_string(),
            ServoConfig {
                // A very fast rate keeps the timed runs short in tests
                kind: ServoKindConfig::Continuous(ContinuousConfig {
                    stop_pulse_us: 1500,
                    speed_pulse_range_us: 100,
                    degrees_per_second: 3600.0,
                    min_move_deg: 1.0,
                }),
                ..position_config(ELBOW_CH, 180.0)
            },
        );

        Params {
            default_speed_degs: 50.0,
            default_step_pause_s: 0.0,
            servos,
            poses_file: None,
            calibration_file: None,
        }
    }

    fn test_arm(poses: PoseTable) -> ArmCtrl<RecordingOutput> {
        ArmCtrl::new(RecordingOutput::default(), &test_params(), &CalibrationMap::new(), poses)
            .unwrap()
    }

    fn angles(entries: &[(&str, f64)]) -> PoseAngles {
        entries
            .iter()
            .map(|(n, a)| (n.to_string(), *a))
            .collect()
    }

    #[test]
    fn test_set_angles_applies_valid_entries_on_partial_failure() {
        let mut arm = test_arm(PoseTable::default());

        let result = arm.set_angles(&angles(&[("shoulder", 90.0), ("bogus", 10.0)]), true);

        match result {
            Err(ArmCtrlError::FailedDemands(failed)) => {
                assert_eq!(failed, vec!["bogus".to_string()])
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // The valid entry was still applied
        assert_eq!(arm.driver().last_pulse(SHOULDER_CH), Some(1500));
    }

    #[test]
    fn test_move_to_angles_synchronises_completion() {
        let mut arm = test_arm(PoseTable::default());

        arm.set_angles(&angles(&[("shoulder", 0.0), ("gripper", 0.0)]), true)
            .unwrap();

        // Shoulder moves 90 deg, gripper only 45, at 45 deg/s the move takes 2 s. Both servos
        // must be stepped over the same 2 s window, so both produce the same number of samples.
        arm.move_to_angles(
            &angles(&[("shoulder", 90.0), ("gripper", 45.0)]),
            Some(45.0),
            false,
        )
        .unwrap();

        let shoulder_pulses = arm.driver().pulses(SHOULDER_CH);
        let gripper_pulses = arm.driver().pulses(GRIPPER_CH);

        assert_eq!(shoulder_pulses.len(), 1 + 21);
        assert_eq!(gripper_pulses.len(), 1 + 21);

        let angles_now = arm.get_current_angles();
        assert_eq!(
            angles_now["shoulder"],
            Some(ServoAngle::Commanded(90.0))
        );
        assert_eq!(angles_now["gripper"], Some(ServoAngle::Commanded(45.0)));
    }

    #[test]
    fn test_move_with_unknown_current_is_immediate() {
        let mut arm = test_arm(PoseTable::default());

        arm.move_to_angles(&angles(&[("shoulder", 90.0)]), Some(50.0), false)
            .unwrap();

        // No smoothing steps without a known starting angle
        assert_eq!(arm.driver().pulses(SHOULDER_CH), vec![1500]);
    }

    #[test]
    fn test_unknown_servo_is_partial_failure() {
        let mut arm = test_arm(PoseTable::default());

        let result = arm.move_to_angles(
            &angles(&[("shoulder", 90.0), ("bogus", 45.0)]),
            None,
            false,
        );

        assert!(matches!(result, Err(ArmCtrlError::FailedDemands(_))));
        assert_eq!(arm.driver().last_pulse(SHOULDER_CH), Some(1500));
    }

    #[test]
    fn test_continuous_servo_moves_after_positional() {
        let mut arm = test_arm(PoseTable::default());

        arm.move_to_angles(&angles(&[("elbow", 45.0)]), None, true)
            .unwrap();

        assert_eq!(arm.driver().pulses(ELBOW_CH), vec![1600, 1500]);
        assert_eq!(
            arm.get_current_angles()["elbow"],
            Some(ServoAngle::Estimated(45.0))
        );
    }

    #[test]
    fn test_disable_refuses_motion_until_enabled() {
        let mut arm = test_arm(PoseTable::default());

        arm.disable().unwrap();
        let cmds_after_disable = arm.driver().cmds.len();

        assert!(matches!(
            arm.move_to_angles(&angles(&[("shoulder", 90.0)]), None, false),
            Err(ArmCtrlError::Disabled)
        ));
        assert!(matches!(
            arm.set_angles(&angles(&[("shoulder", 90.0)]), true),
            Err(ArmCtrlError::Disabled)
        ));

        // No pulses were issued while disabled
        assert_eq!(arm.driver().cmds.len(), cmds_after_disable);

        arm.enable();
        arm.move_to_angles(&angles(&[("shoulder", 90.0)]), None, false)
            .unwrap();
        assert_eq!(arm.driver().last_pulse(SHOULDER_CH), Some(1500));
    }

    #[test]
    fn test_go_to_pose_records_current_pose() {
        let mut poses = HashMap::new();
        poses.insert("ready".to_string(), angles(&[("shoulder", 90.0)]));
        let mut arm = test_arm(PoseTable::from_map(poses));

        arm.go_to_pose("ready", None, false).unwrap();

        assert_eq!(arm.current_pose(), Some("ready"));
        assert_eq!(arm.driver().last_pulse(SHOULDER_CH), Some(1500));
    }

    #[test]
    fn test_unknown_pose_is_refused_without_motion() {
        let mut arm = test_arm(PoseTable::default());

        assert!(matches!(
            arm.go_to_pose("grab", None, false),
            Err(ArmCtrlError::UnknownPose(_))
        ));
        assert!(arm.driver().cmds.is_empty());
        assert_eq!(arm.current_pose(), None);
    }

    #[test]
    fn test_home_falls_back_to_all_zero() {
        let mut arm = test_arm(PoseTable::default());

        arm.home(None, false).unwrap();

        // Positional servos go to their zero pulse, the continuous elbow is already at its
        // estimated zero so no run is driven
        assert_eq!(arm.driver().last_pulse(SHOULDER_CH), Some(500));
        assert_eq!(arm.driver().last_pulse(GRIPPER_CH), Some(500));
        assert!(arm.driver().pulses(ELBOW_CH).is_empty());
    }

    #[test]
    fn test_execute_sequence_fails_fast_with_step_index() {
        let mut poses = HashMap::new();
        poses.insert("ready".to_string(), angles(&[("shoulder", 90.0)]));
        poses.insert("rest".to_string(), angles(&[("shoulder", 0.0)]));
        let mut arm = test_arm(PoseTable::from_map(poses));

        let steps = vec![
            SequenceStep {
                pose: "ready".to_string(),
                speed_degs: None,
                pause_s: Some(0.0),
            },
            SequenceStep {
                pose: "missing".to_string(),
                speed_degs: None,
                pause_s: Some(0.0),
            },
            SequenceStep {
                pose: "rest".to_string(),
                speed_degs: None,
                pause_s: Some(0.0),
            },
        ];

        match arm.execute_sequence(&steps, Some(0.0)) {
            Err(ArmCtrlError::SequenceFailed { step, pose, .. }) => {
                assert_eq!(step, 2);
                assert_eq!(pose, "missing");
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }

        // Step 1 ran, step 3 never did: the shoulder is still at the ready angle
        assert_eq!(arm.driver().last_pulse(SHOULDER_CH), Some(1500));
    }

    #[test]
    fn test_emergency_stop_stops_and_disables_everything() {
        let mut arm = test_arm(PoseTable::default());

        arm.emergency_stop().unwrap();

        // The continuous elbow got its stop pulse, then every channel was disabled
        assert_eq!(arm.driver().pulses(ELBOW_CH), vec![1500]);
        for channel in &[SHOULDER_CH, ELBOW_CH, GRIPPER_CH] {
            assert!(arm.driver().is_disabled(*channel));
        }

        assert!(!arm.is_enabled());
        assert!(matches!(
            arm.move_to_angles(&angles(&[("shoulder", 90.0)]), None, false),
            Err(ArmCtrlError::Disabled)
        ));

        // Explicit re-enable re-arms the stop token and accepts commands again
        arm.enable();
        arm.move_to_angles(&angles(&[("shoulder", 90.0)]), None, false)
            .unwrap();
    }

    #[test]
    fn test_tripped_token_interrupts_group_move() {
        let mut arm = test_arm(PoseTable::default());

        arm.stop_token().trip();

        let result = arm.move_to_angles(&angles(&[("elbow", 45.0)]), None, true);

        assert!(matches!(result, Err(ArmCtrlError::Interrupted)));
        // The run was never started
        assert!(arm.driver().pulses(ELBOW_CH).is_empty());
    }

    #[test]
    fn test_calibration_overlay_is_applied() {
        let mut calib = CalibrationMap::new();
        calib.insert(
            "shoulder".to_string(),
            crate::calib::ServoCalibration {
                min_pulse_us: Some(1000),
                max_pulse_us: Some(2000),
                offset_deg: None,
                invert: None,
            },
        );

        let mut arm = ArmCtrl::new(
            RecordingOutput::default(),
            &test_params(),
            &calib,
            PoseTable::default(),
        )
        .unwrap();

        arm.set_angles(&angles(&[("shoulder", 90.0)]), true).unwrap();
        assert_eq!(arm.driver().last_pulse(SHOULDER_CH), Some(1500));

        arm.set_angles(&angles(&[("shoulder", 0.0)]), true).unwrap();
        assert_eq!(arm.driver().last_pulse(SHOULDER_CH), Some(1000));
    }

    #[test]
    fn test_bad_config_fails_construction() {
        let mut params = test_params();
        params
            .servos
            .get_mut("shoulder")
            .unwrap()
            .channel = 42;

        let result = ArmCtrl::new(
            RecordingOutput::default(),
            &params,
            &CalibrationMap::new(),
            PoseTable::default(),
        );

        assert!(matches!(
            result.err(),
            Some(ArmCtrlError::BadServoConfig(name, _)) if name == "shoulder"
        ));
    }
}
