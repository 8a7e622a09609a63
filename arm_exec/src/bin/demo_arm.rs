//! # Arm Demonstration Executable
//!
//! Runs through the arm's capabilities: homing, coordinated moves, gripper control and a short
//! pose sequence. Useful as a smoke test after wiring or calibration changes. Runs against the
//! simulated output on non-Pi hosts.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};

// Internal
use arm_lib::arm_ctrl::{ArmCtrl, ArmCtrlError, PoseAngles, PoseTable, SequenceStep};
use arm_lib::calib::{self, CalibrationMap};
use arm_lib::params::ArmExecParams;
use arm_lib::servo_ctrl::PulseDriver;
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

#[cfg(target_arch = "arm")]
use arm_lib::servo_ctrl::pca9685::Pca9685Output;
#[cfg(not(target_arch = "arm"))]
use arm_lib::servo_ctrl::sim::SimPulseOutput;

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    let session = Session::new("demo_arm", "sessions").wrap_err("Failed to create the session")?;
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Arm Demonstration\n");

    // ---- LOAD PARAMETERS ----

    let params: ArmExecParams = util::params::load("arm_exec.toml")?;
    let root = host::get_deimos_sw_root().wrap_err("Cannot find the software root")?;

    let calib = match &params.arm.calibration_file {
        Some(path) => calib::load(root.join(path)),
        None => CalibrationMap::new(),
    };
    let poses = match &params.arm.poses_file {
        Some(path) => PoseTable::load(root.join(path)),
        None => PoseTable::default(),
    };

    // ---- ARM INITIALISATION ----

    let driver = open_driver(&params)?;
    let mut arm =
        ArmCtrl::new(driver, &params.arm, &calib, poses).wrap_err("Failed to initialise the arm")?;

    let stop = arm.stop_token();
    ctrlc::set_handler(move || {
        warn!("Ctrl-C recieved, stopping motion");
        stop.trip();
    })
    .wrap_err("Failed to set the ctrl-c handler")?;

    // ---- DEMOS ----

    demo_basic_movement(&mut arm).wrap_err("Basic movement demo failed")?;
    demo_gripper(&mut arm).wrap_err("Gripper demo failed")?;
    demo_sequence(&mut arm).wrap_err("Sequence demo failed")?;

    info!("Demo complete, returning to neutral");
    arm.neutral(Some(40.0), true)
        .wrap_err("Failed to return the arm to neutral")?;

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// DEMOS
// ------------------------------------------------------------------------------------------------

/// Home the arm and run a few coordinated moves.
fn demo_basic_movement<D: PulseDriver>(arm: &mut ArmCtrl<D>) -> Result<(), ArmCtrlError> {
    info!("=== DEMO: basic movement ===");

    arm.home(Some(50.0), true)?;

    arm.move_to_angles(&pose(&[("shoulder", 135.0)]), Some(40.0), true)?;
    arm.move_to_angles(&pose(&[("shoulder", 90.0), ("elbow", 45.0)]), Some(40.0), true)?;
    arm.move_to_angles(&pose(&[("shoulder", 0.0), ("elbow", 0.0)]), Some(60.0), true)?;

    Ok(())
}

/// Open, close and partially close the gripper.
fn demo_gripper<D: PulseDriver>(arm: &mut ArmCtrl<D>) -> Result<(), ArmCtrlError> {
    info!("=== DEMO: gripper control ===");

    arm.move_to_angles(&pose(&[("gripper", 90.0)]), Some(30.0), true)?;
    arm.move_to_angles(&pose(&[("gripper", 0.0)]), Some(30.0), true)?;
    arm.move_to_angles(&pose(&[("gripper", 45.0)]), Some(30.0), true)?;
    arm.move_to_angles(&pose(&[("gripper", 0.0)]), Some(30.0), true)?;

    Ok(())
}

/// Run the first few loaded poses as a sequence.
fn demo_sequence<D: PulseDriver>(arm: &mut ArmCtrl<D>) -> Result<(), ArmCtrlError> {
    info!("=== DEMO: pose sequence ===");

    let poses = arm.list_poses();
    if poses.is_empty() {
        warn!("No poses loaded, skipping the sequence demo");
        return Ok(());
    }

    let steps: Vec<SequenceStep> = poses
        .iter()
        .take(3)
        .map(|name| SequenceStep {
            pose: name.clone(),
            speed_degs: Some(40.0),
            pause_s: Some(0.5),
        })
        .collect();

    arm.execute_sequence(&steps, None)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build a demand map from name/angle pairs.
fn pose(entries: &[(&str, f64)]) -> PoseAngles {
    entries.iter().map(|(n, a)| (n.to_string(), *a)).collect()
}

/// Open the pulse driver: the PCA9685 over the Pi's I2C bus on target, simulated elsewhere.
#[cfg(target_arch = "arm")]
fn open_driver(params: &ArmExecParams) -> Result<Pca9685Output<rppal::i2c::I2c>> {
    let i2c =
        rppal::i2c::I2c::with_bus(params.pwm.i2c_bus).wrap_err("Failed to open the I2C bus")?;

    Pca9685Output::new(i2c, params.pwm.i2c_address, params.pwm.frequency_hz)
        .wrap_err("Failed to initialise the PCA9685")
}

/// Open the pulse driver: the PCA9685 over the Pi's I2C bus on target, simulated elsewhere.
#[cfg(not(target_arch = "arm"))]
fn open_driver(_params: &ArmExecParams) -> Result<SimPulseOutput> {
    Ok(SimPulseOutput::new())
}
