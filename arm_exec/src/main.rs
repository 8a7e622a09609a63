//! # Arm Control Executable
//!
//! This executable is responsible for controlling the robot arm's servos through the PCA9685
//! driver board. On startup it homes the arm, then either executes a sequence script given as
//! the first command line argument or reports the arm's status.
//!
//! On targets other than the Raspberry Pi the pulse output is simulated, so the executable can
//! be run anywhere.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};

// Internal
use arm_lib::arm_ctrl::{ArmCtrl, PoseTable, Sequence};
use arm_lib::calib::{self, CalibrationMap};
use arm_lib::params::ArmExecParams;
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

    // Initialise session
    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Arm Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: ArmExecParams = util::params::load("arm_exec.toml")?;

    info!("Parameters loaded");

    // ---- LOAD DATA ----

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

    // Ctrl-C trips the stop token, so an in-flight move is abandoned (and the servos stopped)
    // before the process exits
    let stop = arm.stop_token();
    ctrlc::set_handler(move || {
        warn!("Ctrl-C recieved, stopping motion");
        stop.trip();
    })
    .wrap_err("Failed to set the ctrl-c handler")?;

    info!("Initialisation complete");

    // ---- RUN ----

    arm.home(None, true).wrap_err("Failed to home the arm")?;

    match std::env::args().nth(1) {
        Some(script_path) => {
            let sequence =
                Sequence::new(&script_path).wrap_err("Failed to load the sequence script")?;

            info!(
                "Executing sequence {} ({} steps)",
                script_path,
                sequence.num_steps()
            );

            arm.execute_sequence(sequence.steps(), None)
                .wrap_err("Sequence failed")?;

            arm.neutral(None, true)
                .wrap_err("Failed to return the arm to neutral")?;
        }
        None => {
            info!("No sequence script given, reporting status");

            let angles = arm.get_current_angles();
            for name in arm.servo_names() {
                info!("    {}: {:?}", name, angles[&name]);
            }
            info!("Available poses: {:?}", arm.list_poses());
        }
    }

    // The arm also disables itself when dropped, this just surfaces any failure
    info!("Done, disabling arm");
    arm.disable().wrap_err("Failed to disable the arm")?;

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

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
