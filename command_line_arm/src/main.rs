//! # Command Line Arm
//!
//! Interactive shell which issues commands directly to the arm: single servo moves, poses,
//! sequences and the safety commands. Runs against the simulated output on non-Pi hosts, which
//! makes it the quickest way to poke at pose data without hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use clap::{App, AppSettings, Arg, ArgMatches};
use color_eyre::{eyre::WrapErr, Result};
use log::warn;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

// Internal
use arm_lib::arm_ctrl::{ArmCtrl, PoseAngles, PoseTable, Sequence};
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
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "Deimos $ ";

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    let session =
        Session::new("command_line_arm", "sessions").wrap_err("Failed to create the session")?;
    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

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

    // Ctrl-C during a blocking move trips the stop token, so the shell gets control back instead
    // of the process dying mid-run
    let stop = arm.stop_token();
    ctrlc::set_handler(move || {
        warn!("Ctrl-C recieved, stopping motion");
        stop.trip();
    })
    .wrap_err("Failed to set the ctrl-c handler")?;

    // ---- SHELL ----

    let mut rl = DefaultEditor::new()?;

    println!("Type 'help' for the command list, 'quit' to exit");

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());

                if matches!(line.trim(), "quit" | "exit") {
                    break;
                }

                parse(&line, &mut arm);
            }
            Err(ReadlineError::Interrupted) => {
                // The handler has tripped the stop token, re-arm for the next command
                arm.stop_token().clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Unhandled error: {:?}", err);
                break;
            }
        }
    }

    println!("Exiting, the arm will be disabled");

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// COMMAND PARSING
// ------------------------------------------------------------------------------------------------

fn parse<D: PulseDriver>(line: &str, arm: &mut ArmCtrl<D>) {
    let command_parser = App::new("arm")
        .setting(AppSettings::NoBinaryName)
        .setting(AppSettings::DisableVersionFlag)
        .subcommand(App::new("status").about("show servo angles and arm state"))
        .subcommand(App::new("poses").about("list available poses"))
        .subcommand(
            App::new("set")
                .about("set a servo angle immediately")
                .arg(Arg::new("servo").required(true).takes_value(true))
                .arg(Arg::new("angle").required(true).takes_value(true)),
        )
        .subcommand(
            App::new("move")
                .about("move a servo, optionally at a speed in deg/s")
                .arg(Arg::new("servo").required(true).takes_value(true))
                .arg(Arg::new("angle").required(true).takes_value(true))
                .arg(Arg::new("speed").short('s').takes_value(true)),
        )
        .subcommand(
            App::new("pose")
                .about("move the whole arm to a named pose")
                .arg(Arg::new("name").required(true).takes_value(true))
                .arg(Arg::new("speed").short('s').takes_value(true)),
        )
        .subcommand(
            App::new("seq")
                .about("execute a sequence script")
                .arg(Arg::new("path").required(true).takes_value(true)),
        )
        .subcommand(App::new("home").about("move to the home pose"))
        .subcommand(App::new("neutral").about("move to the neutral pose"))
        .subcommand(App::new("estop").about("emergency stop, disables the arm"))
        .subcommand(App::new("enable").about("re-enable the arm"))
        .subcommand(App::new("disable").about("disable all servo outputs"));

    let split: Vec<&str> = line.split_whitespace().collect();
    if split.is_empty() {
        return;
    }

    let matches = match command_parser.try_get_matches_from(split) {
        Ok(m) => m,
        Err(e) => {
            // Also covers `help`, which clap reports as an "error" carrying the usage text
            println!("{}", e);
            return;
        }
    };

    match matches.subcommand() {
        Some(("status", _)) => cmd_status(arm),
        Some(("poses", _)) => {
            for name in arm.list_poses() {
                println!("  {}", name);
            }
        }
        Some(("set", sub_m)) => cmd_set(arm, sub_m),
        Some(("move", sub_m)) => cmd_move(arm, sub_m),
        Some(("pose", sub_m)) => {
            let name = sub_m.value_of("name").unwrap();
            report(arm.go_to_pose(name, parse_speed(sub_m), true));
        }
        Some(("seq", sub_m)) => cmd_seq(arm, sub_m),
        Some(("home", _)) => report(arm.home(None, true)),
        Some(("neutral", _)) => report(arm.neutral(None, true)),
        Some(("estop", _)) => {
            report(arm.emergency_stop());
            println!("Arm disabled, use 'enable' to re-arm");
        }
        Some(("enable", _)) => arm.enable(),
        Some(("disable", _)) => report(arm.disable()),
        _ => println!("Unknown command, try 'help'"),
    }
}

// ------------------------------------------------------------------------------------------------
// COMMAND HANDLERS
// ------------------------------------------------------------------------------------------------

fn cmd_status<D: PulseDriver>(arm: &ArmCtrl<D>) {
    println!(
        "Arm is {}",
        if arm.is_enabled() {
            "ENABLED"
        } else {
            "DISABLED"
        }
    );
    if let Some(pose) = arm.current_pose() {
        println!("Current pose: {}", pose);
    }

    let angles = arm.get_current_angles();
    for name in arm.servo_names() {
        match angles[&name] {
            Some(angle) => println!("  {}: {:?}", name, angle),
            None => println!("  {}: not yet commanded", name),
        }
    }
}

fn cmd_set<D: PulseDriver>(arm: &mut ArmCtrl<D>, sub_m: &ArgMatches) {
    let servo = sub_m.value_of("servo").unwrap();
    let angle = match parse_angle(sub_m) {
        Some(a) => a,
        None => return,
    };

    let mut angles = PoseAngles::new();
    angles.insert(servo.to_string(), angle);

    report(arm.set_angles(&angles, true));
}

fn cmd_move<D: PulseDriver>(arm: &mut ArmCtrl<D>, sub_m: &ArgMatches) {
    let servo = sub_m.value_of("servo").unwrap();
    let angle = match parse_angle(sub_m) {
        Some(a) => a,
        None => return,
    };

    report(arm.move_servo(servo, angle, parse_speed(sub_m), true));
}

fn cmd_seq<D: PulseDriver>(arm: &mut ArmCtrl<D>, sub_m: &ArgMatches) {
    let path = sub_m.value_of("path").unwrap();

    let sequence = match Sequence::new(path) {
        Ok(s) => s,
        Err(e) => {
            println!("Could not load the sequence: {}", e);
            return;
        }
    };

    report(arm.execute_sequence(sequence.steps(), None));
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn parse_angle(sub_m: &ArgMatches) -> Option<f64> {
    let raw = sub_m.value_of("angle").unwrap();
    match raw.parse() {
        Ok(a) => Some(a),
        Err(_) => {
            println!("Not an angle: {:?}", raw);
            None
        }
    }
}

fn parse_speed(sub_m: &ArgMatches) -> Option<f64> {
    match sub_m.value_of("speed") {
        Some(raw) => match raw.parse() {
            Ok(s) => Some(s),
            Err(_) => {
                println!("Not a speed: {:?}, using the default", raw);
                None
            }
        },
        None => None,
    }
}

fn report<T>(result: std::result::Result<T, arm_lib::arm_ctrl::ArmCtrlError>) {
    match result {
        Ok(_) => println!("ok"),
        Err(e) => println!("FAILED: {}", e),
    }
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
