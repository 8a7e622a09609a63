//! # Continuous Servo Calibration Executable
//!
//! Interactive wizard for continuous rotation servos. It finds the exact stop pulse (the pulse
//! width at which the servo does not rotate, usually near 1500 us but varying unit to unit) and
//! measures the rotation rate at full drive deviation.
//!
//! The results are printed as parameter file values: unlike the positional limits these live in
//! the servo's `kind.continuous` table, not in the calibration overlay.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::info;
use std::io::Write as IoWrite;
use std::time::Duration;

// Internal
use arm_lib::params::ArmExecParams;
use arm_lib::servo_ctrl::{ContinuousConfig, PulseDriver, ServoKindConfig};
use util::{
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

/// Stop pulse candidates, tried in order.
///
/// Units: microseconds
const STOP_CANDIDATES: &[u32] = &[1500, 1480, 1520, 1460, 1540, 1440, 1560];

/// How long the rate measurement drives the servo for.
///
/// Units: seconds
const RATE_DRIVE_TIME_S: f64 = 2.0;

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    let session = Session::new("calibrate_continuous", "sessions")
        .wrap_err("Failed to create the session")?;
    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    info!("Continuous Servo Calibration\n");

    // ---- LOAD PARAMETERS ----

    let params: ArmExecParams = util::params::load("arm_exec.toml")?;

    // ---- CALIBRATION ----

    let mut driver = open_driver(&params)?;

    let mut names: Vec<&String> = params.arm.servos.keys().collect();
    names.sort();

    let mut calibrated_any = false;

    for name in names {
        let config = &params.arm.servos[name];

        let continuous = match &config.kind {
            ServoKindConfig::Continuous(c) => c,
            ServoKindConfig::Position => continue,
        };

        calibrated_any = true;

        println!("\n============================================================");
        println!("CALIBRATING: {} (channel {})", name, config.channel);
        println!("============================================================");
        println!("\nMAKE SURE:");
        println!("  - The servo is connected to channel {}", config.channel);
        println!("  - The servo has room to spin");
        println!("  - External servo power is connected");
        ask("\nPress Enter to start...");

        let stop_pulse = find_stop_pulse(&mut driver, config.channel)?;
        let rate = measure_rate(&mut driver, config.channel, stop_pulse, continuous)?;

        driver.disable_channel(config.channel)?;

        println!("\nMeasured values for {}, update the parameter file:", name);
        println!("    [arm.servos.{}.kind.continuous]", name);
        println!("    stop_pulse_us = {}", stop_pulse);
        println!("    degrees_per_second = {:.1}", rate);
    }

    if !calibrated_any {
        println!("No continuous rotation servos are configured, nothing to calibrate");
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Step through candidate pulses until the user confirms the servo is stationary.
fn find_stop_pulse<D: PulseDriver>(driver: &mut D, channel: u8) -> Result<u32> {
    println!("\nSTEP 1: find the STOP pulse");

    for &pulse in STOP_CANDIDATES {
        driver.set_pulse_width_us(channel, pulse)?;
        std::thread::sleep(Duration::from_millis(1500));

        let response = ask(&format!(
            "  Pulse {} us - is the servo stopped? (y/n/skip): ",
            pulse
        ));

        match response.as_str() {
            "y" => return Ok(pulse),
            "skip" => break,
            _ => continue,
        }
    }

    loop {
        let manual = ask("  Enter the stop pulse width manually: ");
        match manual.parse() {
            Ok(p) => return Ok(p),
            Err(_) => println!("  Not a pulse width: {:?}", manual),
        }
    }
}

/// Drive the servo at full deviation for a fixed time and derive the rotation rate from how far
/// the user saw it move.
fn measure_rate<D: PulseDriver>(
    driver: &mut D,
    channel: u8,
    stop_pulse: u32,
    continuous: &ContinuousConfig,
) -> Result<f64> {
    println!("\nSTEP 2: measure the rotation rate");
    println!(
        "The servo will be driven at full speed for {} s. Mark its starting position.",
        RATE_DRIVE_TIME_S
    );
    ask("Press Enter when ready...");

    driver.set_pulse_width_us(channel, stop_pulse + continuous.speed_pulse_range_us)?;
    std::thread::sleep(Duration::from_secs_f64(RATE_DRIVE_TIME_S));
    driver.set_pulse_width_us(channel, stop_pulse)?;

    loop {
        let response = ask("How many degrees did it rotate? ");
        match response.parse::<f64>() {
            Ok(deg) if deg > 0.0 => return Ok(deg / RATE_DRIVE_TIME_S),
            _ => println!("  Enter a positive number of degrees"),
        }
    }
}

/// Prompt on stdout and read one trimmed line from stdin.
fn ask(prompt: &str) -> String {
    print!("{}", prompt);
    std::io::stdout().flush().ok();

    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok();
    line.trim().to_lowercase()
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
