//! # Positional Servo Calibration Executable
//!
//! Interactive wizard which finds the real pulse widths for each positional servo instead of
//! assuming the 500-2500 us defaults fit every unit. The measured limits are written to the
//! calibration overlay, which the arm applies over the parameter file at startup.
//!
//! Run this with the servos powered and free to move. Each servo is driven to a series of
//! candidate pulse widths and you confirm what you see.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::info;
use std::io::Write as IoWrite;

// Internal
use arm_lib::calib::{self, ServoCalibration};
use arm_lib::params::ArmExecParams;
use arm_lib::servo_ctrl::{PulseDriver, ServoKindConfig};
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

/// Candidate pulse widths tried when hunting for the minimum position.
///
/// Units: microseconds
const MIN_CANDIDATES: &[u32] = &[1000, 800, 600, 500];

/// Candidate pulse widths tried when hunting for the maximum position.
///
/// Units: microseconds
const MAX_CANDIDATES: &[u32] = &[2000, 2200, 2400, 2500];

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    let session =
        Session::new("calibrate_servos", "sessions").wrap_err("Failed to create the session")?;
    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    info!("Positional Servo Calibration\n");

    // ---- LOAD PARAMETERS ----

    let params: ArmExecParams = util::params::load("arm_exec.toml")?;
    let root = host::get_deimos_sw_root().wrap_err("Cannot find the software root")?;

    let calib_path = root.join(
        params
            .arm
            .calibration_file
            .as_deref()
            .unwrap_or("data/calibration/servo_calib.json"),
    );

    // ---- CALIBRATION ----

    let mut driver = open_driver(&params)?;

    // Start from the existing overlay so re-running only replaces what is re-measured
    let mut overlay = calib::load(&calib_path);

    let mut names: Vec<&String> = params.arm.servos.keys().collect();
    names.sort();

    for name in names {
        let config = &params.arm.servos[name];

        // Continuous servos have no end stops to find, they get their own wizard
        if let ServoKindConfig::Continuous(_) = config.kind {
            info!("Skipping {} (continuous rotation servo)", name);
            continue;
        }

        println!("\n============================================================");
        println!("CALIBRATING: {} (channel {})", name, config.channel);
        println!("============================================================");

        let cal = calibrate_channel(&mut driver, config.channel)?;
        println!(
            "{}: min pulse {} us, max pulse {} us",
            name,
            cal.min_pulse_us.unwrap_or(0),
            cal.max_pulse_us.unwrap_or(0)
        );

        overlay.insert(name.clone(), cal);

        driver.disable_channel(config.channel)?;
    }

    // ---- SAVE ----

    calib::save(&calib_path, &overlay).wrap_err("Failed to save the calibration overlay")?;
    println!("\nCalibration saved to {:?}", calib_path);

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Walk one channel through the candidate pulses and record what the user confirms.
fn calibrate_channel<D: PulseDriver>(driver: &mut D, channel: u8) -> Result<ServoCalibration> {
    println!("\n1. Testing CENTER position (1500 us)...");
    driver.set_pulse_width_us(channel, 1500)?;
    ask("Does the servo move to a middle position? Press Enter...");

    println!("\n2. Finding MINIMUM position...");
    let min_pulse = hunt(driver, channel, MIN_CANDIDATES, "minimum")?;

    println!("\n3. Finding MAXIMUM position...");
    let max_pulse = hunt(driver, channel, MAX_CANDIDATES, "maximum")?;

    // Sweep the range so the user can check nothing binds
    println!("\n4. Sweeping {} us -> {} us...", min_pulse, max_pulse);
    driver.set_pulse_width_us(channel, min_pulse)?;
    std::thread::sleep(std::time::Duration::from_millis(500));
    driver.set_pulse_width_us(channel, max_pulse)?;
    ask("Did the servo sweep cleanly? Press Enter...");

    Ok(ServoCalibration {
        min_pulse_us: Some(min_pulse),
        max_pulse_us: Some(max_pulse),
        offset_deg: None,
        invert: None,
    })
}

/// Try each candidate pulse until the user confirms the end position, or enters one manually.
fn hunt<D: PulseDriver>(
    driver: &mut D,
    channel: u8,
    candidates: &[u32],
    position: &str,
) -> Result<u32> {
    for &pulse in candidates {
        driver.set_pulse_width_us(channel, pulse)?;
        std::thread::sleep(std::time::Duration::from_millis(500));

        let response = ask(&format!(
            "  Pulse {} us - did it reach the {}? (y/n/skip): ",
            pulse, position
        ));

        match response.as_str() {
            "y" => return Ok(pulse),
            "skip" => break,
            _ => continue,
        }
    }

    loop {
        let manual = ask(&format!("  Enter the {} pulse width manually: ", position));
        match manual.parse() {
            Ok(p) => return Ok(p),
            Err(_) => println!("  Not a pulse width: {:?}", manual),
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
