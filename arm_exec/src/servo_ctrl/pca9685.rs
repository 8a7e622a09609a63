//! [`PulseDriver`] implementation for the PCA9685 driver
//!
//! The PCA9685 is a 16 channel, 12 bit PWM controller on the I2C bus. This wrapper programs the
//! board for servo output at a fixed update frequency and converts pulse widths in microseconds
//! into counter ticks for the register level driver.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::{debug, info};
use pwm_pca9685::{Channel, Pca9685, SlaveAddr};

use super::{PulseDriver, ServoError, MAX_PULSE_WIDTH_US};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of counter ticks in one PWM period (12 bit resolution).
const MAX_PWM: u16 = 4096;

/// The PCA9685's internal oscillator frequency.
///
/// Units: hertz
const OSC_CLOCK_HZ: f64 = 25_000_000.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A PCA9685 driver board configured for servo output.
pub struct Pca9685Output<I2C> {
    pwm: Pca9685<I2C>,

    /// PWM update frequency the board is programmed to.
    ///
    /// Units: hertz
    frequency_hz: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> Pca9685Output<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    /// Initialise the board at the given address and update frequency (typically 50 Hz for
    /// servos).
    pub fn new(i2c: I2C, address: u8, frequency_hz: f64) -> Result<Self, ServoError> {
        let mut pwm = Pca9685::new(i2c, slave_addr(address));

        let prescale = prescale_for(frequency_hz);

        if let Err(e) = pwm.set_prescale(prescale) {
            return Err(bus_error(e));
        }
        if let Err(e) = pwm.enable() {
            return Err(bus_error(e));
        }

        info!(
            "PCA9685 initialised at address 0x{:02X} ({} Hz, prescale {})",
            address, frequency_hz, prescale
        );

        Ok(Self { pwm, frequency_hz })
    }
}

impl<I2C, E> PulseDriver for Pca9685Output<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    fn set_pulse_width_us(&mut self, channel: u8, pulse_width_us: u32) -> Result<(), ServoError> {
        if pulse_width_us > MAX_PULSE_WIDTH_US {
            return Err(ServoError::InvalidPulseWidth(pulse_width_us));
        }

        let channel = channel_from_index(channel)?;
        let ticks = pulse_width_to_ticks(self.frequency_hz, pulse_width_us);

        debug!(
            "channel {:?}: {} us -> {} ticks @ {} Hz",
            channel, pulse_width_us, ticks, self.frequency_hz
        );

        match self.pwm.set_channel_on_off(channel, 0, ticks) {
            Ok(_) => Ok(()),
            Err(pwm_pca9685::Error::I2C(_)) => Err(ServoError::I2c),
            Err(pwm_pca9685::Error::InvalidInputData) => {
                Err(ServoError::InvalidPulseWidth(pulse_width_us))
            }
        }
    }

    fn disable_channel(&mut self, channel: u8) -> Result<(), ServoError> {
        let channel = channel_from_index(channel)?;

        match self.pwm.set_channel_full_off(channel) {
            Ok(_) => Ok(()),
            Err(pwm_pca9685::Error::I2C(_)) => Err(ServoError::I2c),
            Err(pwm_pca9685::Error::InvalidInputData) => Err(ServoError::I2c),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the driver's slave address from a 7 bit bus address.
///
/// The board's fixed address prefix is `0b100_0000`, the low six bits come from the address
/// jumpers.
fn slave_addr(address: u8) -> SlaveAddr {
    if address == 0x40 {
        SlaveAddr::default()
    } else {
        let bits = address & 0x3F;
        SlaveAddr::Alternative(
            bits & 0b100000 != 0,
            bits & 0b010000 != 0,
            bits & 0b001000 != 0,
            bits & 0b000100 != 0,
            bits & 0b000010 != 0,
            bits & 0b000001 != 0,
        )
    }
}

/// Calculate the prescale register value for a PWM update frequency.
///
/// `prescale = round(osc_clock / (4096 * freq)) - 1`, clamped to the datasheet's 3-255 limits.
fn prescale_for(frequency_hz: f64) -> u8 {
    let prescale = (OSC_CLOCK_HZ / (MAX_PWM as f64 * frequency_hz) - 1.0).round();
    prescale.max(3.0).min(255.0) as u8
}

/// Convert a pulse width into counter ticks at the given update frequency.
fn pulse_width_to_ticks(frequency_hz: f64, pulse_width_us: u32) -> u16 {
    let period_us = 1_000_000.0 / frequency_hz;
    let ticks = (pulse_width_us as f64 * MAX_PWM as f64 / period_us).round();
    ticks.max(0.0).min((MAX_PWM - 1) as f64) as u16
}

/// Map a channel index onto the driver's channel type.
fn channel_from_index(index: u8) -> Result<Channel, ServoError> {
    Ok(match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return Err(ServoError::InvalidChannel(index)),
    })
}

/// Map any register driver error onto the servo error type. Used during initialisation where the
/// input values are already validated, so any failure is a bus failure.
fn bus_error<E>(_: pwm_pca9685::Error<E>) -> ServoError {
    ServoError::I2c
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prescale_for_servo_frequency() {
        // The datasheet example value for ~50 Hz
        assert_eq!(prescale_for(50.0), 121);

        // Clamped at the datasheet limits
        assert_eq!(prescale_for(10000.0), 3);
        assert_eq!(prescale_for(1.0), 255);
    }

    #[test]
    fn test_pulse_width_to_ticks_at_50_hz() {
        // 20 ms period, so 4096 ticks cover 20000 us
        assert_eq!(pulse_width_to_ticks(50.0, 0), 0);
        assert_eq!(pulse_width_to_ticks(50.0, 1500), 307);
        assert_eq!(pulse_width_to_ticks(50.0, 2500), 512);

        // Saturates at the top of the counter
        assert_eq!(pulse_width_to_ticks(50.0, 30000), 4095);
    }

    #[test]
    fn test_channel_from_index() {
        assert!(matches!(channel_from_index(0), Ok(Channel::C0)));
        assert!(matches!(channel_from_index(15), Ok(Channel::C15)));
        assert!(matches!(
            channel_from_index(16),
            Err(ServoError::InvalidChannel(16))
        ));
    }
}
