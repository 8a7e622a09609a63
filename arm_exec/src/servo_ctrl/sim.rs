//! [`PulseDriver`] implementation used when no driver board is connected
//!
//! Accepts the same commands as a real board, remembers the last command per channel and logs
//! everything, so the executables can run on hosts without the arm hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};

use super::{PulseDriver, ServoError, MAX_PULSE_WIDTH_US, NUM_CHANNELS};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated pulse output.
#[derive(Default)]
pub struct SimPulseOutput {
    last_pulse_us: [Option<u32>; NUM_CHANNELS as usize],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimPulseOutput {
    pub fn new() -> Self {
        warn!("Pulse output is SIMULATED, no hardware will move");
        Self::default()
    }

    /// The last pulse width commanded on a channel, `None` if the channel is disabled or has
    /// never been commanded.
    pub fn last_pulse_us(&self, channel: u8) -> Option<u32> {
        self.last_pulse_us.get(channel as usize).copied().flatten()
    }
}

impl PulseDriver for SimPulseOutput {
    fn set_pulse_width_us(&mut self, channel: u8, pulse_width_us: u32) -> Result<(), ServoError> {
        if channel >= NUM_CHANNELS {
            return Err(ServoError::InvalidChannel(channel));
        }
        if pulse_width_us > MAX_PULSE_WIDTH_US {
            return Err(ServoError::InvalidPulseWidth(pulse_width_us));
        }

        debug!("[SIM] channel {}: {} us", channel, pulse_width_us);
        self.last_pulse_us[channel as usize] = Some(pulse_width_us);

        Ok(())
    }

    fn disable_channel(&mut self, channel: u8) -> Result<(), ServoError> {
        if channel >= NUM_CHANNELS {
            return Err(ServoError::InvalidChannel(channel));
        }

        debug!("[SIM] channel {}: output disabled", channel);
        self.last_pulse_us[channel as usize] = None;

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
