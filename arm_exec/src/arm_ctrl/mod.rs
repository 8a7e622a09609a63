//! Arm control module
//!
//! Coordinates the arm's servos as a single unit: named poses, synchronised multi servo moves,
//! scripted sequences, and the safety commands (stop, disable, emergency stop).

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod pose;
mod sequence;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use pose::*;
pub use sequence::*;
pub use state::*;

use crate::servo_ctrl::{ServoConfigError, ServoError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ArmCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ArmCtrlError {
    #[error("Invalid configuration for servo {0}: {1}")]
    BadServoConfig(String, ServoConfigError),

    #[error("The arm is disabled, motion commands are refused until it is re-enabled")]
    Disabled,

    #[error("Unknown servo: {0}")]
    UnknownServo(String),

    #[error("Unknown pose: {0}")]
    UnknownPose(String),

    #[error("Demands for {0:?} failed")]
    FailedDemands(Vec<String>),

    #[error("Sequence failed at step {step} ({pose}): {source}")]
    SequenceFailed {
        /// 1-based index of the failed step.
        step: usize,
        pose: String,
        #[source]
        source: Box<ArmCtrlError>,
    },

    #[error("Motion was interrupted by a stop request")]
    Interrupted,

    #[error(transparent)]
    Servo(#[from] ServoError),
}
