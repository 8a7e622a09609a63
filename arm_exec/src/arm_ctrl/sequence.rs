//! # Arm sequence script module
//!
//! This module provides a parser for arm sequence scripts, allowing choreographed series of
//! poses to be executed from a file.
//!
//! A script contains one step per line, terminated by a semicolon. The first field is the pose
//! name, the optional second field a speed override in degrees/second, the optional third a
//! pause in seconds after the step completes. Lines starting with `#` are comments.
//!
//! ```text
//! # wave the gripper about
//! ready;
//! wave_left : 80;
//! wave_right : 80 : 0.2;
//! home : 40 : 1.0;
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single step of a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceStep {
    /// Name of the pose to move to.
    pub pose: String,

    /// Speed override, `None` to use the arm's default speed.
    ///
    /// Units: degrees/second
    pub speed_degs: Option<f64>,

    /// Pause after the step completes, `None` for the arm's default pause.
    ///
    /// Units: seconds
    pub pause_s: Option<f64>,
}

/// A parsed sequence script.
///
/// After initialising with the path to the script use `.steps` to acquire the steps to feed to
/// the arm.
pub struct Sequence {
    _script_path: Option<PathBuf>,
    steps: Vec<SequenceStep>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("Could not find the script at {0}")]
    ScriptNotFound(String),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error("Script contains an invalid speed: {0:?}")]
    InvalidSpeed(String),

    #[error("Script contains an invalid pause: {0:?}")]
    InvalidPause(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Sequence {
    /// Create a new sequence from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, SequenceError> {
        // Get the path in a buffer
        let path = PathBuf::from(script_path.as_ref());

        // Check that the script file exists.
        if !path.exists() {
            return Err(SequenceError::ScriptNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        // Load the script into a string
        let script = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => return Err(SequenceError::ScriptLoadError(e)),
        };

        let steps = parse_script(&script)?;

        Ok(Sequence {
            _script_path: Some(path),
            steps,
        })
    }

    /// Create a sequence from script text rather than a file.
    pub fn from_text(script: &str) -> Result<Self, SequenceError> {
        Ok(Sequence {
            _script_path: None,
            steps: parse_script(script)?,
        })
    }

    /// The steps of the sequence, in execution order.
    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    /// Get the number of steps in the sequence
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse script text into an ordered list of steps.
fn parse_script(script: &str) -> Result<Vec<SequenceStep>, SequenceError> {
    let mut steps = vec![];

    // Each line is `pose [: speed [: pause]];`, comments start with `#`
    let re = RegexBuilder::new(r"^\s*([A-Za-z0-9_]+)\s*(?::\s*([^:;]+?)\s*)?(?::\s*([^:;]+?)\s*)?;")
        .multi_line(true)
        .build()
        .unwrap();

    for cap in re.captures_iter(script) {
        let pose = cap.get(1).unwrap().as_str().to_string();

        let speed_degs = match cap.get(2) {
            Some(m) => match m.as_str().parse::<f64>() {
                Ok(s) => Some(s),
                Err(_) => return Err(SequenceError::InvalidSpeed(m.as_str().to_string())),
            },
            None => None,
        };

        let pause_s = match cap.get(3) {
            Some(m) => match m.as_str().parse::<f64>() {
                Ok(p) => Some(p),
                Err(_) => return Err(SequenceError::InvalidPause(m.as_str().to_string())),
            },
            None => None,
        };

        steps.push(SequenceStep {
            pose,
            speed_degs,
            pause_s,
        });
    }

    if steps.is_empty() {
        return Err(SequenceError::ScriptEmpty);
    }

    Ok(steps)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
