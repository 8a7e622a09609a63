//! Pose table
//!
//! A pose is a named mapping from servo name to target angle describing a complete arm
//! configuration. Poses are loaded once at startup from a TOML table-of-tables:
//!
//! ```text
//! [ready]
//! shoulder = 90.0
//! elbow = 0.0
//! gripper = 0.0
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A set of servo target angles keyed by servo name.
///
/// Units: degrees
pub type PoseAngles = HashMap<String, f64>;

/// Lookup table of named arm poses.
///
/// Read-only after load.
#[derive(Debug, Default)]
pub struct PoseTable {
    poses: HashMap<String, PoseAngles>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseTable {
    /// Load a pose table from a TOML file.
    ///
    /// A missing or unparsable file yields an empty table with a warning. The arm remains
    /// operable through direct angle commands and the home/neutral fallbacks.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => {
                warn!("No pose table at {:?}, continuing with no poses", path);
                return Self::default();
            }
        };

        match toml::from_str::<HashMap<String, PoseAngles>>(&text) {
            Ok(poses) => {
                info!("Loaded {} poses from {:?}", poses.len(), path);
                PoseTable { poses }
            }
            Err(e) => {
                warn!("Could not parse pose table {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Build a table directly from a map of poses.
    pub fn from_map(poses: HashMap<String, PoseAngles>) -> Self {
        PoseTable { poses }
    }

    /// Look up a pose by name.
    pub fn get(&self, name: &str) -> Option<&PoseAngles> {
        self.poses.get(name)
    }

    /// Names of all known poses, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.poses.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of poses in the table.
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_pose_table() {
        let poses: HashMap<String, PoseAngles> = toml::from_str(
            r#"
            [ready]
            shoulder = 90.0
            elbow = 0.0

            [rest]
            shoulder = 0.0
            elbow = 0.0
            gripper = 0.0
            "#,
        )
        .unwrap();
        let table = PoseTable::from_map(poses);

        assert_eq!(table.len(), 2);
        assert_eq!(table.names(), vec!["ready".to_string(), "rest".to_string()]);
        assert_eq!(table.get("ready").unwrap()["shoulder"], 90.0);
        assert!(table.get("grab").is_none());
    }

    #[test]
    fn test_missing_file_yields_empty_table() {
        let table = PoseTable::load("/nonexistent/poses.toml");
        assert!(table.is_empty());
    }
}
