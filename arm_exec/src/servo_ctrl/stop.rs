//! Stop token for interrupting in-flight timed motion
//!
//! All timed motion (smoothed position steps and continuous drive runs) is realised by blocking
//! waits on the calling thread, so an emergency stop issued on the same thread can only ever run
//! after the wait finishes. To close that gap every wait polls a shared [`StopToken`]: a
//! supervising thread (or a ctrl-c handler) holding a clone of the token can trip it, and the
//! motion thread itself ends the wait at the next poll, issues the appropriate stop output and
//! abandons the rest of the move.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Interval at which blocking waits poll for a stop request.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A shared flag used to interrupt in-flight timed motion.
///
/// Cloning the token shares the underlying flag.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StopToken {
    pub fn new() -> Self {
        StopToken(Arc::new(AtomicBool::new(false)))
    }

    /// Request that any in-flight motion stops at its next wait poll.
    pub fn trip(&self) {
        self.0.store(true, Ordering::Relaxed)
    }

    /// True if a stop has been requested.
    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Re-arm the token so that motion may be commanded again.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed)
    }

    /// Sleep for `duration`, polling for a stop request.
    ///
    /// Returns the time actually waited and whether the wait ran to completion (`false` if it was
    /// cut short by a trip).
    pub fn wait_for(&self, duration: Duration) -> (Duration, bool) {
        let start = Instant::now();

        loop {
            if self.is_tripped() {
                return (start.elapsed(), false);
            }

            let elapsed = start.elapsed();
            if elapsed >= duration {
                return (elapsed, true);
            }

            std::thread::sleep((duration - elapsed).min(STOP_POLL_INTERVAL));
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
