//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 1f64), (0f64, 100f64), 0.5f64), 50f64);
        assert_eq!(lin_map((0f64, 180f64), (500f64, 2500f64), 0f64), 500f64);
        assert_eq!(lin_map((0f64, 180f64), (500f64, 2500f64), 180f64), 2500f64);
        assert_eq!(lin_map((0f64, 180f64), (500f64, 2500f64), 90f64), 1500f64);

        // Reversed target range maps in the opposite direction
        assert_eq!(lin_map((0f64, 1f64), (1f64, 0f64), 0.25f64), 0.75f64);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&0.5f64, &0f64, &1f64), 0.5f64);
        assert_eq!(clamp(&-2f64, &0f64, &1f64), 0f64);
        assert_eq!(clamp(&7f64, &0f64, &1f64), 1f64);
        assert_eq!(clamp(&1f64, &1f64, &1f64), 1f64);
    }
}
