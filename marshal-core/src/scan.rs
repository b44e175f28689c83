//! Range scan sanitation.
//!
//! Rangefinders report a zero (or a tiny value) when a beam gets no return.
//! Those readings are replaced by a far sentinel distance so the segmenter
//! sees them as empty space instead of a surface touching the sensor.

/// Readings at or below this distance (meters) are treated as "no return".
pub const MIN_VALID_RANGE: f32 = 0.02;

/// Distance (meters) substituted for "no return" readings.
pub const NO_RETURN_SENTINEL: f32 = 10.0;

/// Replace every reading `<= min_valid` (and every NaN) by `sentinel`.
pub fn sanitize_with(ranges: &[f32], min_valid: f32, sentinel: f32) -> Vec<f32> {
    ranges
        .iter()
        .map(|&r| if r > min_valid { r } else { sentinel })
        .collect()
}

/// Sanitize with the default [`MIN_VALID_RANGE`] and [`NO_RETURN_SENTINEL`].
pub fn sanitize(ranges: &[f32]) -> Vec<f32> {
    sanitize_with(ranges, MIN_VALID_RANGE, NO_RETURN_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_return_replaced() {
        let out = sanitize(&[0.0, 0.02, 0.021, 1.2]);
        assert_eq!(out, vec![10.0, 10.0, 0.021, 1.2]);
    }

    #[test]
    fn test_nan_replaced() {
        let out = sanitize(&[f32::NAN, 0.5]);
        assert_eq!(out, vec![10.0, 0.5]);
    }

    #[test]
    fn test_infinity_kept() {
        // Infinity already reads as out of range
        let out = sanitize(&[f32::INFINITY]);
        assert!(out[0].is_infinite());
    }
}
