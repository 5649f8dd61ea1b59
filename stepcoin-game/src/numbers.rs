//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Floor a f64 and clamp it to the u64 range, returning 0 for non-finite values.
#[must_use]
pub fn floor_f64_to_u64(value: f64) -> u64 {
    if !value.is_finite() {
        return 0;
    }
    let max = cast::<u64, f64>(u64::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(0.0, max).floor();
    cast::<f64, u64>(clamped).unwrap_or(0)
}

/// Convert u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// Floor-based bonus on top of a base credit that was already granted.
///
/// `floor(base * factor) - base`, never negative.
#[must_use]
pub fn floored_bonus(base: u64, factor: f64) -> u64 {
    floor_f64_to_u64(u64_to_f64(base) * factor).saturating_sub(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_handles_non_finite_and_negative() {
        assert_eq!(floor_f64_to_u64(f64::NAN), 0);
        assert_eq!(floor_f64_to_u64(f64::INFINITY), 0);
        assert_eq!(floor_f64_to_u64(-3.5), 0);
        assert_eq!(floor_f64_to_u64(2.99), 2);
    }

    #[test]
    fn floored_bonus_drops_fractional_part() {
        assert_eq!(floored_bonus(1, 1.5), 0);
        assert_eq!(floored_bonus(1, 2.0), 1);
        assert_eq!(floored_bonus(1, 3.0), 2);
        assert_eq!(floored_bonus(2, 1.5), 1);
        assert_eq!(floored_bonus(1, 0.5), 0);
    }
}
