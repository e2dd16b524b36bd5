use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
///
/// Returns `None` for NaN, infinities and values outside the Q32.32 range.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Option<Fixed64> {
    if !v.is_finite() {
        return None;
    }
    Fixed64::checked_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Number of whole ticks needed to cover `length` at `velocity` units per tick.
///
/// Rounds up and never returns less than one tick. Returns `None` when the
/// velocity is not a positive finite number or the length is negative.
pub fn travel_ticks(length: f64, velocity: f64) -> Option<Ticks> {
    if !velocity.is_finite() || velocity <= 0.0 || !length.is_finite() || length < 0.0 {
        return None;
    }
    let ticks = (length / velocity).ceil();
    Some((ticks as Ticks).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed64_basic_arithmetic() {
        let a = f64_to_fixed64(1.5).unwrap();
        let b = f64_to_fixed64(2.0).unwrap();
        assert_eq!(fixed64_to_f64(a + b), 3.5);
    }

    #[test]
    fn fixed64_determinism() {
        let a = f64_to_fixed64(1.0 / 3.0).unwrap();
        let b = f64_to_fixed64(1.0 / 3.0).unwrap();
        let three = f64_to_fixed64(3.0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a * three, b * three);
    }

    #[test]
    fn conversion_rejects_out_of_range() {
        assert_eq!(f64_to_fixed64(3.0e9), None);
        assert_eq!(f64_to_fixed64(-3.0e9), None);
        assert_eq!(f64_to_fixed64(f64::NAN), None);
        assert_eq!(f64_to_fixed64(f64::INFINITY), None);
        assert!(f64_to_fixed64(2.0e9).is_some());
    }

    #[test]
    fn travel_ticks_exact_division() {
        assert_eq!(travel_ticks(10.0, 2.0), Some(5));
    }

    #[test]
    fn travel_ticks_rounds_up() {
        assert_eq!(travel_ticks(10.0, 3.0), Some(4));
    }

    #[test]
    fn travel_ticks_at_least_one() {
        assert_eq!(travel_ticks(0.0, 2.0), Some(1));
        assert_eq!(travel_ticks(0.5, 10.0), Some(1));
    }

    #[test]
    fn travel_ticks_rejects_bad_velocity() {
        assert_eq!(travel_ticks(10.0, 0.0), None);
        assert_eq!(travel_ticks(10.0, -1.0), None);
        assert_eq!(travel_ticks(10.0, f64::NAN), None);
        assert_eq!(travel_ticks(-1.0, 1.0), None);
    }
}
