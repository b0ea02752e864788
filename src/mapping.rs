use serde::Deserialize;

/// Integer division that rounds to the nearest integer instead of truncating.
/// Exact halves round away from zero.
///
/// Panics if `divisor` is zero.
pub fn round_div(dividend: i64, divisor: i64) -> i64 {
    assert_ne!(divisor, 0, "round_div called with a zero divisor");

    let n = dividend.unsigned_abs();
    let d = divisor.unsigned_abs();
    let q = ((n + d / 2) / d) as i64;

    if (dividend < 0) != (divisor < 0) {
        -q
    } else {
        q
    }
}

/// Maps `x` from `[in_lo, in_hi]` onto `[out_lo, out_hi]`, rounding to the
/// nearest integer. `in_lo` and `in_hi` must differ.
pub fn linear_map(x: i64, in_lo: i64, in_hi: i64, out_lo: i64, out_hi: i64) -> i64 {
    round_div((x - in_lo) * (out_hi - out_lo), in_hi - in_lo) + out_lo
}

/// Exponential velocity-to-brightness curve.
///
/// A linear mapping looks flat to the eye, so brightness grows as
/// `floor * (ceiling / floor) ^ (velocity / input_max)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrightnessCurve {
    pub floor: u8,
    pub ceiling: u8,
    pub input_max: u8,
}

impl Default for BrightnessCurve {
    fn default() -> Self {
        Self {
            floor: 40,
            ceiling: 255,
            input_max: 127,
        }
    }
}

impl BrightnessCurve {
    pub fn apply(&self, velocity: u8) -> u8 {
        let floor = self.floor as f64;
        let ceiling = self.ceiling as f64;
        let t = velocity as f64 / self.input_max as f64;

        let value = floor * (t * (ceiling / floor).ln()).exp();
        value.clamp(floor, ceiling).round() as u8
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_div_rounds_to_nearest() {
        assert_eq!(round_div(7, 2), 4);
        assert_eq!(round_div(-7, 2), -4);
        assert_eq!(round_div(5, 2), 3);
        assert_eq!(round_div(7, -2), -4);
        assert_eq!(round_div(2, 3), 1);
        assert_eq!(round_div(1, 3), 0);
        assert_eq!(round_div(-1, 3), 0);
        assert_eq!(round_div(0, 9), 0);
    }

    #[test]
    #[should_panic]
    fn round_div_by_zero() {
        round_div(1, 0);
    }

    #[test]
    fn linear_map_endpoints_and_monotonic() {
        assert_eq!(linear_map(0, 0, 75, 0, 63), 0);
        assert_eq!(linear_map(75, 0, 75, 0, 63), 63);

        let mapped: Vec<_> = (0..=75).map(|x| linear_map(x, 0, 75, 0, 63)).collect();
        assert!(mapped.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn linear_map_offsets_output() {
        assert_eq!(linear_map(5, 0, 75, 0, 255), 17);
        assert_eq!(linear_map(0, 0, 75, 10, 63), 10);
        assert_eq!(linear_map(75, 0, 75, 10, 63), 63);
    }

    #[test]
    fn brightness_curve_endpoints() {
        let curve = BrightnessCurve::default();
        assert_eq!(curve.apply(0), 40);
        assert_eq!(curve.apply(127), 255);
    }

    #[test]
    fn brightness_curve_is_exponential() {
        let curve = BrightnessCurve::default();
        let values: Vec<_> = (0..=127).map(|v| curve.apply(v)).collect();

        assert!(values.windows(2).all(|w| w[0] <= w[1]));

        // convex: the midpoint sits well below the straight line between the ends
        assert!(u16::from(curve.apply(64)) < (40u16 + 255) / 2);
        assert!(values[127] - values[117] > values[10] - values[0]);
    }
}
