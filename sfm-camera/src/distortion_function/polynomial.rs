/// Polynomial with `N` coefficients in increasing degree order.
///
/// $$
/// p(x) = c_0 + c_1 x + \dots + c_{N-1} x^{N-1}
/// $$
///
/// The radial distortion models are polynomials in the radius, evaluated with Horner's scheme.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Polynomial<const N: usize>(pub [f64; N]);

impl<const N: usize> Default for Polynomial<N> {
    fn default() -> Self {
        Self([0.0; N])
    }
}

impl<const N: usize> Polynomial<N> {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.0.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    pub fn derivative(&self, x: f64) -> f64 {
        self.with_derivative(x).1
    }

    /// Value and first derivative at `x` in a single pass.
    pub fn with_derivative(&self, x: f64) -> (f64, f64) {
        self.0
            .iter()
            .rev()
            .fold((0.0, 0.0), |(value, slope), &c| {
                (value * x + c, slope * x + value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use proptest::prelude::*;

    /// `r (1 + k1 r^2 + k2 r^4)` with `k1 = -0.2` and `k2 = 0.05`.
    fn forward_radial() -> Polynomial<6> {
        Polynomial([0.0, 1.0, 0.0, -0.2, 0.0, 0.05])
    }

    #[test]
    fn evaluates_forward_radial() {
        let forward = forward_radial();
        assert_float_eq!(forward.evaluate(0.0), 0.0, abs <= 0.0);
        assert_float_eq!(forward.evaluate(1.0), 0.85, rmax <= 4.0 * f64::EPSILON);
        assert_float_eq!(forward.evaluate(0.5), 0.4765625, rmax <= 4.0 * f64::EPSILON);
        assert_float_eq!(forward.derivative(1.0), 0.65, rmax <= 4.0 * f64::EPSILON);
    }

    #[test]
    fn derivative_matches_central_difference() {
        let h = f64::EPSILON.powf(1.0 / 3.0);
        let forward = forward_radial();
        proptest!(|(r in 0.0..1.5)| {
            let h = f64::max(h * 0.1, h * r);
            let (value, slope) = forward.with_derivative(r);
            let approx = (forward.evaluate(r + h) - forward.evaluate(r - h)) / (2.0 * h);
            assert_float_eq!(value, forward.evaluate(r), abs <= 0.0);
            assert_float_eq!(slope, approx, abs <= 1e-8);
        });
    }
}
