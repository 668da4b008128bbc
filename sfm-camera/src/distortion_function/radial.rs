use super::{Distortion, Polynomial};
use crate::root::root;
use log::*;
use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Largest accepted radial error of the inverse fit, in normalized image units.
///
/// A fit above this tolerance is still used, but a warning is logged.
pub const INVERSE_FIT_TOLERANCE: f64 = 1e-3;

/// Number of distorted radii the inverse is fitted to.
const INVERSE_FIT_SAMPLES: usize = 100;

/// Two coefficient radial distortion.
///
/// A normalized point $\vec x$ with $r = \lVert \vec x \rVert$ is distorted as
///
/// $$
/// \vec x_d = \p{1 + k_1 ⋅ r^2 + k_2 ⋅ r^4} ⋅ \vec x
/// $$
///
/// The inverse is not computed exactly. Instead a polynomial in the distorted radius $r_d$
///
/// $$
/// r_u = r_d ⋅ \p{1 + a_0 ⋅ r_d + a_1 ⋅ r_d^2 + a_2 ⋅ r_d^3 + a_3 ⋅ r_d^4}
/// $$
///
/// is fitted by linear least squares every time the forward coefficients change. The samples
/// cover distorted radii in $[0, r_{max}]$ and their exact undistorted radii are found with a
/// Newton-Bisection root finder. The largest radial error of the fit over the samples is kept in
/// [`Radial::inverse_fit_error`].
#[derive(Clone, PartialEq, Default, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Radial {
    coefficients: [f64; 2],
    inverse: [f64; 4],
    inverse_fit_error: f64,
}

impl Radial {
    /// The coefficients $(a_0, a_1, a_2, a_3)$ of the fitted inverse.
    pub fn inverse_coefficients(&self) -> [f64; 4] {
        self.inverse
    }

    /// Largest radial error of the inverse fit over the sampled radii.
    ///
    /// This is `f64::INFINITY` when no fit could be computed, in which case the inverse is the
    /// identity.
    pub fn inverse_fit_error(&self) -> f64 {
        self.inverse_fit_error
    }

    /// $r \mapsto r ⋅ \p{1 + k_1 ⋅ r^2 + k_2 ⋅ r^4}$
    fn forward(coefficients: [f64; 2]) -> Polynomial<6> {
        let [k1, k2] = coefficients;
        Polynomial([0.0, 1.0, 0.0, k1, 0.0, k2])
    }

    fn inverse_factor(inverse: [f64; 4]) -> Polynomial<5> {
        let [a0, a1, a2, a3] = inverse;
        Polynomial([1.0, a0, a1, a2, a3])
    }
}

impl Distortion for Radial {
    const NUM_PARAMS: usize = 2;

    fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    fn set_coefficients(&mut self, coefficients: &[f64], max_radius: f64) {
        self.coefficients = [coefficients[0], coefficients[1]];
        let (inverse, error) = fit_inverse(self.coefficients, max_radius);
        if error > INVERSE_FIT_TOLERANCE {
            warn!(
                "inverse radial distortion fit for k1={}, k2={} has error {} above tolerance {}",
                self.coefficients[0], self.coefficients[1], error, INVERSE_FIT_TOLERANCE
            );
        }
        self.inverse = inverse;
        self.inverse_fit_error = error;
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn factor(coefficients: &[f64], r2: f64) -> f64 {
        1.0 + r2 * (coefficients[0] + r2 * coefficients[1])
    }

    fn undistort(&self, x: f64, y: f64) -> (f64, f64) {
        let radius = (x * x + y * y).sqrt();
        let factor = Self::inverse_factor(self.inverse).evaluate(radius);
        (factor * x, factor * y)
    }
}

/// Fits the inverse coefficients and returns them with the largest radial error over the samples.
fn fit_inverse(coefficients: [f64; 2], max_radius: f64) -> ([f64; 4], f64) {
    if coefficients == [0.0, 0.0] {
        return ([0.0; 4], 0.0);
    }
    if !(max_radius.is_finite() && max_radius > 0.0) {
        warn!(
            "cannot fit inverse radial distortion over invalid radius {}",
            max_radius
        );
        return ([0.0; 4], f64::INFINITY);
    }

    let forward = Radial::forward(coefficients);
    let samples: Vec<(f64, f64)> = (1..=INVERSE_FIT_SAMPLES)
        .filter_map(|i| {
            let distorted = max_radius * i as f64 / INVERSE_FIT_SAMPLES as f64;
            undistorted_radius(&forward, distorted).map(|undistorted| (distorted, undistorted))
        })
        .collect();
    if samples.len() < 4 {
        warn!(
            "forward radial distortion k1={}, k2={} is not invertible over radius {}",
            coefficients[0], coefficients[1], max_radius
        );
        return ([0.0; 4], f64::INFINITY);
    }

    // r_u - r_d = a0 r_d^2 + a1 r_d^3 + a2 r_d^4 + a3 r_d^5
    let a = DMatrix::from_fn(samples.len(), 4, |row, col| {
        samples[row].0.powi(col as i32 + 2)
    });
    let b = DVector::from_iterator(samples.len(), samples.iter().map(|&(rd, ru)| ru - rd));
    let solution = match a.svd(true, true).solve(&b, 1e-14) {
        Ok(solution) => solution,
        Err(e) => {
            warn!("inverse radial distortion fit failed: {}", e);
            return ([0.0; 4], f64::INFINITY);
        }
    };
    let inverse = [solution[0], solution[1], solution[2], solution[3]];

    let factor = Radial::inverse_factor(inverse);
    let error = samples
        .iter()
        .map(|&(rd, ru)| (rd * factor.evaluate(rd) - ru).abs())
        .fold(0.0, f64::max);
    trace!(
        "fitted inverse radial distortion {:?} with error {}",
        inverse,
        error
    );
    (inverse, error)
}

/// Solves `forward(r) = distorted` for `r`.
fn undistorted_radius(forward: &Polynomial<6>, distorted: f64) -> Option<f64> {
    const MAX_DOUBLINGS: usize = 32;

    let mut high = distorted;
    for _ in 0..MAX_DOUBLINGS {
        if forward.evaluate(high) > distorted {
            return root(
                |r| {
                    let (value, derivative) = forward.with_derivative(r);
                    (value - distorted, derivative)
                },
                0.0,
                high,
            );
        }
        high *= 2.0;
    }
    None
}
