//! Lens distortion strategies plugged into [`StandardCamera`](crate::StandardCamera).
//!
//! A strategy appends its forward coefficients to the camera parameter vector and may cache
//! whatever it needs to approximately undo the distortion.

mod identity;
mod polynomial;
mod radial;

pub use identity::*;
pub use polynomial::*;
pub use radial::*;

use std::fmt::Debug;

pub trait Distortion: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Number of forward coefficients appended to the camera parameter vector.
    const NUM_PARAMS: usize;

    /// The forward coefficients.
    fn coefficients(&self) -> &[f64];

    /// Sets the forward coefficients and refreshes any cached inverse.
    ///
    /// `max_radius` is the largest normalized radius observable by the camera.
    /// `coefficients` must have length [`Distortion::NUM_PARAMS`].
    fn set_coefficients(&mut self, coefficients: &[f64], max_radius: f64);

    /// Zeroes the distortion.
    fn reset(&mut self);

    /// Scale applied to a normalized point with squared radius `r2`.
    ///
    /// This is an associated function of the raw coefficients so that the residual functions,
    /// which receive coefficients from the solver, evaluate the same formula as the camera.
    fn factor(coefficients: &[f64], r2: f64) -> f64;

    /// Approximately removes the distortion from a distorted normalized point.
    fn undistort(&self, x: f64, y: f64) -> (f64, f64);
}
