use super::Distortion;

/// No distortion at all.
#[derive(Clone, PartialEq, Default, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NoDistortion;

impl Distortion for NoDistortion {
    const NUM_PARAMS: usize = 0;

    fn coefficients(&self) -> &[f64] {
        &[]
    }

    fn set_coefficients(&mut self, _coefficients: &[f64], _max_radius: f64) {}

    fn reset(&mut self) {}

    fn factor(_coefficients: &[f64], _r2: f64) -> f64 {
        1.0
    }

    fn undistort(&self, x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }
}
