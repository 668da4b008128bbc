use crate::camera::project_params;
use crate::distortion_function::Distortion;
use nalgebra::{DMatrix, DVector, Point2, Point3, Vector2};
use std::marker::PhantomData;

/// A residual function handed to a nonlinear least-squares solver.
///
/// The function is evaluated on a list of parameter blocks whose lengths are given by
/// [`CostFunction::parameter_block_sizes`].
pub trait CostFunction: Send + Sync {
    fn num_residuals(&self) -> usize;

    fn parameter_block_sizes(&self) -> &[usize];

    /// Evaluates the residual vector.
    ///
    /// # Panics
    ///
    /// May panic if the blocks do not match [`CostFunction::parameter_block_sizes`].
    fn residuals(&self, parameters: &[&[f64]]) -> DVector<f64>;

    /// Jacobians of the residuals, one `num_residuals x block_size` matrix per parameter block.
    ///
    /// The default implementation uses central finite differences.
    fn jacobians(&self, parameters: &[&[f64]]) -> Vec<DMatrix<f64>> {
        let step = f64::EPSILON.powf(1.0 / 3.0);
        let mut blocks: Vec<Vec<f64>> = parameters.iter().map(|block| block.to_vec()).collect();
        (0..blocks.len())
            .map(|b| {
                let mut jacobian = DMatrix::zeros(self.num_residuals(), blocks[b].len());
                for j in 0..blocks[b].len() {
                    let original = blocks[b][j];
                    let h = step * original.abs().max(1.0);
                    blocks[b][j] = original + h;
                    let forward = self.residuals(&as_slices(&blocks));
                    blocks[b][j] = original - h;
                    let backward = self.residuals(&as_slices(&blocks));
                    blocks[b][j] = original;
                    jacobian.set_column(j, &((forward - backward) / (2.0 * h)));
                }
                jacobian
            })
            .collect()
    }
}

fn as_slices(blocks: &[Vec<f64>]) -> Vec<&[f64]> {
    blocks.iter().map(Vec::as_slice).collect()
}

/// Reprojection error of one observed keypoint.
///
/// Parameter blocks are `[camera params, point (3)]`, the residual is the projection of the
/// point minus the keypoint.
#[derive(Debug, Clone)]
pub struct ReprojectionError<D> {
    key: Point2<f64>,
    principal_point: Vector2<f64>,
    block_sizes: [usize; 2],
    _distortion: PhantomData<fn() -> D>,
}

impl<D: Distortion> ReprojectionError<D> {
    pub fn new(key: Point2<f64>, principal_point: Vector2<f64>, num_params: usize) -> Self {
        Self {
            key,
            principal_point,
            block_sizes: [num_params, 3],
            _distortion: PhantomData,
        }
    }
}

impl<D: Distortion> CostFunction for ReprojectionError<D> {
    fn num_residuals(&self) -> usize {
        2
    }

    fn parameter_block_sizes(&self) -> &[usize] {
        &self.block_sizes
    }

    fn residuals(&self, parameters: &[&[f64]]) -> DVector<f64> {
        let point = Point3::new(parameters[1][0], parameters[1][1], parameters[1][2]);
        let projected = project_params::<D>(parameters[0], &self.principal_point, &point);
        let residual = projected - self.key;
        DVector::from_column_slice(residual.as_slice())
    }
}

/// Weighted deviation of the constrained camera parameters from their targets.
///
/// The single parameter block is the camera parameter vector. There is one residual per
/// parameter with a nonzero weight, in parameter order.
#[derive(Debug, Clone)]
pub struct ConstraintsError {
    /// `(parameter index, target, weight)`
    constrained: Vec<(usize, f64, f64)>,
    block_sizes: [usize; 1],
}

impl ConstraintsError {
    pub fn new(targets: &[f64], weights: &[f64]) -> Self {
        let constrained = targets
            .iter()
            .zip(weights)
            .enumerate()
            .filter(|(_, (_, &weight))| weight != 0.0)
            .map(|(ix, (&target, &weight))| (ix, target, weight))
            .collect();
        Self {
            constrained,
            block_sizes: [targets.len()],
        }
    }
}

impl CostFunction for ConstraintsError {
    fn num_residuals(&self) -> usize {
        self.constrained.len()
    }

    fn parameter_block_sizes(&self) -> &[usize] {
        &self.block_sizes
    }

    fn residuals(&self, parameters: &[&[f64]]) -> DVector<f64> {
        let params = parameters[0];
        DVector::from_iterator(
            self.constrained.len(),
            self.constrained
                .iter()
                .map(|&(ix, target, weight)| weight * (params[ix] - target)),
        )
    }

    fn jacobians(&self, _parameters: &[&[f64]]) -> Vec<DMatrix<f64>> {
        let mut jacobian = DMatrix::zeros(self.constrained.len(), self.block_sizes[0]);
        for (row, &(ix, _, weight)) in self.constrained.iter().enumerate() {
            jacobian[(row, ix)] = weight;
        }
        vec![jacobian]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion_function::NoDistortion;
    use crate::{Camera, KeyPoint, StandardCamera, StandardCameraRadial};
    use approx::assert_relative_eq;

    fn observed<C: Camera>(mut camera: C, point: &Point3<f64>, noise: Vector2<f64>) -> C {
        let key = camera.project(point) + noise;
        camera
            .features_mut()
            .add_feature(KeyPoint::new(key.x, key.y, 1.0, 0.0), &[0.0; 4])
            .unwrap();
        camera
    }

    #[test]
    fn residual_agrees_with_project() {
        let mut camera = StandardCameraRadial::with_dimensions("c.jpg", 800, 600);
        camera
            .set_params(&[0.02, 0.3, -0.1, -1.0, 0.5, -5.0, 900.0, 0.05, -0.01])
            .unwrap();
        let point = Point3::new(0.4, -0.3, 1.5);
        let camera = observed(camera, &point, Vector2::new(1.5, -0.75));

        let cost = camera.cost_function(0);
        assert_eq!(cost.num_residuals(), 2);
        assert_eq!(cost.parameter_block_sizes(), &[9, 3]);
        let params = camera.params();
        let residuals = cost.residuals(&[params.as_slice(), point.coords.as_slice()]);
        let expected = camera.project(&point) - camera.key(0);
        // Same formula on the same inputs, so the residual must match exactly.
        assert_eq!(residuals[0], expected.x);
        assert_eq!(residuals[1], expected.y);
        assert_relative_eq!(residuals[0], -1.5, epsilon = 1e-9);
        assert_relative_eq!(residuals[1], 0.75, epsilon = 1e-9);
    }

    #[test]
    fn numeric_jacobian_of_point() {
        let mut camera: StandardCamera = StandardCamera::with_dimensions("d.jpg", 640, 480);
        camera
            .set_params(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 500.0])
            .unwrap();
        let point = Point3::new(0.2, -0.1, 2.0);
        let camera = observed(camera, &point, Vector2::zeros());
        let cost = ReprojectionError::<NoDistortion>::new(
            camera.key(0),
            camera.principal_point(),
            camera.num_params(),
        );
        let params = camera.params();
        let jacobians = cost.jacobians(&[params.as_slice(), point.coords.as_slice()]);
        assert_eq!(jacobians.len(), 2);
        assert_eq!(jacobians[0].shape(), (2, 7));
        assert_eq!(jacobians[1].shape(), (2, 3));
        // u = f x / z, v = f y / z
        let (x, y, z) = (point.x, point.y, point.z);
        assert_relative_eq!(jacobians[1][(0, 0)], 500.0 / z, epsilon = 1e-5);
        assert_relative_eq!(jacobians[1][(0, 2)], -500.0 * x / (z * z), epsilon = 1e-5);
        assert_relative_eq!(jacobians[1][(1, 1)], 500.0 / z, epsilon = 1e-5);
        assert_relative_eq!(jacobians[1][(1, 2)], -500.0 * y / (z * z), epsilon = 1e-5);
        // du/df = x / z
        assert_relative_eq!(jacobians[0][(0, 6)], x / z, epsilon = 1e-7);
    }

    #[test]
    fn constraints_skip_zero_weights() {
        let cost = ConstraintsError::new(&[0.0, 5.0, 1.0], &[0.0, 2.0, 0.0]);
        assert_eq!(cost.num_residuals(), 1);
        let params = [9.0, 6.0, 100.0];
        let residuals = cost.residuals(&[&params[..]]);
        assert_eq!(residuals.as_slice(), &[2.0]);
        let jacobians = cost.jacobians(&[&params[..]]);
        assert_eq!(jacobians[0], DMatrix::from_row_slice(1, 3, &[0.0, 2.0, 0.0]));
    }

    #[test]
    fn unconstrained_camera_has_no_constraint_residuals() {
        let camera = StandardCameraRadial::with_dimensions("e.jpg", 640, 480);
        let cost = camera.constraints_cost_function();
        assert_eq!(cost.num_residuals(), 0);
        let params = camera.params();
        assert_eq!(cost.residuals(&[params.as_slice()]).len(), 0);
    }
}
