use crate::distortion_function::{Distortion, NoDistortion, Radial};
use crate::{
    decompose_projection, Camera, CameraError, ConstraintsError, CostFunction, Features,
    ImageRef, NormalizedKeyPoint, ReprojectionError,
};
use nalgebra::{Matrix3, Matrix3x4, Point2, Point3, Rotation3, Vector2, Vector3};
use std::path::Path;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Index of the axis-angle rotation in the parameter vector.
pub const ROTATION_IDX: usize = 0;
/// Index of the camera center in the parameter vector.
pub const CENTER_IDX: usize = 3;
/// Index of the focal length in the parameter vector.
pub const FOCAL_IDX: usize = 6;
/// Index of the first distortion coefficient in the parameter vector.
pub const DISTORTION_IDX: usize = 7;

/// Pinhole camera with a single focal length, a fixed principal point at the image center and a
/// pluggable [`Distortion`].
///
/// A world point $\vec X$ projects to
///
/// $$
/// \vec x = f ⋅ d\p{\lVert \vec p \rVert^2} ⋅ \vec p + \vec x_0
/// \quad \text{with} \quad
/// \vec p = \pi\p{R \p{\vec X - \vec C}}
/// $$
///
/// where $\pi$ is the perspective division and $d$ the distortion factor.
///
/// Use the [`StandardCameraRadial`] alias for the variant with two radial coefficients.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct StandardCamera<D = NoDistortion> {
    image: ImageRef,
    features: Features,
    /// Axis-angle rotation from world to camera.
    rotation: Vector3<f64>,
    center: Vector3<f64>,
    focal: f64,
    principal_point: Vector2<f64>,
    distortion: D,
    constraints: ParamsConstraints,
}

/// [`StandardCamera`] with two radial distortion coefficients.
pub type StandardCameraRadial = StandardCamera<Radial>;

/// Soft constraints on the camera parameters.
///
/// A parameter with a nonzero weight `w` and target `t` contributes the residual `w (p - t)`.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ParamsConstraints {
    pub targets: Vec<f64>,
    pub weights: Vec<f64>,
}

impl ParamsConstraints {
    fn unconstrained(num_params: usize) -> Self {
        Self {
            targets: vec![0.0; num_params],
            weights: vec![0.0; num_params],
        }
    }
}

impl<D: Distortion + Default> StandardCamera<D> {
    pub const NUM_PARAMS: usize = DISTORTION_IDX + D::NUM_PARAMS;

    /// Creates a camera reading the image dimensions from `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CameraError> {
        Ok(Self::from_image(ImageRef::open(path)?))
    }

    /// Creates a camera for an image of known dimensions.
    pub fn with_dimensions(path: impl AsRef<Path>, width: u32, height: u32) -> Self {
        Self::from_image(ImageRef::with_dimensions(path, width, height))
    }

    /// Creates a camera at the origin looking down +z with a zero focal length.
    ///
    /// The principal point is the image center.
    pub fn from_image(image: ImageRef) -> Self {
        let principal_point = Vector2::new(
            0.5 * (f64::from(image.width()) - 1.0),
            0.5 * (f64::from(image.height()) - 1.0),
        );
        Self {
            image,
            features: Features::new(),
            rotation: Vector3::zeros(),
            center: Vector3::zeros(),
            focal: 0.0,
            principal_point,
            distortion: D::default(),
            constraints: ParamsConstraints::unconstrained(Self::NUM_PARAMS),
        }
    }
}

impl<D: Distortion> StandardCamera<D> {
    pub fn focal(&self) -> f64 {
        self.focal
    }

    /// Sets the focal length and refits the cached inverse distortion, whose sampled radius
    /// range depends on it.
    pub fn set_focal(&mut self, focal: f64) {
        self.focal = focal;
        let coefficients = self.distortion.coefficients().to_vec();
        let max_radius = self.max_normalized_radius();
        self.distortion.set_coefficients(&coefficients, max_radius);
    }

    pub fn center(&self) -> Vector3<f64> {
        self.center
    }

    pub fn set_center(&mut self, center: Vector3<f64>) {
        self.center = center;
    }

    /// The world to camera rotation as an axis-angle vector.
    pub fn rotation(&self) -> Vector3<f64> {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: &Rotation3<f64>) {
        self.rotation = rotation.scaled_axis();
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        Rotation3::new(self.rotation).into_inner()
    }

    pub fn principal_point(&self) -> Vector2<f64> {
        self.principal_point
    }

    pub fn distortion(&self) -> &D {
        &self.distortion
    }

    #[rustfmt::skip]
    pub fn intrinsic_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal, 0.0,        self.principal_point.x,
            0.0,        self.focal, self.principal_point.y,
            0.0,        0.0,        1.0,
        )
    }

    /// The world to camera transformation $R \p{I | -C}$.
    pub fn pose(&self) -> Matrix3x4<f64> {
        let mut translate = Matrix3x4::identity();
        translate.set_column(3, &-self.center);
        self.rotation_matrix() * translate
    }

    /// The projection matrix $K R \p{I | -C}$, ignoring distortion.
    pub fn projection_matrix(&self) -> Matrix3x4<f64> {
        self.intrinsic_matrix() * self.pose()
    }

    pub fn constraints(&self) -> &ParamsConstraints {
        &self.constraints
    }

    /// Pulls the focal length towards `target` with strength `weight`.
    pub fn constrain_focal(&mut self, target: f64, weight: f64) {
        self.constraints.targets[FOCAL_IDX] = target;
        self.constraints.weights[FOCAL_IDX] = weight;
    }

    /// Sets targets and weights for every parameter at once.
    pub fn set_params_constraints(
        &mut self,
        targets: &[f64],
        weights: &[f64],
    ) -> Result<(), CameraError> {
        for values in [targets, weights] {
            if values.len() != self.num_params() {
                return Err(CameraError::ParamsLength {
                    expected: self.num_params(),
                    actual: values.len(),
                });
            }
        }
        self.constraints.targets.copy_from_slice(targets);
        self.constraints.weights.copy_from_slice(weights);
        Ok(())
    }

    /// Largest normalized radius at which a point can appear in the image.
    ///
    /// This is the distance from the principal point to the far image corner over the focal length.
    pub fn max_normalized_radius(&self) -> f64 {
        let x_max = f64::from(self.image.width()) - self.principal_point.x;
        let y_max = f64::from(self.image.height()) - self.principal_point.y;
        (x_max * x_max + y_max * y_max).sqrt() / self.focal.abs()
    }

    fn check_params_len(&self, len: usize) -> Result<(), CameraError> {
        if len != self.num_params() {
            return Err(CameraError::ParamsLength {
                expected: self.num_params(),
                actual: len,
            });
        }
        Ok(())
    }
}

impl StandardCameraRadial {
    /// Pulls the radial coefficients towards `targets` with strengths `weights`.
    pub fn constrain_radial(&mut self, targets: [f64; 2], weights: [f64; 2]) {
        for i in 0..2 {
            self.constraints.targets[DISTORTION_IDX + i] = targets[i];
            self.constraints.weights[DISTORTION_IDX + i] = weights[i];
        }
    }

    /// The forward radial coefficients `[k1, k2]`.
    pub fn radial_params(&self) -> [f64; 2] {
        let coefficients = self.distortion.coefficients();
        [coefficients[0], coefficients[1]]
    }
}

/// Projects `point` with the camera parameters in `params`.
///
/// Both [`Camera::project`] and the reprojection residual evaluate this function.
pub(crate) fn project_params<D: Distortion>(
    params: &[f64],
    principal_point: &Vector2<f64>,
    point: &Point3<f64>,
) -> Point2<f64> {
    let rotation = Rotation3::new(Vector3::from_column_slice(
        &params[ROTATION_IDX..ROTATION_IDX + 3],
    ));
    let center = Vector3::from_column_slice(&params[CENTER_IDX..CENTER_IDX + 3]);
    let camera_point = rotation * (point.coords - center);
    let normalized = camera_point.xy() / camera_point.z;
    let distortion = D::factor(&params[DISTORTION_IDX..], normalized.norm_squared());
    Point2::from(params[FOCAL_IDX] * distortion * normalized + principal_point)
}

impl<D: Distortion> Camera for StandardCamera<D> {
    fn image(&self) -> &ImageRef {
        &self.image
    }

    fn features(&self) -> &Features {
        &self.features
    }

    fn features_mut(&mut self) -> &mut Features {
        &mut self.features
    }

    fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        project_params::<D>(&self.params(), &self.principal_point, point)
    }

    fn key_normalized(&self, ix: usize) -> NormalizedKeyPoint {
        let distorted = (self.key(ix).coords - self.principal_point) / self.focal;
        let (x, y) = self.distortion.undistort(distorted.x, distorted.y);
        NormalizedKeyPoint(Point2::new(x, y))
    }

    fn num_params(&self) -> usize {
        DISTORTION_IDX + D::NUM_PARAMS
    }

    fn params(&self) -> Vec<f64> {
        let mut params = Vec::with_capacity(self.num_params());
        params.extend(self.rotation.iter());
        params.extend(self.center.iter());
        params.push(self.focal);
        params.extend_from_slice(self.distortion.coefficients());
        params
    }

    fn set_params(&mut self, params: &[f64]) -> Result<(), CameraError> {
        self.check_params_len(params.len())?;
        self.rotation = Vector3::from_column_slice(&params[ROTATION_IDX..ROTATION_IDX + 3]);
        self.center = Vector3::from_column_slice(&params[CENTER_IDX..CENTER_IDX + 3]);
        self.focal = params[FOCAL_IDX];
        let max_radius = self.max_normalized_radius();
        self.distortion
            .set_coefficients(&params[DISTORTION_IDX..], max_radius);
        Ok(())
    }

    fn set_projection(&mut self, projection: &Matrix3x4<f64>) -> Result<(), CameraError> {
        let factors =
            decompose_projection(projection).ok_or(CameraError::DegenerateProjection)?;
        self.focal = 0.5 * (factors.intrinsics[(0, 0)] + factors.intrinsics[(1, 1)]);
        self.center = factors.center;
        self.rotation = factors.rotation.scaled_axis();
        self.distortion.reset();
        Ok(())
    }

    fn cost_function(&self, ix: usize) -> Box<dyn CostFunction> {
        Box::new(ReprojectionError::<D>::new(
            self.key(ix),
            self.principal_point,
            self.num_params(),
        ))
    }

    fn constraints_cost_function(&self) -> Box<dyn CostFunction> {
        Box::new(ConstraintsError::new(
            &self.constraints.targets,
            &self.constraints.weights,
        ))
    }

    fn clone_box(&self) -> Box<dyn Camera> {
        Box::new(self.clone())
    }
}
