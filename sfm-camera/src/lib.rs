//! Pinhole camera models for incremental structure from motion.
//!
//! A camera owns the image it was created from, the keypoints and descriptors detected on that
//! image, and the parameters refined by bundle adjustment. The parameter vector has a fixed
//! layout per model:
//!
//! | model                   | layout                                             |
//! |-------------------------|----------------------------------------------------|
//! | [`StandardCamera`]      | `[rotation (3), center (3), focal (1)]`            |
//! | [`StandardCameraRadial`]| `[rotation (3), center (3), focal (1), k1, k2]`    |
//!
//! The rotation is stored as an axis-angle vector (axis scaled by the angle in radians).
//!
//! Cameras also build the residual functions consumed by a nonlinear least-squares solver, see
//! [`CostFunction`], [`Camera::cost_function`] and [`Camera::constraints_cost_function`].

mod camera;
mod cost;
mod decompose;
pub mod distortion_function;
mod error;
mod keys;
mod root;

pub use camera::*;
pub use cost::*;
pub use decompose::*;
pub use error::*;
pub use keys::*;

pub use nalgebra;

use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Matrix3x4, Point2, Point3};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A point on the normalized image plane of a camera, i.e. with the focal length, the principal
/// point and (approximately) the lens distortion removed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct NormalizedKeyPoint(pub Point2<f64>);

/// The image a camera was created from.
///
/// The dimensions are resolved once, when the camera is created, and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ImageRef {
    path: PathBuf,
    width: u32,
    height: u32,
}

impl ImageRef {
    /// Probes the image header for its dimensions without decoding the pixels.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CameraError> {
        let path = path.as_ref().to_path_buf();
        let (width, height) = image::image_dimensions(&path).map_err(|source| {
            CameraError::Image {
                path: path.clone(),
                source,
            }
        })?;
        Ok(Self {
            path,
            width,
            height,
        })
    }

    /// Uses already known dimensions instead of reading the image.
    pub fn with_dimensions(path: impl AsRef<Path>, width: u32, height: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            width,
            height,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// The capabilities shared by every camera model.
///
/// This trait is object safe so that a reconstruction can hold cameras of different models in a
/// single `Vec<Box<dyn Camera>>`.
pub trait Camera: Debug + Send + Sync {
    /// The image this camera was created from.
    fn image(&self) -> &ImageRef;

    /// Keypoints and descriptors detected on the image.
    fn features(&self) -> &Features;

    fn features_mut(&mut self) -> &mut Features;

    /// Projects a world point into the image, in pixels.
    fn project(&self, point: &Point3<f64>) -> Point2<f64>;

    /// Maps the keypoint `ix` back onto the normalized image plane.
    ///
    /// # Panics
    ///
    /// Panics if `ix` is not a valid keypoint index.
    fn key_normalized(&self, ix: usize) -> NormalizedKeyPoint;

    /// Length of the parameter vector.
    fn num_params(&self) -> usize;

    /// The parameter vector in the fixed layout of this model.
    fn params(&self) -> Vec<f64>;

    /// Sets every parameter from a vector in the layout returned by [`Camera::params`].
    ///
    /// `set_params(&p)` followed by `params()` returns exactly `p`.
    fn set_params(&mut self, params: &[f64]) -> Result<(), CameraError>;

    /// Sets rotation, center and focal length from a `3x4` projection matrix.
    ///
    /// Any lens distortion is reset to zero.
    fn set_projection(&mut self, projection: &Matrix3x4<f64>) -> Result<(), CameraError>;

    /// Reprojection residual of the keypoint `ix`.
    ///
    /// The residual takes the parameter blocks `[camera params, point (3)]` and evaluates to the
    /// projected point minus the observed keypoint.
    fn cost_function(&self, ix: usize) -> Box<dyn CostFunction>;

    /// Regularization residual pulling constrained parameters towards their targets.
    ///
    /// The residual takes the single parameter block `[camera params]`. It has one component per
    /// parameter with a nonzero constraint weight, which may be none at all.
    fn constraints_cost_function(&self) -> Box<dyn CostFunction>;

    /// Deep, independent copy of this camera.
    fn clone_box(&self) -> Box<dyn Camera>;

    /// The keypoint `ix` in pixels.
    fn key(&self, ix: usize) -> Point2<f64> {
        self.features().key(ix)
    }
}

impl Clone for Box<dyn Camera> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
