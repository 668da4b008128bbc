//! Feature detection for every camera of a reconstruction.
//!
//! The detector itself lives outside of this crate behind the [`Detector`] and [`DetectorContext`]
//! traits. A detector context holds the image pyramid of the detector, which is allocated once
//! for the largest image of a batch. The functions here size one context for a batch, run it on
//! every camera in order and store the resulting keypoints and descriptors in the cameras.

mod options;

pub use options::*;

use log::*;
use sfm_camera::{Camera, CameraError, KeyPoint, DESCRIPTOR_DIM};
use sfm_data::Dataset;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("failed to create a detector context for {width}x{height} images: {reason}")]
    Context {
        width: u32,
        height: u32,
        reason: String,
    },
    #[error("feature detection on {path} failed: {reason}")]
    Detection { path: PathBuf, reason: String },
    #[error("detected features could not be stored: {0}")]
    Camera(#[from] CameraError),
}

/// A keypoint as returned by the detector, along with its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFeature {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub orientation: f32,
    /// [`DESCRIPTOR_DIM`] values.
    pub descriptor: Vec<f32>,
}

/// Creates detector contexts.
pub trait Detector {
    type Context: DetectorContext;

    /// Creates a context able to process images up to `max_width` by `max_height` pixels.
    fn initialize(
        &self,
        options: &DetectorOptions,
        max_width: u32,
        max_height: u32,
    ) -> Result<Self::Context, FeatureError>;
}

/// A detector with its buffers allocated, reused from one image to the next.
pub trait DetectorContext {
    /// Detects the features of the image at `path`.
    fn detect(&mut self, path: &Path) -> Result<Vec<DetectedFeature>, FeatureError>;
}

/// Detects features on every camera using a single detector context.
///
/// The context is sized for the largest width and the largest height among `cams`. After each
/// camera, `progress` is called with the number of cameras processed so far.
///
/// If the context cannot be created nothing is processed, `progress` is never called and `0` is
/// returned. If detection fails on one camera that camera is left as it was and the batch goes
/// on. Returns the number of cameras that received features.
pub fn detect_features<D: Detector + ?Sized>(
    detector: &D,
    options: &DetectorOptions,
    cams: &mut [Box<dyn Camera>],
    mut progress: Option<&mut dyn FnMut(usize)>,
) -> usize {
    if cams.is_empty() {
        return 0;
    }
    let max_width = cams.iter().map(|cam| cam.image().width()).max().unwrap_or(0);
    let max_height = cams.iter().map(|cam| cam.image().height()).max().unwrap_or(0);
    let mut context = match detector.initialize(options, max_width, max_height) {
        Ok(context) => context,
        Err(e) => {
            error!("abandoning feature detection on {} cameras: {}", cams.len(), e);
            return 0;
        }
    };
    debug!(
        "detector context created for {}x{} images with options\n{}",
        max_width, max_height, options
    );

    let mut succeeded = 0;
    for (ix, cam) in cams.iter_mut().enumerate() {
        match detect_with(&mut context, &mut **cam) {
            Ok(num) => {
                debug!("camera {} has {} features", ix, num);
                succeeded += 1;
            }
            Err(e) => warn!("skipping camera {}: {}", ix, e),
        }
        if let Some(progress) = progress.as_deref_mut() {
            progress(ix + 1);
        }
    }
    info!(
        "detected features on {} of {} cameras",
        succeeded,
        cams.len()
    );
    succeeded
}

/// Detects features on a single camera with a context of its own.
///
/// Returns whether features were stored. Failures are logged.
pub fn detect_camera_features<D: Detector + ?Sized>(
    detector: &D,
    options: &DetectorOptions,
    cam: &mut dyn Camera,
) -> bool {
    let (width, height) = (cam.image().width(), cam.image().height());
    let result = match detector.initialize(options, width, height) {
        Ok(mut context) => detect_with(&mut context, cam),
        Err(e) => Err(e),
    };
    match result {
        Ok(num) => {
            info!("detected {} features on {}", num, cam.image().path().display());
            true
        }
        Err(e) => {
            error!(
                "feature detection on {} failed: {}",
                cam.image().path().display(),
                e
            );
            false
        }
    }
}

/// Runs [`detect_features`] on the cameras of `dataset`.
pub fn detect_dataset_features<D: Detector + ?Sized>(
    detector: &D,
    options: &DetectorOptions,
    dataset: &mut Dataset,
    progress: Option<&mut dyn FnMut(usize)>,
) -> usize {
    detect_features(detector, options, dataset.cams_mut(), progress)
}

/// Replaces the features of `cam` with the detections on its image.
fn detect_with<C: DetectorContext>(
    context: &mut C,
    cam: &mut dyn Camera,
) -> Result<usize, FeatureError> {
    let detected = context.detect(cam.image().path())?;
    store_features(cam, &detected)?;
    Ok(detected.len())
}

/// Writes `detected` into the feature storage of `cam`.
///
/// Every descriptor is checked first, so `cam` is unchanged on error.
pub fn store_features(
    cam: &mut dyn Camera,
    detected: &[DetectedFeature],
) -> Result<(), CameraError> {
    if let Some(feature) = detected
        .iter()
        .find(|feature| feature.descriptor.len() != DESCRIPTOR_DIM)
    {
        return Err(CameraError::DescriptorLength {
            expected: DESCRIPTOR_DIM,
            actual: feature.descriptor.len(),
        });
    }
    let features = cam.features_mut();
    features.resize(detected.len(), DESCRIPTOR_DIM);
    for (ix, feature) in detected.iter().enumerate() {
        let key = KeyPoint::new(
            f64::from(feature.x),
            f64::from(feature.y),
            feature.scale,
            feature.orientation,
        );
        features.set_feature(ix, key, &feature.descriptor)?;
    }
    Ok(())
}
