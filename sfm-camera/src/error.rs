use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to read the dimensions of image {path:?}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("expected {expected} camera parameters, got {actual}")]
    ParamsLength { expected: usize, actual: usize },
    #[error("expected a descriptor of length {expected}, got {actual}")]
    DescriptorLength { expected: usize, actual: usize },
    #[error("feature {index} is out of range for {len} features")]
    FeatureIndex { index: usize, len: usize },
    #[error("the projection matrix has a singular left 3x3 block")]
    DegenerateProjection,
}
