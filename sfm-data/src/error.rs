use thiserror::Error;

/// Violated preconditions of the [`Points`](crate::Points) operations.
///
/// Every operation returning this error checks all of its inputs first, so the track store is
/// unchanged when it fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    #[error("got {indices} match indices but {coords} coordinates")]
    LengthMismatch { indices: usize, coords: usize },
    #[error("match index {index} is out of range for {len} matches to reconstruct")]
    MatchIndex { index: usize, len: usize },
    #[error("match index {index} is listed more than once")]
    DuplicateMatchIndex { index: usize },
    #[error("cannot seed points from camera {cam} paired with itself")]
    DegeneratePair { cam: usize },
    #[error("match {match_index} has no observation in camera {cam}")]
    MissingObservation { match_index: usize, cam: usize },
    #[error("keep mask has length {actual} but there are {expected} points")]
    MaskLength { expected: usize, actual: usize },
    #[error("point index {index} is out of range for {len} points")]
    PointIndex { index: usize, len: usize },
    #[error("inlier index {index} is out of range for {len} candidate points")]
    InlierIndex { index: usize, len: usize },
    #[error("point {point} has no pending observation in camera {cam}")]
    NotPending { point: usize, cam: usize },
    #[error("split match {point} lists camera {cam} as both observed and unobserved")]
    OverlappingPartition { point: usize, cam: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("camera index {index} is out of range for {len} cameras")]
    CameraIndex { index: usize, len: usize },
    #[error("track store rejected the update: {0}")]
    Track(#[from] TrackError),
}
