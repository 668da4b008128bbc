//! Nonlinear refinement of a [`Dataset`](sfm_data::Dataset).
//!
//! The residuals are the cost functions built by the cameras themselves
//! ([`Camera::cost_function`](sfm_camera::Camera::cost_function) and
//! [`Camera::constraints_cost_function`](sfm_camera::Camera::constraints_cost_function)),
//! minimized with Levenberg-Marquardt.

mod bundle_adjuster;

pub use bundle_adjuster::*;

use levenberg_marquardt::{LevenbergMarquardt, TerminationReason};
use log::*;
use sfm_camera::CameraError;
use sfm_data::Dataset;
use thiserror::Error;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("no registered camera reconstructs any point")]
    NothingToOptimize,
    #[error("both cameras and points are held fixed")]
    NoFreeParameters,
    #[error("camera {cam} has no keypoint {key}, it has {len}")]
    KeyIndex { cam: usize, key: usize, len: usize },
    #[error("point {index} is out of range for {len} points")]
    PointIndex { index: usize, len: usize },
    #[error("optimized parameters were rejected: {0}")]
    Camera(#[from] CameraError),
}

/// Settings of [`bundle_adjust`].
///
/// The tolerances are passed to [`LevenbergMarquardt`] and must not be negative.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BundleAdjustOptions {
    /// Evaluation budget, in multiples of the number of parameters plus one.
    pub patience: usize,
    /// Relative reduction of the cost below which the optimization stops.
    pub ftol: f64,
    /// Relative change of the parameters below which the optimization stops.
    pub xtol: f64,
    /// Orthogonality between the residuals and the Jacobian below which the optimization stops.
    pub gtol: f64,
    pub optimize_cameras: bool,
    pub optimize_points: bool,
}

impl Default for BundleAdjustOptions {
    fn default() -> Self {
        Self {
            patience: 100,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 0.0,
            optimize_cameras: true,
            optimize_points: true,
        }
    }
}

impl BundleAdjustOptions {
    /// Refine only the points, keeping every camera fixed.
    pub fn points_only() -> Self {
        Self {
            optimize_cameras: false,
            ..Default::default()
        }
    }

    /// Refine only the cameras, keeping every point fixed.
    pub fn cameras_only() -> Self {
        Self {
            optimize_points: false,
            ..Default::default()
        }
    }

    pub fn patience(self, patience: usize) -> Self {
        Self { patience, ..self }
    }
}

/// Outcome of [`bundle_adjust`].
#[derive(Debug, PartialEq)]
pub struct BundleAdjustReport {
    /// Half the squared norm of the residuals before the optimization.
    pub initial_cost: f64,
    pub final_cost: f64,
    pub evaluations: usize,
    pub termination: TerminationReason,
    pub num_cams: usize,
    pub num_points: usize,
    pub num_residuals: usize,
    /// Whether the refined parameters were written to the dataset.
    pub applied: bool,
}

/// Jointly refines the registered cameras and the points they reconstruct.
///
/// The refined values are written back into `dataset` unless the optimization ended with a
/// higher or non-finite cost, in which case `dataset` is left as it was.
pub fn bundle_adjust(
    dataset: &mut Dataset,
    options: &BundleAdjustOptions,
) -> Result<BundleAdjustReport, OptimizeError> {
    let problem = BundleAdjuster::new(dataset, options)?;
    let initial_cost = problem.cost();
    info!(
        "performing Levenberg-Marquardt on {} cameras and {} points",
        problem.num_cams(),
        problem.num_points()
    );

    let (problem, report) = LevenbergMarquardt::new()
        .with_patience(options.patience)
        .with_ftol(options.ftol)
        .with_xtol(options.xtol)
        .with_gtol(options.gtol)
        .minimize(problem);
    let final_cost = problem.cost();
    info!(
        "Levenberg-Marquardt terminated with reason {:?}, cost {} -> {}",
        report.termination, initial_cost, final_cost
    );

    let applied = final_cost.is_finite() && final_cost <= initial_cost;
    if applied {
        problem.apply(dataset)?;
    } else {
        warn!("bundle adjustment did not improve the cost, keeping the previous estimate");
    }
    Ok(BundleAdjustReport {
        initial_cost,
        final_cost,
        evaluations: report.number_of_evaluations,
        termination: report.termination,
        num_cams: problem.num_cams(),
        num_points: problem.num_points(),
        num_residuals: problem.num_residuals(),
        applied,
    })
}
