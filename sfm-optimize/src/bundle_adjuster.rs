use crate::{BundleAdjustOptions, OptimizeError};
use levenberg_marquardt::LeastSquaresProblem;
use log::*;
use nalgebra::{DMatrix, DVector, Dyn, Point3, VecStorage, U1};
use sfm_camera::CostFunction;
use sfm_data::Dataset;

/// Where the values of a parameter block of a residual come from.
#[derive(Debug, Clone, Copy)]
enum Block {
    /// A range of the optimized parameter vector.
    Free { offset: usize, len: usize },
    /// An entry of `BundleAdjuster::fixed`.
    Fixed(usize),
}

struct Term {
    cost: Box<dyn CostFunction>,
    blocks: Vec<Block>,
    /// First row of this term in the residual vector.
    row: usize,
}

/// Bundle adjustment of the registered cameras and the points they reconstruct.
///
/// The parameter vector holds the parameters of every registered camera followed by the
/// coordinates of every point with at least one observation in a registered camera. Either part
/// can be held fixed through [`BundleAdjustOptions`], in which case it is left out of the
/// parameter vector. There is one reprojection residual per reconstructed observation and one
/// constraint residual per optimized camera that has constrained parameters.
pub struct BundleAdjuster {
    params: DVector<f64>,
    fixed: Vec<Vec<f64>>,
    terms: Vec<Term>,
    num_residuals: usize,
    /// `(camera index, block)` of every registered camera.
    cams: Vec<(usize, Block)>,
    /// `(point index, block)` of every adjusted point.
    points: Vec<(usize, Block)>,
}

impl BundleAdjuster {
    pub fn new(dataset: &Dataset, options: &BundleAdjustOptions) -> Result<Self, OptimizeError> {
        let mut params = vec![];
        let mut fixed = vec![];
        let mut add_block = |values: &[f64], free: bool| {
            if free {
                let offset = params.len();
                params.extend_from_slice(values);
                Block::Free {
                    offset,
                    len: values.len(),
                }
            } else {
                fixed.push(values.to_vec());
                Block::Fixed(fixed.len() - 1)
            }
        };

        let registered: Vec<usize> = dataset
            .reconstructed_cams()
            .iter()
            .copied()
            .filter(|&cam| cam < dataset.num_cams())
            .collect();
        let mut cam_blocks = vec![None; dataset.num_cams()];
        let mut cams = Vec::with_capacity(registered.len());
        for &cam in &registered {
            let block = add_block(&dataset.cam(cam).params(), options.optimize_cameras);
            cam_blocks[cam] = Some(block);
            cams.push((cam, block));
        }

        let mut terms = vec![];
        let mut num_residuals = 0;
        let mut push_term = |cost: Box<dyn CostFunction>, blocks: Vec<Block>| {
            let rows = cost.num_residuals();
            terms.push(Term {
                cost,
                blocks,
                row: num_residuals,
            });
            num_residuals += rows;
        };

        let mut points = vec![];
        let dataset_points = dataset.points();
        for (point, (coord, track)) in dataset_points
            .coords()
            .iter()
            .zip(dataset_points.tracks())
            .enumerate()
        {
            let observations: Vec<(usize, usize, Block)> = track
                .reconstructed()
                .filter_map(|(cam, key)| Some((cam, key, cam_blocks.get(cam).copied()??)))
                .collect();
            if observations.is_empty() {
                continue;
            }
            let point_block = add_block(coord.coords.as_slice(), options.optimize_points);
            points.push((point, point_block));
            for (cam, key, cam_block) in observations {
                let len = dataset.cam(cam).features().len();
                if key >= len {
                    return Err(OptimizeError::KeyIndex { cam, key, len });
                }
                push_term(
                    dataset.cam(cam).cost_function(key),
                    vec![cam_block, point_block],
                );
            }
        }
        for &(cam, block) in &cams {
            let cost = dataset.cam(cam).constraints_cost_function();
            if matches!(block, Block::Free { .. }) && cost.num_residuals() > 0 {
                push_term(cost, vec![block]);
            }
        }

        if num_residuals == 0 {
            return Err(OptimizeError::NothingToOptimize);
        }
        if params.is_empty() {
            return Err(OptimizeError::NoFreeParameters);
        }
        debug!(
            "bundle adjusting {} cameras and {} points with {} parameters and {} residuals",
            cams.len(),
            points.len(),
            params.len(),
            num_residuals
        );
        Ok(Self {
            params: DVector::from_vec(params),
            fixed,
            terms,
            num_residuals,
            cams,
            points,
        })
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    pub fn num_cams(&self) -> usize {
        self.cams.len()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Half the squared norm of the residual vector at the current parameters.
    pub fn cost(&self) -> f64 {
        0.5 * self.evaluate_residuals().norm_squared()
    }

    /// Writes the current parameters back into `dataset`.
    ///
    /// `dataset` must be the dataset this problem was built from, with no cameras or points added
    /// or removed since.
    pub fn apply(&self, dataset: &mut Dataset) -> Result<(), OptimizeError> {
        for &(cam, block) in &self.cams {
            if let Block::Free { .. } = block {
                dataset.cam_mut(cam).set_params(self.values(block))?;
            }
        }
        for &(point, block) in &self.points {
            if let Block::Free { .. } = block {
                let values = self.values(block);
                let len = dataset.points().num_pts();
                let coord = dataset
                    .points_mut()
                    .coord_mut(point)
                    .ok_or(OptimizeError::PointIndex { index: point, len })?;
                *coord = Point3::new(values[0], values[1], values[2]);
            }
        }
        Ok(())
    }

    fn values(&self, block: Block) -> &[f64] {
        match block {
            Block::Free { offset, len } => &self.params.as_slice()[offset..offset + len],
            Block::Fixed(ix) => &self.fixed[ix],
        }
    }

    fn term_values(&self, term: &Term) -> Vec<&[f64]> {
        term.blocks.iter().map(|&block| self.values(block)).collect()
    }

    fn evaluate_residuals(&self) -> DVector<f64> {
        let mut residuals = DVector::zeros(self.num_residuals);
        for term in &self.terms {
            let values = term.cost.residuals(&self.term_values(term));
            residuals.rows_mut(term.row, values.len()).copy_from(&values);
        }
        residuals
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for BundleAdjuster {
    type ResidualStorage = VecStorage<f64, Dyn, U1>;
    type JacobianStorage = VecStorage<f64, Dyn, Dyn>;
    type ParameterStorage = VecStorage<f64, Dyn, U1>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.evaluate_residuals())
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jacobian = DMatrix::zeros(self.num_residuals, self.params.len());
        for term in &self.terms {
            let rows = term.cost.num_residuals();
            let block_jacobians = term.cost.jacobians(&self.term_values(term));
            for (block, block_jacobian) in term.blocks.iter().zip(&block_jacobians) {
                if let Block::Free { offset, len } = *block {
                    jacobian
                        .view_mut((term.row, offset), (rows, len))
                        .copy_from(block_jacobian);
                }
            }
        }
        Some(jacobian)
    }
}
