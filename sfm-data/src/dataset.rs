use crate::{CameraPair, DatasetError, Pair, Points};
use log::*;
use sfm_camera::Camera;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Everything known about one reconstruction: the cameras, their pairwise matches, the tracks and
/// which cameras are registered.
///
/// Cloning a dataset deep copies every camera, so the clone can be modified independently.
/// Registration goes through `&mut self` and updates the registered set and the tracks within
/// the same call, so a reader never sees one updated without the other.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    dir: PathBuf,
    cams: Vec<Box<dyn Camera>>,
    pairs: HashMap<Pair, CameraPair>,
    reconstructed_cams: BTreeSet<usize>,
    points: Points,
}

impl Dataset {
    /// Creates an empty dataset for the images in `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Adds a camera and returns its index.
    pub fn add_camera(&mut self, cam: Box<dyn Camera>) -> usize {
        self.cams.push(cam);
        self.cams.len() - 1
    }

    pub fn num_cams(&self) -> usize {
        self.cams.len()
    }

    /// # Panics
    ///
    /// Panics if `ix` is not a camera index.
    pub fn cam(&self, ix: usize) -> &dyn Camera {
        &*self.cams[ix]
    }

    /// # Panics
    ///
    /// Panics if `ix` is not a camera index.
    pub fn cam_mut(&mut self, ix: usize) -> &mut dyn Camera {
        &mut *self.cams[ix]
    }

    pub fn cams(&self) -> &[Box<dyn Camera>] {
        &self.cams
    }

    pub fn cams_mut(&mut self) -> &mut [Box<dyn Camera>] {
        &mut self.cams
    }

    pub fn pairs(&self) -> &HashMap<Pair, CameraPair> {
        &self.pairs
    }

    pub fn pairs_mut(&mut self) -> &mut HashMap<Pair, CameraPair> {
        &mut self.pairs
    }

    /// The matches between cameras `a` and `b`, in either order.
    pub fn pair(&self, a: usize, b: usize) -> Option<&CameraPair> {
        self.pairs.get(&Pair::new(a, b))
    }

    pub fn reconstructed_cams(&self) -> &BTreeSet<usize> {
        &self.reconstructed_cams
    }

    pub fn is_reconstructed(&self, cam: usize) -> bool {
        self.reconstructed_cams.contains(&cam)
    }

    pub fn points(&self) -> &Points {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut Points {
        &mut self.points
    }

    /// Drops the descriptors of every camera once matching is done.
    pub fn clear_descriptors(&mut self) {
        for cam in &mut self.cams {
            cam.features_mut().clear_descriptors();
        }
    }

    /// Registers `cam` and promotes all of its pending observations.
    ///
    /// Returns the number of promoted observations.
    pub fn mark_cam_as_reconstructed(&mut self, cam: usize) -> Result<usize, DatasetError> {
        self.check_cam(cam)?;
        self.reconstructed_cams.insert(cam);
        let promoted = self.points.mark_cam_as_reconstructed(cam);
        info!("registered camera {} with {} observations", cam, promoted);
        Ok(promoted)
    }

    /// Registers `cam` against the points `candidates`, of which `inliers` (indices into
    /// `candidates`) were confirmed.
    ///
    /// See [`Points::mark_cam_as_reconstructed_with_inliers`]. On error neither the registered
    /// set nor the tracks change.
    pub fn mark_cam_as_reconstructed_with_inliers(
        &mut self,
        cam: usize,
        candidates: &[usize],
        inliers: &[usize],
    ) -> Result<(), DatasetError> {
        self.check_cam(cam)?;
        self.points
            .mark_cam_as_reconstructed_with_inliers(cam, candidates, inliers)?;
        self.reconstructed_cams.insert(cam);
        info!(
            "registered camera {} with {} of {} candidate observations",
            cam,
            inliers.len(),
            candidates.len()
        );
        Ok(())
    }

    fn check_cam(&self, cam: usize) -> Result<(), DatasetError> {
        if cam >= self.cams.len() {
            return Err(DatasetError::CameraIndex {
                index: cam,
                len: self.cams.len(),
            });
        }
        Ok(())
    }
}
