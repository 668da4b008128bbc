//! Bookkeeping for incremental structure from motion.
//!
//! A reconstruction grows one camera at a time. Every 3d point candidate (a track) remembers which
//! cameras observed it, split into cameras that are already registered and cameras that are still
//! pending. Registering a camera moves its observations from pending to reconstructed, or drops
//! them when they were rejected as outliers. [`Points`] holds the tracks and [`Dataset`] ties them
//! together with the cameras and the pairwise matches.

mod dataset;
mod error;
mod points;

pub use dataset::*;
pub use error::*;
pub use points::*;

pub use sfm_camera;

use std::collections::HashMap;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Observations of one physical point, from camera index to keypoint index in that camera.
pub type NViewMatch = HashMap<usize, usize>;

/// An [`NViewMatch`] partitioned into the observations in registered cameras and the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct SplitNViewMatch {
    pub observed: NViewMatch,
    pub unobserved: NViewMatch,
}

/// An unordered pair of camera indices.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Pair(usize, usize);

impl Pair {
    /// Creates a new pair, canonicalizing the order of the pair.
    pub fn new(a: usize, b: usize) -> Self {
        Self(std::cmp::min(a, b), std::cmp::max(a, b))
    }

    /// The smaller camera index.
    pub fn first(&self) -> usize {
        self.0
    }

    /// The larger camera index.
    pub fn second(&self) -> usize {
        self.1
    }

    pub fn contains(&self, cam: usize) -> bool {
        self.0 == cam || self.1 == cam
    }
}

/// Feature matches between the two cameras of a [`Pair`].
///
/// Each match is `(key in the first camera, key in the second camera)`, in the order of
/// [`Pair::first`] and [`Pair::second`]. `dists` holds the descriptor distance of every match.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraPair {
    pub matches: Vec<(usize, usize)>,
    pub dists: Vec<f64>,
}

impl CameraPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, first_key: usize, second_key: usize, dist: f64) {
        self.matches.push((first_key, second_key));
        self.dists.push(dist);
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Keeps only the matches flagged in `keep`, along with their distances.
    ///
    /// `keep` must have one flag per match, otherwise nothing is removed.
    pub fn retain(&mut self, keep: &[bool]) -> Result<(), TrackError> {
        if keep.len() != self.len() {
            return Err(TrackError::MaskLength {
                expected: self.len(),
                actual: keep.len(),
            });
        }
        let (matches, dists) = self
            .matches
            .iter()
            .zip(&self.dists)
            .zip(keep)
            .filter(|&(_, &keep)| keep)
            .map(|((&m, &d), _)| (m, d))
            .unzip();
        self.matches = matches;
        self.dists = dists;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_unordered() {
        assert_eq!(Pair::new(4, 1), Pair::new(1, 4));
        let pair = Pair::new(7, 2);
        assert_eq!((pair.first(), pair.second()), (2, 7));
        assert!(pair.contains(7));
        assert!(!pair.contains(3));
    }

    #[test]
    fn camera_pair_retain() {
        let mut pair = CameraPair::new();
        pair.push(0, 5, 0.1);
        pair.push(1, 6, 0.2);
        pair.push(2, 7, 0.3);
        assert_eq!(
            pair.retain(&[true, false]),
            Err(TrackError::MaskLength {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(pair.len(), 3);
        pair.retain(&[true, false, true]).unwrap();
        assert_eq!(pair.matches, vec![(0, 5), (2, 7)]);
        assert_eq!(pair.dists, vec![0.1, 0.3]);
    }
}
