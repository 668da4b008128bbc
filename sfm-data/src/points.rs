use crate::{NViewMatch, Pair, SplitNViewMatch, TrackError};
use itertools::izip;
use log::*;
use nalgebra::Point3;
use std::collections::BTreeMap;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum ObservationStatus {
    /// The camera is registered and the observation constrains the point.
    Reconstructed,
    /// The camera is not registered yet.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Observation {
    /// Keypoint index in the observing camera.
    pub key: usize,
    pub status: ObservationStatus,
}

/// The observations of one 3d point.
///
/// Each camera appears at most once and is either reconstructed or pending, so the two sets are
/// disjoint. Observations are never added to an existing track. They only change from pending to
/// reconstructed or are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Track {
    observations: BTreeMap<usize, Observation>,
}

impl Track {
    fn from_split(point: usize, split: &SplitNViewMatch) -> Result<Self, TrackError> {
        if let Some(&cam) = split
            .observed
            .keys()
            .find(|&cam| split.unobserved.contains_key(cam))
        {
            return Err(TrackError::OverlappingPartition { point, cam });
        }
        let reconstructed = split.observed.iter().map(|(&cam, &key)| {
            let status = ObservationStatus::Reconstructed;
            (cam, Observation { key, status })
        });
        let pending = split.unobserved.iter().map(|(&cam, &key)| {
            let status = ObservationStatus::Pending;
            (cam, Observation { key, status })
        });
        Ok(Self {
            observations: reconstructed.chain(pending).collect(),
        })
    }

    /// Seeds a track from a match triangulated in the cameras of `pair`.
    fn from_match(pair: Pair, n_view_match: &NViewMatch) -> Self {
        let observations = n_view_match
            .iter()
            .map(|(&cam, &key)| {
                let status = if pair.contains(cam) {
                    ObservationStatus::Reconstructed
                } else {
                    ObservationStatus::Pending
                };
                (cam, Observation { key, status })
            })
            .collect();
        Self { observations }
    }

    /// All observations ordered by camera index.
    pub fn observations(&self) -> impl Iterator<Item = (usize, Observation)> + '_ {
        self.observations.iter().map(|(&cam, &obs)| (cam, obs))
    }

    pub fn observation(&self, cam: usize) -> Option<Observation> {
        self.observations.get(&cam).copied()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// `(camera, key)` of the observations in registered cameras.
    pub fn reconstructed(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.with_status(ObservationStatus::Reconstructed)
    }

    /// `(camera, key)` of the observations in cameras not registered yet.
    pub fn to_reconstruct(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.with_status(ObservationStatus::Pending)
    }

    pub fn reconstructed_match(&self) -> NViewMatch {
        self.reconstructed().collect()
    }

    pub fn to_reconstruct_match(&self) -> NViewMatch {
        self.to_reconstruct().collect()
    }

    pub fn num_reconstructed(&self) -> usize {
        self.reconstructed().count()
    }

    pub fn is_reconstructed_in(&self, cam: usize) -> bool {
        self.status(cam) == Some(ObservationStatus::Reconstructed)
    }

    pub fn is_pending_in(&self, cam: usize) -> bool {
        self.status(cam) == Some(ObservationStatus::Pending)
    }

    fn status(&self, cam: usize) -> Option<ObservationStatus> {
        self.observations.get(&cam).map(|obs| obs.status)
    }

    fn with_status(&self, status: ObservationStatus) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.observations
            .iter()
            .filter(move |(_, obs)| obs.status == status)
            .map(|(&cam, obs)| (cam, obs.key))
    }

    /// Turns the pending observation in `cam` into a reconstructed one.
    fn promote(&mut self, cam: usize) -> bool {
        match self.observations.get_mut(&cam) {
            Some(obs) if obs.status == ObservationStatus::Pending => {
                obs.status = ObservationStatus::Reconstructed;
                true
            }
            _ => false,
        }
    }

    /// Drops the observation in `cam` if it is still pending.
    fn discard_pending(&mut self, cam: usize) -> bool {
        if self.is_pending_in(cam) {
            self.observations.remove(&cam);
            true
        } else {
            false
        }
    }
}

/// The track store: 3d point estimates, their observations, and the matches that were not
/// triangulated yet.
///
/// Point coordinates and tracks are index aligned and always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Points {
    coords: Vec<Point3<f64>>,
    tracks: Vec<Track>,
    matches_to_reconstruct: Vec<NViewMatch>,
}

impl Points {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_pts(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn coords(&self) -> &[Point3<f64>] {
        &self.coords
    }

    /// Mutable view of all point coordinates, used to write back optimized values.
    ///
    /// The borrow ends before any call that adds or removes points.
    pub fn coords_mut(&mut self) -> &mut [Point3<f64>] {
        &mut self.coords
    }

    pub fn coord(&self, point: usize) -> Option<&Point3<f64>> {
        self.coords.get(point)
    }

    pub fn coord_mut(&mut self, point: usize) -> Option<&mut Point3<f64>> {
        self.coords.get_mut(point)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, point: usize) -> Option<&Track> {
        self.tracks.get(point)
    }

    /// Points with a pending observation in `cam`.
    ///
    /// These are the candidates handed to camera registration.
    pub fn pending_in(&self, cam: usize) -> Vec<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, track)| track.is_pending_in(cam))
            .map(|(point, _)| point)
            .collect()
    }

    /// Matches that were not turned into points yet.
    pub fn matches_to_reconstruct(&self) -> &[NViewMatch] {
        &self.matches_to_reconstruct
    }

    pub fn matches_to_reconstruct_mut(&mut self) -> &mut Vec<NViewMatch> {
        &mut self.matches_to_reconstruct
    }

    /// Creates one point per coordinate from the matches at `match_ixs`, which were triangulated
    /// in the two cameras of `pair`.
    ///
    /// The new track has the observations in `pair` reconstructed and every other observation of
    /// the match pending. The consumed matches are removed from the matches to reconstruct,
    /// keeping the order of the remaining ones.
    pub fn add_points_from_matches(
        &mut self,
        pair: Pair,
        match_ixs: &[usize],
        coords: &[Point3<f64>],
    ) -> Result<(), TrackError> {
        if match_ixs.len() != coords.len() {
            return Err(TrackError::LengthMismatch {
                indices: match_ixs.len(),
                coords: coords.len(),
            });
        }
        if pair.first() == pair.second() {
            return Err(TrackError::DegeneratePair { cam: pair.first() });
        }
        let len = self.matches_to_reconstruct.len();
        let mut consumed = vec![false; len];
        for &match_index in match_ixs {
            let n_view_match = self
                .matches_to_reconstruct
                .get(match_index)
                .ok_or(TrackError::MatchIndex {
                    index: match_index,
                    len,
                })?;
            for cam in [pair.first(), pair.second()] {
                if !n_view_match.contains_key(&cam) {
                    return Err(TrackError::MissingObservation { match_index, cam });
                }
            }
            if std::mem::replace(&mut consumed[match_index], true) {
                return Err(TrackError::DuplicateMatchIndex { index: match_index });
            }
        }

        self.coords.extend_from_slice(coords);
        self.tracks.extend(
            match_ixs
                .iter()
                .map(|&ix| Track::from_match(pair, &self.matches_to_reconstruct[ix])),
        );

        let mut consumed = consumed.into_iter();
        self.matches_to_reconstruct
            .retain(|_| !consumed.next().unwrap_or(false));
        debug!(
            "added {} points from cameras {} and {}, {} matches left to reconstruct",
            coords.len(),
            pair.first(),
            pair.second(),
            self.matches_to_reconstruct.len()
        );
        Ok(())
    }

    /// Creates one point per coordinate with an already partitioned set of observations.
    pub fn add_points(
        &mut self,
        coords: &[Point3<f64>],
        splits: &[SplitNViewMatch],
    ) -> Result<(), TrackError> {
        if splits.len() != coords.len() {
            return Err(TrackError::LengthMismatch {
                indices: splits.len(),
                coords: coords.len(),
            });
        }
        let tracks = splits
            .iter()
            .enumerate()
            .map(|(point, split)| Track::from_split(point, split))
            .collect::<Result<Vec<_>, _>>()?;
        self.coords.extend_from_slice(coords);
        self.tracks.extend(tracks);
        debug!("imported {} points", coords.len());
        Ok(())
    }

    /// Keeps the points flagged in `keep`, preserving their relative order.
    pub fn remove_points(&mut self, keep: &[bool]) -> Result<(), TrackError> {
        if keep.len() != self.num_pts() {
            return Err(TrackError::MaskLength {
                expected: self.num_pts(),
                actual: keep.len(),
            });
        }
        let before = self.num_pts();
        let (coords, tracks): (Vec<_>, Vec<_>) =
            izip!(self.coords.drain(..), self.tracks.drain(..), keep)
                .filter(|&(_, _, &kept)| kept)
                .map(|(coord, track, _)| (coord, track))
                .unzip();
        self.coords = coords;
        self.tracks = tracks;
        debug!("removed {} of {} points", before - self.num_pts(), before);
        Ok(())
    }

    /// Promotes every pending observation in `cam` to reconstructed.
    ///
    /// Tracks without a pending observation in `cam` are left alone. Returns the number of
    /// promoted observations.
    pub fn mark_cam_as_reconstructed(&mut self, cam: usize) -> usize {
        let promoted = self
            .tracks
            .iter_mut()
            .map(|track| track.promote(cam))
            .filter(|&promoted| promoted)
            .count();
        debug!("camera {} promoted {} observations", cam, promoted);
        promoted
    }

    /// Registers `cam` against the points `candidates`, of which only `inliers` (indices into
    /// `candidates`) were confirmed.
    ///
    /// Inlier observations in `cam` become reconstructed. The pending observation in `cam` of
    /// every other candidate is dropped for good: it does not come back when the point is
    /// looked at again.
    pub fn mark_cam_as_reconstructed_with_inliers(
        &mut self,
        cam: usize,
        candidates: &[usize],
        inliers: &[usize],
    ) -> Result<(), TrackError> {
        let len = self.num_pts();
        if let Some(&index) = candidates.iter().find(|&&point| point >= len) {
            return Err(TrackError::PointIndex { index, len });
        }
        for &inlier in inliers {
            let point = *candidates.get(inlier).ok_or(TrackError::InlierIndex {
                index: inlier,
                len: candidates.len(),
            })?;
            if !self.tracks[point].is_pending_in(cam) {
                return Err(TrackError::NotPending { point, cam });
            }
        }

        for &inlier in inliers {
            self.tracks[candidates[inlier]].promote(cam);
        }
        let discarded = candidates
            .iter()
            .filter(|&&point| self.tracks[point].discard_pending(cam))
            .count();
        debug!(
            "camera {} promoted {} of {} candidate observations, discarded {}",
            cam,
            inliers.len(),
            candidates.len(),
            discarded
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    fn points_with_tracks() -> Points {
        let mut points = Points::new();
        let splits = [
            SplitNViewMatch {
                observed: hashmap! {0 => 10, 1 => 11},
                unobserved: hashmap! {2 => 12, 3 => 13},
            },
            SplitNViewMatch {
                observed: hashmap! {0 => 20, 1 => 21},
                unobserved: hashmap! {2 => 22},
            },
            SplitNViewMatch {
                observed: hashmap! {0 => 30, 3 => 31},
                unobserved: hashmap! {1 => 32},
            },
        ];
        let coords = [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(2.0, 0.0, 1.0),
        ];
        points.add_points(&coords, &splits).unwrap();
        points
    }

    fn assert_disjoint(points: &Points) {
        for track in points.tracks() {
            let reconstructed = track.reconstructed_match();
            assert!(track
                .to_reconstruct()
                .all(|(cam, _)| !reconstructed.contains_key(&cam)));
        }
    }

    #[test]
    fn seed_from_match() {
        let mut points = Points::new();
        points.matches_to_reconstruct_mut().extend([
            hashmap! {0 => 1, 1 => 2},
            hashmap! {0 => 5, 1 => 6, 2 => 7},
            hashmap! {1 => 3, 2 => 4},
        ]);
        points
            .add_points_from_matches(Pair::new(1, 0), &[1], &[Point3::new(0.0, 1.0, 5.0)])
            .unwrap();
        let track = &points.tracks()[0];
        assert_eq!(track.reconstructed_match(), hashmap! {0 => 5, 1 => 6});
        assert_eq!(track.to_reconstruct_match(), hashmap! {2 => 7});
        assert_eq!(
            points.matches_to_reconstruct(),
            &[hashmap! {0 => 1, 1 => 2}, hashmap! {1 => 3, 2 => 4}]
        );
    }

    #[test]
    fn seed_rejects_missing_camera() {
        let mut points = Points::new();
        points
            .matches_to_reconstruct_mut()
            .extend([hashmap! {0 => 1, 1 => 2}, hashmap! {1 => 3, 2 => 4}]);
        let before = points.clone();
        let coords = [Point3::origin(), Point3::origin()];
        assert_eq!(
            points.add_points_from_matches(Pair::new(0, 1), &[0, 1], &coords),
            Err(TrackError::MissingObservation {
                match_index: 1,
                cam: 0
            })
        );
        assert_eq!(
            points.add_points_from_matches(Pair::new(0, 1), &[0, 2], &coords),
            Err(TrackError::MatchIndex { index: 2, len: 2 })
        );
        assert_eq!(
            points.add_points_from_matches(Pair::new(0, 1), &[0], &coords),
            Err(TrackError::LengthMismatch {
                indices: 1,
                coords: 2
            })
        );
        assert_eq!(points, before);
    }

    #[test]
    fn seed_rejects_repeated_match_and_single_camera() {
        let mut points = Points::new();
        points
            .matches_to_reconstruct_mut()
            .extend([hashmap! {0 => 1, 1 => 2, 2 => 3}, hashmap! {0 => 4, 1 => 5}]);
        let before = points.clone();
        let coords = [Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert_eq!(
            points.add_points_from_matches(Pair::new(0, 1), &[0, 0], &coords),
            Err(TrackError::DuplicateMatchIndex { index: 0 })
        );
        assert_eq!(
            points.add_points_from_matches(Pair::new(1, 1), &[0, 1], &coords),
            Err(TrackError::DegeneratePair { cam: 1 })
        );
        assert_eq!(points, before);

        points
            .add_points_from_matches(Pair::new(1, 0), &[1, 0], &coords)
            .unwrap();
        assert_eq!(points.num_pts(), 2);
        assert!(points.matches_to_reconstruct().is_empty());
        assert_eq!(points.tracks()[0].num_reconstructed(), 2);
        assert!(points.tracks()[1].is_pending_in(2));
    }

    #[test]
    fn import_rejects_overlap() {
        let mut points = Points::new();
        let split = SplitNViewMatch {
            observed: hashmap! {0 => 1},
            unobserved: hashmap! {0 => 2},
        };
        assert_eq!(
            points.add_points(&[Point3::origin()], &[split]),
            Err(TrackError::OverlappingPartition { point: 0, cam: 0 })
        );
        assert!(points.is_empty());
    }

    #[test]
    fn remove_keeps_order() {
        let mut points = points_with_tracks();
        points.remove_points(&[true, false, true]).unwrap();
        assert_eq!(points.num_pts(), 2);
        assert_eq!(points.tracks().len(), 2);
        assert_eq!(points.coords()[0].x, 0.0);
        assert_eq!(points.coords()[1].x, 2.0);
        assert_eq!(points.tracks()[1].observation(3).unwrap().key, 31);
    }

    #[test]
    fn remove_checks_mask_length() {
        let mut points = points_with_tracks();
        assert_eq!(
            points.remove_points(&[true]),
            Err(TrackError::MaskLength {
                expected: 3,
                actual: 1
            })
        );
        assert_eq!(points.num_pts(), 3);
    }

    #[test]
    fn unconditional_registration() {
        let mut points = points_with_tracks();
        assert_eq!(points.mark_cam_as_reconstructed(2), 2);
        for track in points.tracks() {
            assert!(!track.is_pending_in(2));
        }
        assert_eq!(points.tracks()[0].reconstructed_match()[&2], 12);
        // Point 2 never saw camera 2.
        assert_eq!(points.tracks()[2].observation(2), None);
        assert_disjoint(&points);
    }

    #[test]
    fn registration_with_inliers() {
        let mut points = points_with_tracks();
        points
            .mark_cam_as_reconstructed_with_inliers(2, &[0, 1], &[1])
            .unwrap();
        let outlier = &points.tracks()[0];
        assert_eq!(outlier.observation(2), None);
        assert_eq!(outlier.to_reconstruct_match(), hashmap! {3 => 13});
        let inlier = &points.tracks()[1];
        assert!(inlier.is_reconstructed_in(2));
        assert_eq!(inlier.reconstructed_match()[&2], 22);
        assert_disjoint(&points);

        // The discarded observation does not come back.
        points.mark_cam_as_reconstructed(2);
        assert_eq!(points.tracks()[0].observation(2), None);
    }

    #[test]
    fn registration_with_inliers_validates_first() {
        let mut points = points_with_tracks();
        let before = points.clone();
        assert_eq!(
            points.mark_cam_as_reconstructed_with_inliers(2, &[0, 5], &[0]),
            Err(TrackError::PointIndex { index: 5, len: 3 })
        );
        assert_eq!(
            points.mark_cam_as_reconstructed_with_inliers(2, &[0, 1], &[2]),
            Err(TrackError::InlierIndex { index: 2, len: 2 })
        );
        assert_eq!(
            points.mark_cam_as_reconstructed_with_inliers(2, &[0, 2], &[0, 1]),
            Err(TrackError::NotPending { point: 2, cam: 2 })
        );
        assert_eq!(points, before);
    }

    #[test]
    fn pending_candidates() {
        let points = points_with_tracks();
        assert_eq!(points.pending_in(2), vec![0, 1]);
        assert_eq!(points.pending_in(1), vec![2]);
        assert!(points.pending_in(0).is_empty());
    }

    #[test]
    fn coordinate_view_is_writable() {
        let mut points = points_with_tracks();
        *points.coord_mut(1).unwrap() = Point3::new(4.0, 5.0, 6.0);
        points.coords_mut()[2].z = -1.0;
        assert_eq!(points.coord(1), Some(&Point3::new(4.0, 5.0, 6.0)));
        assert_eq!(points.coords()[2].z, -1.0);
        assert_eq!(points.coord(3), None);
    }
}
