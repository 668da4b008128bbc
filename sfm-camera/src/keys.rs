use crate::CameraError;
use nalgebra::Point2;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Length of the descriptors produced by the feature detector.
pub const DESCRIPTOR_DIM: usize = 128;

/// A detected feature location on an image.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct KeyPoint {
    /// Position in pixels, +x right and +y down from the top-left corner.
    pub point: Point2<f64>,
    /// The detection scale in pixels.
    pub scale: f32,
    /// The orientation angle in radians.
    pub orientation: f32,
}

impl KeyPoint {
    pub fn new(x: f64, y: f64, scale: f32, orientation: f32) -> Self {
        Self {
            point: Point2::new(x, y),
            scale,
            orientation,
        }
    }
}

/// Keypoints of one image along with their descriptors.
///
/// Descriptors are stored contiguously, one `descriptor_dim` long slice per keypoint in keypoint
/// order. The descriptors can be dropped with [`Features::clear_descriptors`] once matching is
/// done, the keypoints stay.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Features {
    keys: Vec<KeyPoint>,
    descriptor_dim: usize,
    descriptors: Vec<f32>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves room for `num` features with descriptors of length `dim`.
    pub fn reserve(&mut self, num: usize, dim: usize) {
        self.descriptor_dim = dim;
        self.keys.reserve(num);
        self.descriptors.reserve(num * dim);
    }

    /// Resizes to exactly `num` features with descriptors of length `dim`, zero filling.
    ///
    /// Existing features are discarded.
    pub fn resize(&mut self, num: usize, dim: usize) {
        self.descriptor_dim = dim;
        self.keys.clear();
        self.keys.resize(num, KeyPoint::new(0.0, 0.0, 0.0, 0.0));
        self.descriptors.clear();
        self.descriptors.resize(num * dim, 0.0);
    }

    /// Appends a feature.
    ///
    /// The first feature added to empty storage fixes the descriptor length if
    /// [`Features::reserve`] was not called.
    pub fn add_feature(&mut self, key: KeyPoint, descriptor: &[f32]) -> Result<(), CameraError> {
        if self.keys.is_empty() && self.descriptor_dim == 0 {
            self.descriptor_dim = descriptor.len();
        }
        if descriptor.len() != self.descriptor_dim {
            return Err(CameraError::DescriptorLength {
                expected: self.descriptor_dim,
                actual: descriptor.len(),
            });
        }
        self.keys.push(key);
        self.descriptors.extend_from_slice(descriptor);
        Ok(())
    }

    /// Overwrites the feature `ix` of storage previously sized with [`Features::resize`].
    pub fn set_feature(
        &mut self,
        ix: usize,
        key: KeyPoint,
        descriptor: &[f32],
    ) -> Result<(), CameraError> {
        if ix >= self.keys.len() {
            return Err(CameraError::FeatureIndex {
                index: ix,
                len: self.keys.len(),
            });
        }
        if descriptor.len() != self.descriptor_dim {
            return Err(CameraError::DescriptorLength {
                expected: self.descriptor_dim,
                actual: descriptor.len(),
            });
        }
        self.keys[ix] = key;
        let start = ix * self.descriptor_dim;
        self.descriptors[start..start + self.descriptor_dim].copy_from_slice(descriptor);
        Ok(())
    }

    /// Drops all descriptors while keeping the keypoints.
    pub fn clear_descriptors(&mut self) {
        self.descriptors = Vec::new();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[KeyPoint] {
        &self.keys
    }

    /// Position of the keypoint `ix` in pixels.
    pub fn key(&self, ix: usize) -> Point2<f64> {
        self.keys[ix].point
    }

    pub fn descriptor_dim(&self) -> usize {
        self.descriptor_dim
    }

    /// Whether descriptors are present, i.e. they were not cleared.
    pub fn has_descriptors(&self) -> bool {
        !self.descriptors.is_empty()
    }

    /// The descriptor of feature `ix`, `None` once descriptors were cleared.
    pub fn descriptor(&self, ix: usize) -> Option<&[f32]> {
        let start = ix * self.descriptor_dim;
        self.descriptors.get(start..start + self.descriptor_dim)
    }

    /// Iterates over all descriptors in keypoint order.
    pub fn descriptors(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.descriptors.chunks_exact(self.descriptor_dim.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_clear() {
        let mut features = Features::new();
        features.reserve(2, 3);
        features
            .add_feature(KeyPoint::new(1.0, 2.0, 1.5, 0.1), &[1.0, 2.0, 3.0])
            .unwrap();
        features
            .add_feature(KeyPoint::new(3.0, 4.0, 2.5, 0.2), &[4.0, 5.0, 6.0])
            .unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features.key(1), Point2::new(3.0, 4.0));
        assert_eq!(features.descriptor(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(features.descriptors().count(), 2);

        features.clear_descriptors();
        assert_eq!(features.len(), 2);
        assert!(!features.has_descriptors());
        assert_eq!(features.descriptor(0), None);
    }

    #[test]
    fn rejects_wrong_descriptor_length() {
        let mut features = Features::new();
        features.reserve(1, 4);
        let err = features
            .add_feature(KeyPoint::new(0.0, 0.0, 1.0, 0.0), &[1.0, 2.0])
            .unwrap_err();
        assert!(matches!(
            err,
            CameraError::DescriptorLength {
                expected: 4,
                actual: 2
            }
        ));
        assert!(features.is_empty());
    }

    #[test]
    fn resize_then_set() {
        let mut features = Features::new();
        features.resize(2, 2);
        features
            .set_feature(1, KeyPoint::new(5.0, 6.0, 1.0, 0.0), &[7.0, 8.0])
            .unwrap();
        assert_eq!(features.descriptor(0), Some(&[0.0, 0.0][..]));
        assert_eq!(features.descriptor(1), Some(&[7.0, 8.0][..]));
        assert!(features
            .set_feature(2, KeyPoint::new(0.0, 0.0, 1.0, 0.0), &[0.0, 0.0])
            .is_err());
    }
}
