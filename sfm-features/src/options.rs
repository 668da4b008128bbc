use std::fmt;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Tuning of the SIFT detector.
///
/// Options left at `None` are not passed to the detector, which then uses its own default.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct DetectorOptions {
    /// Images larger than this are downsampled before detection.
    pub max_working_dimension: Option<u32>,
    /// The first octave of the pyramid. `-1` upsamples the image first.
    pub first_octave: i32,
    pub max_octaves: Option<u32>,
    /// Difference of Gaussian levels per octave.
    pub dog_levels_in_an_octave: Option<u32>,
    /// Difference of Gaussian threshold.
    pub dog_threshold: Option<f64>,
    /// Edge threshold.
    pub edge_threshold: Option<f64>,
    /// Detect a single orientation per keypoint, pointing up.
    pub detect_upright: bool,
    pub verbosity: u32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_working_dimension: None,
            first_octave: 0,
            max_octaves: None,
            dog_levels_in_an_octave: None,
            dog_threshold: None,
            edge_threshold: None,
            detect_upright: false,
            verbosity: 0,
        }
    }
}

impl DetectorOptions {
    /// Default options with upright detection enabled.
    pub fn upright() -> Self {
        Self {
            detect_upright: true,
            ..Default::default()
        }
    }

    pub fn max_working_dimension(self, max_working_dimension: u32) -> Self {
        Self {
            max_working_dimension: Some(max_working_dimension),
            ..self
        }
    }

    pub fn dog_threshold(self, dog_threshold: f64) -> Self {
        Self {
            dog_threshold: Some(dog_threshold),
            ..self
        }
    }

    pub fn edge_threshold(self, edge_threshold: f64) -> Self {
        Self {
            edge_threshold: Some(edge_threshold),
            ..self
        }
    }

    /// Renders the options as a SiftGPU style argument list.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-fo".to_owned(), self.first_octave.to_string()];
        let mut push = |flag: &str, value: Option<String>| {
            if let Some(value) = value {
                args.push(flag.to_owned());
                args.push(value);
            }
        };
        push("-maxd", self.max_working_dimension.map(|v| v.to_string()));
        push("-no", self.max_octaves.map(|v| v.to_string()));
        push("-d", self.dog_levels_in_an_octave.map(|v| v.to_string()));
        push("-t", self.dog_threshold.map(|v| v.to_string()));
        push("-e", self.edge_threshold.map(|v| v.to_string()));
        if self.detect_upright {
            // Fixed orientation and at most one orientation per keypoint.
            args.extend(["-ofix", "-m", "-mo", "1"].map(str::to_owned));
        }
        args.push("-v".to_owned());
        args.push(self.verbosity.to_string());
        args
    }
}

struct OrUnset<T>(Option<T>);

impl<T: fmt::Display> fmt::Display for OrUnset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => value.fmt(f),
            None => f.write_str("unset"),
        }
    }
}

impl fmt::Display for DetectorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            " max_working_dimension: {}",
            OrUnset(self.max_working_dimension)
        )?;
        writeln!(f, " first_octave: {}", self.first_octave)?;
        writeln!(f, " max_octaves: {}", OrUnset(self.max_octaves))?;
        writeln!(
            f,
            " dog_levels_in_an_octave: {}",
            OrUnset(self.dog_levels_in_an_octave)
        )?;
        writeln!(f, " dog_threshold: {}", OrUnset(self.dog_threshold))?;
        writeln!(f, " edge_threshold: {}", OrUnset(self.edge_threshold))?;
        writeln!(f, " detect_upright: {}", self.detect_upright)?;
        writeln!(f, " verbosity: {}", self.verbosity)
    }
}
