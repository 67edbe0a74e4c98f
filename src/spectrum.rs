//! The minimal description of a single scan that the feature detection pipeline
//! consumes: an acquisition time and paired m/z and intensity arrays.
use thiserror::Error;

/// Describe whether the signal in a spectrum is a continuous profile or a list
/// of discrete, already centroided peaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i8)]
pub enum SignalContinuity {
    #[default]
    Unknown = 0,
    Centroid = 3,
    Profile = 5,
}

/// Errors that indicate a spectrum's signal arrays are malformed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    #[error("m/z array of length {mz_len} does not match size of intensity array of length {intensity_len}")]
    MZIntensityArraySizeMismatch { mz_len: usize, intensity_len: usize },
    #[error("m/z array is not sorted in ascending order at position {0}")]
    UnsortedMZArray(usize),
    #[error("Negative intensity {value} found at position {position}")]
    NegativeIntensity { position: usize, value: f64 },
    #[error("Non-finite value found in the signal arrays at position {0}")]
    NonFiniteValue(usize),
    #[error("Retention time {0} is not a finite number")]
    NonFiniteRetentionTime(f64),
}

/// A single spectrum as delivered by a [`SpectrumRunSource`](crate::source::SpectrumRunSource).
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectrumData {
    /// The scan start time
    pub retention_time: f64,
    /// The m/z array, sorted in ascending order
    pub mzs: Vec<f64>,
    /// The intensity array, parallel to [`SpectrumData::mzs`]
    pub intensities: Vec<f64>,
    pub ms_level: u8,
}

impl SpectrumData {
    pub fn new(retention_time: f64, mzs: Vec<f64>, intensities: Vec<f64>, ms_level: u8) -> Self {
        Self {
            retention_time,
            mzs,
            intensities,
            ms_level,
        }
    }

    /// The number of signal points in the spectrum
    pub fn len(&self) -> usize {
        self.mzs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mzs.is_empty()
    }

    /// The sum of all intensities
    pub fn tic(&self) -> f64 {
        self.intensities.iter().sum()
    }

    /// Check that the signal arrays are usable for peak extraction.
    ///
    /// # Errors
    /// - [`SpectrumError::NonFiniteRetentionTime`] if the retention time is `NaN` or infinite
    /// - [`SpectrumError::MZIntensityArraySizeMismatch`] if the arrays differ in length
    /// - [`SpectrumError::NonFiniteValue`] if any m/z or intensity is `NaN` or infinite
    /// - [`SpectrumError::UnsortedMZArray`] if an m/z value is smaller than its predecessor
    /// - [`SpectrumError::NegativeIntensity`] if any intensity is below zero
    pub fn validate(&self) -> Result<(), SpectrumError> {
        if !self.retention_time.is_finite() {
            return Err(SpectrumError::NonFiniteRetentionTime(self.retention_time));
        }
        if self.mzs.len() != self.intensities.len() {
            return Err(SpectrumError::MZIntensityArraySizeMismatch {
                mz_len: self.mzs.len(),
                intensity_len: self.intensities.len(),
            });
        }
        let mut last_mz = f64::NEG_INFINITY;
        for (i, (mz, inten)) in self.mzs.iter().zip(self.intensities.iter()).enumerate() {
            if !mz.is_finite() || !inten.is_finite() {
                return Err(SpectrumError::NonFiniteValue(i));
            }
            if *mz < last_mz {
                return Err(SpectrumError::UnsortedMZArray(i));
            }
            if *inten < 0.0 {
                return Err(SpectrumError::NegativeIntensity {
                    position: i,
                    value: *inten,
                });
            }
            last_mz = *mz;
        }
        Ok(())
    }
}
