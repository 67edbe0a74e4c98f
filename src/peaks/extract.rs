use log::trace;

use super::noise::{NoiseFloor, NoiseThreshold};
use super::peak::{ExtractedScan, Peak, PeakList};
use crate::config::{check_non_negative, ConfigurationError};
use crate::spectrum::{SignalContinuity, SpectrumData, SpectrumError};

/// A strategy for turning one spectrum's signal arrays into a list of peaks.
///
/// Implementations must be pure functions of the spectrum and their own
/// configuration, so that many spectra may be processed concurrently.
pub trait PeakExtractor: Send + Sync {
    /// Detect the peaks in `spectrum`, labeling each with `scan_index`.
    ///
    /// An empty spectrum, or one with no signal above the noise floor, produces
    /// an empty [`ExtractedScan`], not an error.
    fn extract(
        &self,
        spectrum: &SpectrumData,
        scan_index: usize,
    ) -> Result<ExtractedScan, SpectrumError>;
}

/// Parameters for [`LocalMaximumPeakExtractor`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PeakExtractorConfig {
    pub noise_threshold: NoiseThreshold,
    /// Peaks closer together than this many m/z units are reduced to the most intense
    pub min_peak_separation: f64,
    /// Whether to reduce each profile peak to its intensity weighted m/z
    pub centroid: bool,
    /// Whether the incoming spectra are profile or already centroided
    pub signal_continuity: SignalContinuity,
}

impl Default for PeakExtractorConfig {
    fn default() -> Self {
        Self {
            noise_threshold: NoiseThreshold::default(),
            min_peak_separation: 0.0,
            centroid: true,
            signal_continuity: SignalContinuity::Profile,
        }
    }
}

impl PeakExtractorConfig {
    pub fn with_noise_threshold(mut self, noise_threshold: NoiseThreshold) -> Self {
        self.noise_threshold = noise_threshold;
        self
    }

    pub fn with_min_peak_separation(mut self, min_peak_separation: f64) -> Self {
        self.min_peak_separation = min_peak_separation;
        self
    }

    pub fn with_centroid(mut self, centroid: bool) -> Self {
        self.centroid = centroid;
        self
    }

    pub fn with_signal_continuity(mut self, signal_continuity: SignalContinuity) -> Self {
        self.signal_continuity = signal_continuity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.noise_threshold.validate()?;
        check_non_negative("min_peak_separation", self.min_peak_separation)
    }
}

/// Find peaks as local intensity maxima above a noise floor, optionally
/// centroiding each one over its descending shoulders.
#[derive(Debug, Clone, Default)]
pub struct LocalMaximumPeakExtractor {
    config: PeakExtractorConfig,
}

impl LocalMaximumPeakExtractor {
    /// # Errors
    /// Returns a [`ConfigurationError`] if the configuration is invalid.
    pub fn new(config: PeakExtractorConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PeakExtractorConfig {
        &self.config
    }

    fn local_maxima(&self, spectrum: &SpectrumData, floor: &NoiseFloor) -> Vec<(f64, f64)> {
        let mzs = &spectrum.mzs;
        let intensities = &spectrum.intensities;
        let n = intensities.len();
        let mut candidates = Vec::new();

        for i in 0..n {
            let apex = intensities[i];
            if !floor.passes(i, apex) {
                continue;
            }
            let rises_from_left = i == 0 || intensities[i - 1] < apex;
            let falls_to_right = i + 1 == n || intensities[i + 1] <= apex;
            if !(rises_from_left && falls_to_right) {
                continue;
            }
            if !self.config.centroid {
                candidates.push((mzs[i], apex));
                continue;
            }

            let mut start = i;
            while start > 0
                && intensities[start - 1] < intensities[start]
                && floor.passes(start - 1, intensities[start - 1])
            {
                start -= 1;
            }
            let mut end = i;
            while end + 1 < n
                && intensities[end + 1] <= intensities[end]
                && floor.passes(end + 1, intensities[end + 1])
            {
                end += 1;
            }

            let (weighted, total) = mzs[start..=end]
                .iter()
                .zip(intensities[start..=end].iter())
                .fold((0.0, 0.0), |(weighted, total), (mz, inten)| {
                    (weighted + mz * inten, total + inten)
                });
            candidates.push((weighted / total, apex));
        }
        candidates
    }

    fn above_floor(&self, spectrum: &SpectrumData, floor: &NoiseFloor) -> Vec<(f64, f64)> {
        spectrum
            .mzs
            .iter()
            .zip(spectrum.intensities.iter())
            .enumerate()
            .filter(|(i, (_, inten))| floor.passes(*i, **inten))
            .map(|(_, (mz, inten))| (*mz, *inten))
            .collect()
    }

    /// Keep only the most intense of any group of candidates closer than the minimum
    /// separation. Candidates are visited from most to least intense.
    fn enforce_separation(&self, candidates: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
        let min_sep = self.config.min_peak_separation;
        if min_sep <= 0.0 || candidates.len() < 2 {
            return candidates;
        }
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|a, b| {
            let (mz_a, int_a) = candidates[*a];
            let (mz_b, int_b) = candidates[*b];
            int_b.total_cmp(&int_a).then(mz_a.total_cmp(&mz_b))
        });

        let mut accepted: Vec<(f64, f64)> = Vec::with_capacity(candidates.len());
        for i in order {
            let (mz, inten) = candidates[i];
            let pos = accepted.partition_point(|(amz, _)| *amz < mz);
            let crowded = accepted[pos.saturating_sub(1)..(pos + 1).min(accepted.len())]
                .iter()
                .any(|(amz, _)| (amz - mz).abs() < min_sep);
            if !crowded {
                accepted.insert(pos, (mz, inten));
            }
        }
        accepted
    }
}

impl PeakExtractor for LocalMaximumPeakExtractor {
    fn extract(
        &self,
        spectrum: &SpectrumData,
        scan_index: usize,
    ) -> Result<ExtractedScan, SpectrumError> {
        spectrum.validate()?;
        let time = spectrum.retention_time;
        if spectrum.is_empty() {
            return Ok(ExtractedScan::empty(scan_index, time));
        }

        let floor = self.config.noise_threshold.floor_for(&spectrum.intensities);
        let candidates = match self.config.signal_continuity {
            SignalContinuity::Centroid => self.above_floor(spectrum, &floor),
            SignalContinuity::Profile | SignalContinuity::Unknown => {
                self.local_maxima(spectrum, &floor)
            }
        };
        let candidates = self.enforce_separation(candidates);

        let peaks: Vec<Peak> = candidates
            .into_iter()
            .map(|(mz, inten)| Peak::new(mz, inten, time, scan_index))
            .collect();
        trace!(
            "Extracted {} peaks from scan {scan_index} at {time:0.3}",
            peaks.len()
        );
        Ok(ExtractedScan::new(scan_index, time, PeakList::new(peaks)))
    }
}
