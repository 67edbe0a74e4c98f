use std::fmt;

use mzpeaks::coordinate::Time;
use mzpeaks::feature::TimeInterval;

use super::grow::GrowthError;
use crate::peaks::Peak;

/// A stable identifier for a [`Peakel`] within one detection run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakelId(pub usize);

impl fmt::Display for PeakelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/**
A chromatographic trace: the peaks of one m/z channel linked across consecutive
scans, ordered by scan index.

A peakel is only appended to while it is being grown. Once growth completes it is
shared read-only, usually behind an [`Arc`](std::sync::Arc), by whichever
[`Feature`](crate::feature::Feature) claims it.
*/
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peakel {
    id: PeakelId,
    peaks: Vec<Peak>,
    weighted_mz: f64,
    mz_sum: f64,
    total_intensity: f64,
    apex: usize,
}

impl Peakel {
    /// Start a new peakel from its first peak
    pub fn new(id: PeakelId, peak: Peak) -> Self {
        Self {
            id,
            weighted_mz: peak.mz * peak.intensity,
            mz_sum: peak.mz,
            total_intensity: peak.intensity,
            peaks: vec![peak],
            apex: 0,
        }
    }

    /// Build a peakel from a sequence of peaks, which must be in strictly increasing
    /// scan order. Returns `None` if `peaks` is empty.
    pub fn from_peaks(
        id: PeakelId,
        peaks: impl IntoIterator<Item = Peak>,
    ) -> Result<Option<Self>, GrowthError> {
        let mut it = peaks.into_iter();
        let mut this = match it.next() {
            Some(peak) => Self::new(id, peak),
            None => return Ok(None),
        };
        for peak in it {
            this.push(peak)?;
        }
        Ok(Some(this))
    }

    /// Append a peak observed after every peak already in the trace.
    ///
    /// # Errors
    /// [`GrowthError::ScanOutOfOrder`] if `peak` does not come from a later scan
    /// than the current last member.
    pub fn push(&mut self, peak: Peak) -> Result<(), GrowthError> {
        let last = self.last_peak();
        if peak.scan_index <= last.scan_index || peak.retention_time < last.retention_time {
            return Err(GrowthError::ScanOutOfOrder {
                scan_index: peak.scan_index,
                time: peak.retention_time,
                last_scan_index: last.scan_index,
                last_time: last.retention_time,
            });
        }
        self.weighted_mz += peak.mz * peak.intensity;
        self.mz_sum += peak.mz;
        self.total_intensity += peak.intensity;
        if peak.intensity > self.peaks[self.apex].intensity {
            self.apex = self.peaks.len();
        }
        self.peaks.push(peak);
        Ok(())
    }

    pub fn id(&self) -> PeakelId {
        self.id
    }

    /// The intensity weighted mean m/z of the member peaks
    pub fn mz(&self) -> f64 {
        if self.total_intensity > 0.0 {
            self.weighted_mz / self.total_intensity
        } else {
            self.mz_sum / self.peaks.len() as f64
        }
    }

    /// The intensity weighted variance of the member peaks' m/z
    pub fn mz_variance(&self) -> f64 {
        let center = self.mz();
        if self.total_intensity > 0.0 {
            self.peaks
                .iter()
                .map(|p| p.intensity * (p.mz - center).powi(2))
                .sum::<f64>()
                / self.total_intensity
        } else {
            self.peaks.iter().map(|p| (p.mz - center).powi(2)).sum::<f64>()
                / self.peaks.len() as f64
        }
    }

    pub fn apex_peak(&self) -> &Peak {
        &self.peaks[self.apex]
    }

    pub fn apex_intensity(&self) -> f64 {
        self.apex_peak().intensity
    }

    pub fn apex_time(&self) -> f64 {
        self.apex_peak().retention_time
    }

    pub fn total_intensity(&self) -> f64 {
        self.total_intensity
    }

    pub fn first_peak(&self) -> &Peak {
        &self.peaks[0]
    }

    pub fn last_peak(&self) -> &Peak {
        &self.peaks[self.peaks.len() - 1]
    }

    pub fn first_scan(&self) -> usize {
        self.first_peak().scan_index
    }

    pub fn last_scan(&self) -> usize {
        self.last_peak().scan_index
    }

    pub fn start_time(&self) -> f64 {
        self.first_peak().retention_time
    }

    pub fn end_time(&self) -> f64 {
        self.last_peak().retention_time
    }

    /// The trapezoid integral of intensity over retention time
    pub fn area(&self) -> f64 {
        self.peaks
            .windows(2)
            .map(|w| {
                let dt = w[1].retention_time - w[0].retention_time;
                dt * (w[0].intensity + w[1].intensity) / 2.0
            })
            .sum()
    }

    /// The largest difference in scan index between consecutive members
    pub fn max_scan_gap(&self) -> usize {
        self.peaks
            .windows(2)
            .map(|w| w[1].scan_index - w[0].scan_index)
            .max()
            .unwrap_or_default()
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Peak> {
        self.peaks.iter()
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    /// A peakel always holds at least one peak
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Test whether the retention time spans of two peakels intersect once each
    /// is widened by `time_tolerance` on both ends.
    pub fn overlaps_time(&self, other: &Peakel, time_tolerance: f64) -> bool {
        self.start_time() - time_tolerance <= other.end_time() + time_tolerance
            && other.start_time() - time_tolerance <= self.end_time() + time_tolerance
    }

    /// The length of time both peakels span, zero if they do not intersect
    pub fn time_overlap(&self, other: &Peakel) -> f64 {
        let start = self.start_time().max(other.start_time());
        let end = self.end_time().min(other.end_time());
        (end - start).max(0.0)
    }
}

impl fmt::Display for Peakel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Peakel({}, {:0.4}, {:0.3}-{:0.3}, {} peaks)",
            self.id,
            self.mz(),
            self.start_time(),
            self.end_time(),
            self.len()
        )
    }
}

impl TimeInterval<Time> for Peakel {
    fn start_time(&self) -> Option<f64> {
        self.peaks.first().map(|p| p.retention_time)
    }

    fn end_time(&self) -> Option<f64> {
        self.peaks.last().map(|p| p.retention_time)
    }

    fn apex_time(&self) -> Option<f64> {
        self.peaks.get(self.apex).map(|p| p.retention_time)
    }

    fn area(&self) -> f32 {
        Peakel::area(self) as f32
    }

    fn iter_time(&self) -> impl Iterator<Item = f64> {
        self.peaks.iter().map(|p| p.retention_time)
    }
}
