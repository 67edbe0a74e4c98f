use std::cmp;
use std::fmt;

use mzpeaks::{
    CoordinateLike, IndexType, IndexedCoordinate, IntensityMeasurement, MZPeakSetType,
    PeakCollection, MZ,
};

/// A single local intensity maximum detected in one spectrum.
///
/// Besides its m/z and intensity, a peak remembers when it was observed so that it
/// can be linked to its neighbors in adjacent scans.
#[derive(Default, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
    pub retention_time: f64,
    /// The position of the source spectrum among the scans used for detection
    pub scan_index: usize,
    /// The position of this peak within its scan's m/z ordered peak list
    pub index: IndexType,
}

impl Peak {
    pub fn new(mz: f64, intensity: f64, retention_time: f64, scan_index: usize) -> Self {
        Self {
            mz,
            intensity,
            retention_time,
            scan_index,
            index: 0,
        }
    }
}

impl fmt::Display for Peak {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Peak({}, {}, {}, {})",
            self.mz, self.intensity, self.retention_time, self.scan_index
        )
    }
}

impl cmp::PartialOrd<Peak> for Peak {
    fn partial_cmp(&self, other: &Peak) -> Option<cmp::Ordering> {
        self.mz.partial_cmp(&other.mz)
    }
}

impl cmp::PartialEq<Peak> for Peak {
    fn eq(&self, other: &Peak) -> bool {
        if (self.mz - other.mz).abs() > 1e-3
            || (self.intensity - other.intensity).abs() > 1e-3
            || self.scan_index != other.scan_index
        {
            return false;
        }
        true
    }
}

impl CoordinateLike<MZ> for Peak {
    #[inline]
    fn coordinate(&self) -> f64 {
        self.mz
    }
}

impl IndexedCoordinate<MZ> for Peak {
    fn get_index(&self) -> IndexType {
        self.index
    }

    fn set_index(&mut self, index: IndexType) {
        self.index = index;
    }
}

impl IntensityMeasurement for Peak {
    #[inline]
    fn intensity(&self) -> f32 {
        self.intensity as f32
    }
}

/// The peaks extracted from a single spectrum, sorted by m/z
pub type PeakList = MZPeakSetType<Peak>;

/// The result of extracting peaks from one spectrum.
///
/// A scan without any peaks is still meaningful because it advances the time
/// axis for peakel growth.
#[derive(Debug, Clone)]
pub struct ExtractedScan {
    pub scan_index: usize,
    pub retention_time: f64,
    pub peaks: PeakList,
}

impl ExtractedScan {
    pub fn new(scan_index: usize, retention_time: f64, peaks: PeakList) -> Self {
        Self {
            scan_index,
            retention_time,
            peaks,
        }
    }

    pub fn empty(scan_index: usize, retention_time: f64) -> Self {
        Self::new(scan_index, retention_time, PeakList::new(Vec::new()))
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peak> {
        self.peaks.iter()
    }

    /// A copy of the peak at `index` carrying this scan's index and retention time
    pub(crate) fn stamped(&self, index: usize) -> Peak {
        let mut peak = self.peaks[index];
        peak.scan_index = self.scan_index;
        peak.retention_time = self.retention_time;
        peak
    }
}
