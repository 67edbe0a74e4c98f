use std::fmt;
use std::sync::Arc;

use mzpeaks::coordinate::Time;
use mzpeaks::feature::TimeInterval;
use mzpeaks::KnownCharge;

use crate::peakel::Peakel;
use crate::utils::neutral_mass;

/**
A charge-resolved, isotope-deconvolved species observed as a cluster of
[`Peakel`]s whose centroids follow an isotopic series.

Members are held in ascending m/z order, so the first member is the
monoisotopic peakel. A `Feature` is never modified after it is built, and its
members are shared read-only with nothing else in the same [`FeatureField`](super::FeatureField).
*/
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    charge: i32,
    monoisotopic_mass: f64,
    mz: f64,
    start_time: f64,
    end_time: f64,
    apex_time: f64,
    total_abundance: f64,
    isotope_residual: f64,
    peakels: Vec<Arc<Peakel>>,
}

impl Feature {
    /// Build a feature at `charge` from its member peakels.
    ///
    /// `isotope_residual` is the mean absolute difference, in Da, between each
    /// member's centroid and the position the isotopic series predicts for it.
    /// Returns `None` when `peakels` is empty or `charge` is not positive.
    pub fn new(charge: i32, mut peakels: Vec<Arc<Peakel>>, isotope_residual: f64) -> Option<Self> {
        if peakels.is_empty() || charge < 1 {
            return None;
        }
        peakels.sort_by(|a, b| a.mz().total_cmp(&b.mz()).then(a.id().cmp(&b.id())));
        let mz = peakels[0].mz();
        let start_time = peakels
            .iter()
            .map(|p| p.start_time())
            .fold(f64::INFINITY, f64::min);
        let end_time = peakels
            .iter()
            .map(|p| p.end_time())
            .fold(f64::NEG_INFINITY, f64::max);
        let total_abundance = peakels.iter().map(|p| p.total_intensity()).sum();
        let apex_time = peakels
            .iter()
            .max_by(|a, b| {
                a.apex_intensity()
                    .total_cmp(&b.apex_intensity())
                    .then(b.mz().total_cmp(&a.mz()))
            })
            .map(|p| p.apex_time())
            .unwrap_or(start_time);
        Some(Self {
            charge,
            monoisotopic_mass: neutral_mass(mz, charge),
            mz,
            start_time,
            end_time,
            apex_time,
            total_abundance,
            isotope_residual,
            peakels,
        })
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    /// The neutral mass of the monoisotopic peakel
    pub fn monoisotopic_mass(&self) -> f64 {
        self.monoisotopic_mass
    }

    /// The centroid m/z of the monoisotopic peakel
    pub fn mz(&self) -> f64 {
        self.mz
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// The retention time range covered by any member, inclusive
    pub fn retention_time_range(&self) -> (f64, f64) {
        (self.start_time, self.end_time)
    }

    /// The apex time of the most intense member
    pub fn apex_time(&self) -> f64 {
        self.apex_time
    }

    /// The summed intensity of every member peak
    pub fn total_abundance(&self) -> f64 {
        self.total_abundance
    }

    pub fn isotope_residual(&self) -> f64 {
        self.isotope_residual
    }

    /// A quality score that favors abundant features with tightly spaced isotopes
    pub fn score(&self) -> f64 {
        self.total_abundance / (1.0 + 1000.0 * self.isotope_residual)
    }

    /// The intensity weighted variance of the retention times of every member peak
    pub fn retention_time_variance(&self) -> f64 {
        let (weighted, total) = self
            .peakels
            .iter()
            .flat_map(|p| p.iter())
            .fold((0.0, 0.0), |(acc, total), p| {
                (acc + p.retention_time * p.intensity, total + p.intensity)
            });
        if total <= 0.0 {
            return 0.0;
        }
        let center = weighted / total;
        self.peakels
            .iter()
            .flat_map(|p| p.iter())
            .map(|p| p.intensity * (p.retention_time - center).powi(2))
            .sum::<f64>()
            / total
    }

    pub fn peakels(&self) -> &[Arc<Peakel>] {
        &self.peakels
    }

    pub fn monoisotopic_peakel(&self) -> &Peakel {
        &self.peakels[0]
    }

    pub fn len(&self) -> usize {
        self.peakels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peakels.is_empty()
    }

    /// Whether the feature spans any part of `start..=end`
    pub fn overlaps_time_range(&self, start: f64, end: f64) -> bool {
        self.start_time <= end && start <= self.end_time
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Feature({:0.4}, {}, {:0.3}-{:0.3}, {:0.2e}, {} peakels)",
            self.monoisotopic_mass,
            self.charge,
            self.start_time,
            self.end_time,
            self.total_abundance,
            self.peakels.len()
        )
    }
}

impl KnownCharge for Feature {
    fn charge(&self) -> i32 {
        self.charge
    }
}

impl TimeInterval<Time> for Feature {
    fn start_time(&self) -> Option<f64> {
        Some(self.start_time)
    }

    fn end_time(&self) -> Option<f64> {
        Some(self.end_time)
    }

    fn apex_time(&self) -> Option<f64> {
        Some(self.apex_time)
    }

    fn area(&self) -> f32 {
        self.peakels.iter().map(|p| p.area()).sum::<f64>() as f32
    }

    fn iter_time(&self) -> impl Iterator<Item = f64> {
        self.peakels[0].iter().map(|p| p.retention_time)
    }
}
