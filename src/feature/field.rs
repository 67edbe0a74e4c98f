use std::ops::Index;
use std::slice;

use mzpeaks::Tolerance;

use super::model::Feature;

/// The complete, immutable set of [`Feature`]s detected in one run.
///
/// Features are ordered by monoisotopic m/z, then start time, then charge, and
/// that order is stable for a given input.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureField {
    features: Vec<Feature>,
}

impl FeatureField {
    pub fn new(mut features: Vec<Feature>) -> Self {
        features.sort_by(|a, b| {
            a.mz()
                .total_cmp(&b.mz())
                .then(a.start_time().total_cmp(&b.start_time()))
                .then(a.charge().cmp(&b.charge()))
        });
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn as_slice(&self) -> &[Feature] {
        &self.features
    }

    pub fn into_inner(self) -> Vec<Feature> {
        self.features
    }

    /// All features whose monoisotopic m/z lies in `low..=high`
    pub fn between_mz(&self, low: f64, high: f64) -> &[Feature] {
        let start = self.features.partition_point(|f| f.mz() < low);
        let end = self.features.partition_point(|f| f.mz() <= high);
        if start >= end {
            &[]
        } else {
            &self.features[start..end]
        }
    }

    /// All features whose retention time range overlaps `start..=end`
    pub fn overlapping_time(&self, start: f64, end: f64) -> impl Iterator<Item = &Feature> {
        self.features
            .iter()
            .filter(move |f| f.overlaps_time_range(start, end))
    }

    /// All features with monoisotopic m/z in `mz_low..=mz_high` that overlap the
    /// retention time range `time_start..=time_end`
    pub fn query(
        &self,
        mz_low: f64,
        mz_high: f64,
        time_start: f64,
        time_end: f64,
    ) -> impl Iterator<Item = &Feature> {
        self.between_mz(mz_low, mz_high)
            .iter()
            .filter(move |f| f.overlaps_time_range(time_start, time_end))
    }

    /// Find the feature whose monoisotopic mass is closest to `mass`, if any lies
    /// within `tolerance` of it
    pub fn nearest_mass(&self, mass: f64, tolerance: Tolerance) -> Option<&Feature> {
        self.features
            .iter()
            .filter(|f| tolerance.test(f.monoisotopic_mass(), mass))
            .min_by(|a, b| {
                (a.monoisotopic_mass() - mass)
                    .abs()
                    .total_cmp(&(b.monoisotopic_mass() - mass).abs())
            })
    }
}

impl Index<usize> for FeatureField {
    type Output = Feature;

    fn index(&self, index: usize) -> &Self::Output {
        &self.features[index]
    }
}

impl<'a> IntoIterator for &'a FeatureField {
    type Item = &'a Feature;
    type IntoIter = slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

impl IntoIterator for FeatureField {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl FromIterator<Feature> for FeatureField {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::peakel::{Peakel, PeakelId};
    use crate::peaks::Peak;
    use crate::utils::mass_charge_ratio;

    fn feature(mass: f64, charge: i32, start: usize, end: usize) -> Feature {
        let mz = mass_charge_ratio(mass, charge);
        let peaks = (start..end).map(|i| Peak::new(mz, 100.0, i as f64, i));
        let peakel = Peakel::from_peaks(PeakelId(start), peaks).unwrap().unwrap();
        Feature::new(charge, vec![Arc::new(peakel)], 0.0).unwrap()
    }

    fn make_field() -> FeatureField {
        vec![
            feature(1500.0, 2, 10, 20),
            feature(800.0, 1, 0, 5),
            feature(998.0, 2, 3, 8),
            feature(2700.0, 3, 30, 40),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_ordering() {
        let field = make_field();
        assert_eq!(field.len(), 4);
        let mzs: Vec<f64> = field.iter().map(|f| f.mz()).collect();
        assert!(mzs.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(field[0].charge(), 2);
        assert!((field[0].monoisotopic_mass() - 998.0).abs() < 1e-6);
    }

    #[test]
    fn test_queries() {
        let field = make_field();
        let hits = field.between_mz(700.0, 810.0);
        assert_eq!(hits.len(), 2);
        assert!(field.between_mz(100.0, 200.0).is_empty());
        assert!(field.between_mz(900.0, 100.0).is_empty());

        assert_eq!(field.overlapping_time(4.0, 11.0).count(), 3);
        let hits: Vec<_> = field.query(700.0, 810.0, 12.0, 15.0).collect();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].monoisotopic_mass() - 1500.0).abs() < 1e-6);

        let hit = field.nearest_mass(1500.01, Tolerance::PPM(20.0)).unwrap();
        assert!((hit.monoisotopic_mass() - 1500.0).abs() < 1e-6);
        assert!(field.nearest_mass(1600.0, Tolerance::PPM(20.0)).is_none());
    }
}
