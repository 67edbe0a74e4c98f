use std::cmp::Ordering;
use std::ops::RangeInclusive;
use std::sync::Arc;

use log::{debug, trace};
use mzpeaks::prelude::*;
use mzpeaks::{CoordinateLike, IndexType, IndexedCoordinate, MZPeakSetType, Tolerance, MZ};
use thiserror::Error;

use super::model::Feature;
use crate::config::{check_count, check_non_negative, check_tolerance, ConfigurationError};
use crate::detector::AbortHandle;
use crate::peakel::Peakel;
use crate::utils::isotopic_spacing;

/// Errors raised while grouping peakels into features
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PickingError {
    #[error("Feature picking was aborted after {0} features were accepted")]
    Aborted(usize),
}

/// An inclusive range of positive charge states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChargeRange {
    pub min: i32,
    pub max: i32,
}

impl Default for ChargeRange {
    fn default() -> Self {
        Self { min: 1, max: 4 }
    }
}

impl ChargeRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn iter(&self) -> RangeInclusive<i32> {
        self.min..=self.max
    }

    pub fn contains(&self, z: i32) -> bool {
        self.min <= z && z <= self.max
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.min < 1 || self.min > self.max {
            Err(ConfigurationError::InvalidChargeRange {
                min: self.min,
                max: self.max,
            })
        } else {
            Ok(())
        }
    }
}

impl From<RangeInclusive<i32>> for ChargeRange {
    fn from(value: RangeInclusive<i32>) -> Self {
        Self::new(*value.start(), *value.end())
    }
}

/// Parameters for [`IsotopeEnvelopePicker`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PeakelPickerConfig {
    /// The charge states to try for every seed
    pub charge_range: ChargeRange,
    /// How far a peakel's centroid may be from its predicted isotopic position
    pub isotope_tolerance: Tolerance,
    /// The fewest peakels an isotopic envelope needs to become a feature
    pub min_member_count: usize,
    /// Features with a smaller total abundance are dropped
    pub min_abundance: f64,
    /// The fewest peaks a peakel needs to seed an envelope
    pub min_monoisotopic_peakel_size: usize,
    /// Slack, in retention time units, added to both ends of a peakel when testing for
    /// time overlap
    pub time_tolerance: f64,
    /// Emit a seed that fails to form an envelope as a single peakel feature
    pub allow_singletons: bool,
}

impl Default for PeakelPickerConfig {
    fn default() -> Self {
        Self {
            charge_range: ChargeRange::default(),
            isotope_tolerance: Tolerance::PPM(10.0),
            min_member_count: 2,
            min_abundance: 0.0,
            min_monoisotopic_peakel_size: 1,
            time_tolerance: 0.0,
            allow_singletons: false,
        }
    }
}

impl PeakelPickerConfig {
    pub fn with_charge_range(mut self, charge_range: ChargeRange) -> Self {
        self.charge_range = charge_range;
        self
    }

    pub fn with_isotope_tolerance(mut self, isotope_tolerance: Tolerance) -> Self {
        self.isotope_tolerance = isotope_tolerance;
        self
    }

    pub fn with_min_member_count(mut self, min_member_count: usize) -> Self {
        self.min_member_count = min_member_count;
        self
    }

    pub fn with_min_abundance(mut self, min_abundance: f64) -> Self {
        self.min_abundance = min_abundance;
        self
    }

    pub fn with_min_monoisotopic_peakel_size(mut self, size: usize) -> Self {
        self.min_monoisotopic_peakel_size = size;
        self
    }

    pub fn with_time_tolerance(mut self, time_tolerance: f64) -> Self {
        self.time_tolerance = time_tolerance;
        self
    }

    pub fn with_allow_singletons(mut self, allow_singletons: bool) -> Self {
        self.allow_singletons = allow_singletons;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.charge_range.validate()?;
        check_tolerance("isotope_tolerance", self.isotope_tolerance)?;
        check_count("min_member_count", self.min_member_count)?;
        check_count(
            "min_monoisotopic_peakel_size",
            self.min_monoisotopic_peakel_size,
        )?;
        check_non_negative("min_abundance", self.min_abundance)?;
        check_non_negative("time_tolerance", self.time_tolerance)
    }
}

/// A strategy for partitioning a run's peakels into [`Feature`]s.
///
/// Implementations must never place one peakel in more than one feature, and
/// must produce the same features for the same input.
pub trait PeakelPicker: Send + Sync {
    fn pick(
        &self,
        peakels: Vec<Arc<Peakel>>,
        abort: &AbortHandle,
    ) -> Result<Vec<Feature>, PickingError>;
}

/// A peakel's position in the candidate pool, searchable by centroid m/z
#[derive(Debug, Clone, Copy, Default)]
struct PeakelEntry {
    mz: f64,
    slot: usize,
    index: IndexType,
}

impl PeakelEntry {
    fn new(mz: f64, slot: usize) -> Self {
        Self {
            mz,
            slot,
            index: 0,
        }
    }
}

impl PartialEq for PeakelEntry {
    fn eq(&self, other: &Self) -> bool {
        self.mz == other.mz && self.slot == other.slot
    }
}

impl PartialOrd for PeakelEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(
            self.mz
                .total_cmp(&other.mz)
                .then(self.slot.cmp(&other.slot)),
        )
    }
}

impl CoordinateLike<MZ> for PeakelEntry {
    #[inline]
    fn coordinate(&self) -> f64 {
        self.mz
    }
}

impl IndexedCoordinate<MZ> for PeakelEntry {
    fn get_index(&self) -> IndexType {
        self.index
    }

    fn set_index(&mut self, index: IndexType) {
        self.index = index;
    }
}

#[derive(Debug, Clone)]
struct Envelope {
    charge: i32,
    members: Vec<usize>,
    residual_sum: f64,
}

impl Envelope {
    fn mean_residual(&self) -> f64 {
        if self.members.len() < 2 {
            0.0
        } else {
            self.residual_sum / (self.members.len() - 1) as f64
        }
    }

    /// More members first, then a tighter fit, then a lower charge
    fn is_better_than(&self, other: &Self) -> bool {
        let ord = other
            .members
            .len()
            .cmp(&self.members.len())
            .then(self.mean_residual().total_cmp(&other.mean_residual()))
            .then(self.charge.cmp(&other.charge));
        ord == Ordering::Less
    }
}

/// The working state of one picking pass: the peakel pool, its m/z index and
/// the claim table.
struct PickingPass<'a> {
    config: &'a PeakelPickerConfig,
    pool: Vec<Arc<Peakel>>,
    index: MZPeakSetType<PeakelEntry>,
    claimed: Vec<bool>,
}

impl<'a> PickingPass<'a> {
    fn new(config: &'a PeakelPickerConfig, pool: Vec<Arc<Peakel>>) -> Self {
        let entries: Vec<PeakelEntry> = pool
            .iter()
            .enumerate()
            .map(|(slot, p)| PeakelEntry::new(p.mz(), slot))
            .collect();
        let claimed = vec![false; pool.len()];
        Self {
            config,
            pool,
            index: MZPeakSetType::new(entries),
            claimed,
        }
    }

    /// Seeds are visited from the most intense apex down, ties broken by ascending
    /// m/z and then by first scan
    fn seed_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.pool.len()).collect();
        order.sort_by(|a, b| {
            let pa = &self.pool[*a];
            let pb = &self.pool[*b];
            pb.apex_intensity()
                .total_cmp(&pa.apex_intensity())
                .then(pa.mz().total_cmp(&pb.mz()))
                .then(pa.first_scan().cmp(&pb.first_scan()))
                .then(pa.id().cmp(&pb.id()))
        });
        order
    }

    /// Find the unclaimed peakel closest to `target` that co-elutes with `seed`
    fn best_candidate(&self, seed: usize, target: f64, members: &[usize]) -> Option<(usize, f64)> {
        let tolerance = self.config.isotope_tolerance;
        let seed_peakel = &self.pool[seed];
        self.index
            .all_peaks_for(target, tolerance)
            .iter()
            .filter(|entry| {
                !self.claimed[entry.slot]
                    && tolerance.test(entry.mz, target)
                    && !members.contains(&entry.slot)
                    && self.pool[entry.slot].overlaps_time(seed_peakel, self.config.time_tolerance)
            })
            .map(|entry| (entry.slot, (entry.mz - target).abs()))
            .min_by(|(slot_a, err_a), (slot_b, err_b)| {
                let pa = &self.pool[*slot_a];
                let pb = &self.pool[*slot_b];
                err_a
                    .total_cmp(err_b)
                    .then(pa.mz().total_cmp(&pb.mz()))
                    .then(pa.first_scan().cmp(&pb.first_scan()))
                    .then(pa.id().cmp(&pb.id()))
            })
    }

    /// Walk the isotopic series of `seed` at `charge` in both directions, stopping
    /// each walk at the first missing isotope
    fn envelope_for(&self, seed: usize, charge: i32) -> Envelope {
        let seed_mz = self.pool[seed].mz();
        let spacing = isotopic_spacing(charge);
        let mut envelope = Envelope {
            charge,
            members: vec![seed],
            residual_sum: 0.0,
        };
        for direction in [1.0, -1.0] {
            let mut step = 1.0;
            loop {
                let target = seed_mz + direction * step * spacing;
                if target <= 0.0 {
                    break;
                }
                match self.best_candidate(seed, target, &envelope.members) {
                    Some((slot, residual)) => {
                        envelope.members.push(slot);
                        envelope.residual_sum += residual;
                        step += 1.0;
                    }
                    None => break,
                }
            }
        }
        envelope
    }

    fn best_envelope(&self, seed: usize) -> Option<Envelope> {
        let mut best: Option<Envelope> = None;
        for z in self.config.charge_range.iter() {
            let envelope = self.envelope_for(seed, z);
            trace!(
                "Seed {} at charge {z}: {} members, residual {:0.4}",
                self.pool[seed],
                envelope.members.len(),
                envelope.mean_residual()
            );
            let replace = best
                .as_ref()
                .map_or(true, |current| envelope.is_better_than(current));
            if replace {
                best = Some(envelope);
            }
        }
        best
    }

    fn run(mut self, abort: &AbortHandle) -> Result<Vec<Feature>, PickingError> {
        let mut features = Vec::new();
        let mut n_rejected = 0usize;
        for seed in self.seed_order() {
            if abort.is_aborted() {
                return Err(PickingError::Aborted(features.len()));
            }
            if self.claimed[seed] || self.pool[seed].len() < self.config.min_monoisotopic_peakel_size {
                continue;
            }
            let envelope = match self.best_envelope(seed) {
                Some(envelope) if envelope.members.len() >= self.config.min_member_count => envelope,
                _ if self.config.allow_singletons => Envelope {
                    charge: self.config.charge_range.min,
                    members: vec![seed],
                    residual_sum: 0.0,
                },
                _ => continue,
            };

            for slot in envelope.members.iter() {
                self.claimed[*slot] = true;
            }
            let members = envelope
                .members
                .iter()
                .map(|slot| self.pool[*slot].clone())
                .collect();
            let Some(feature) = Feature::new(envelope.charge, members, envelope.mean_residual())
            else {
                continue;
            };
            if feature.total_abundance() < self.config.min_abundance {
                trace!("Rejected {feature} below the minimum abundance");
                n_rejected += 1;
                continue;
            }
            trace!("Accepted {feature}");
            features.push(feature);
        }
        let n_claimed = self.claimed.iter().filter(|c| **c).count();
        debug!(
            "Picked {} features from {} peakels ({} claimed, {} rejected for abundance)",
            features.len(),
            self.pool.len(),
            n_claimed,
            n_rejected
        );
        Ok(features)
    }
}

/// Groups peakels into isotopic envelopes, seeding from the most intense peakel
/// still unclaimed and trying every configured charge.
#[derive(Debug, Clone, Default)]
pub struct IsotopeEnvelopePicker {
    config: PeakelPickerConfig,
}

impl IsotopeEnvelopePicker {
    pub fn new(config: PeakelPickerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PeakelPickerConfig {
        &self.config
    }
}

impl PeakelPicker for IsotopeEnvelopePicker {
    fn pick(
        &self,
        peakels: Vec<Arc<Peakel>>,
        abort: &AbortHandle,
    ) -> Result<Vec<Feature>, PickingError> {
        if peakels.is_empty() {
            return Ok(Vec::new());
        }
        PickingPass::new(&self.config, peakels).run(abort)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;
    use crate::peakel::PeakelId;
    use crate::peaks::Peak;
    use crate::utils::{mass_charge_ratio, neutral_mass};

    fn peakel(id: usize, mz: f64, height: f64, scans: std::ops::Range<usize>) -> Arc<Peakel> {
        let center = (scans.start + scans.end) as f64 / 2.0;
        let peaks = scans.map(|i| {
            let x = i as f64 - center;
            Peak::new(mz, height * (-x * x / 8.0).exp(), i as f64, i)
        });
        Arc::new(Peakel::from_peaks(PeakelId(id), peaks).unwrap().unwrap())
    }

    fn envelope(first_id: usize, mass: f64, charge: i32, heights: &[f64]) -> Vec<Arc<Peakel>> {
        let mz = mass_charge_ratio(mass, charge);
        heights
            .iter()
            .enumerate()
            .map(|(k, h)| {
                peakel(
                    first_id + k,
                    mz + k as f64 * isotopic_spacing(charge),
                    *h,
                    5..16,
                )
            })
            .collect()
    }

    #[test_log::test]
    fn test_pick_envelope() {
        let picker = IsotopeEnvelopePicker::default();
        let peakels = envelope(0, 1500.0, 2, &[1000.0, 800.0, 300.0]);
        let features = picker.pick(peakels, &AbortHandle::new()).unwrap();
        assert_eq!(features.len(), 1);
        let feature = &features[0];
        assert_eq!(feature.charge(), 2);
        assert_eq!(feature.len(), 3);
        assert!((feature.monoisotopic_mass() - 1500.0).abs() < 0.01);
        assert!(feature.isotope_residual() < 1e-6);
    }

    #[test_log::test]
    fn test_seed_in_middle_of_envelope() {
        let picker = IsotopeEnvelopePicker::default();
        let peakels = envelope(0, 2400.0, 3, &[400.0, 1000.0, 700.0, 200.0]);
        let features = picker.pick(peakels, &AbortHandle::new()).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].charge(), 3);
        assert_eq!(features[0].len(), 4);
        assert_eq!(features[0].monoisotopic_peakel().id(), PeakelId(0));
        assert!((features[0].monoisotopic_mass() - 2400.0).abs() < 0.01);
    }

    #[test]
    fn test_inconsistent_spacing() {
        let picker = IsotopeEnvelopePicker::default();
        let peakels = vec![
            peakel(0, 600.0, 1000.0, 5..16),
            peakel(1, 600.37, 800.0, 5..16),
            peakel(2, 600.74, 600.0, 5..16),
        ];
        let features = picker.pick(peakels.clone(), &AbortHandle::new()).unwrap();
        assert!(features.is_empty());

        let picker = IsotopeEnvelopePicker::new(
            PeakelPickerConfig::default().with_allow_singletons(true),
        )
        .unwrap();
        let features = picker.pick(peakels, &AbortHandle::new()).unwrap();
        assert_eq!(features.len(), 3);
        for f in features.iter() {
            assert_eq!(f.len(), 1);
            assert_eq!(f.charge(), 1);
        }
    }

    #[test]
    fn test_requires_coelution() {
        let picker = IsotopeEnvelopePicker::default();
        let mz = mass_charge_ratio(1000.0, 1);
        let peakels = vec![
            peakel(0, mz, 1000.0, 5..10),
            peakel(1, mz + isotopic_spacing(1), 800.0, 20..30),
        ];
        assert!(picker
            .pick(peakels.clone(), &AbortHandle::new())
            .unwrap()
            .is_empty());

        let picker =
            IsotopeEnvelopePicker::new(PeakelPickerConfig::default().with_time_tolerance(6.0))
                .unwrap();
        let features = picker.pick(peakels, &AbortHandle::new()).unwrap();
        assert_eq!(features.len(), 1);
    }

    #[test]
    fn test_no_shared_peakels() {
        let picker = IsotopeEnvelopePicker::default();
        let mut peakels = envelope(0, 1500.0, 2, &[1000.0, 800.0, 300.0]);
        peakels.extend(envelope(10, 1501.00335, 2, &[900.0, 700.0, 500.0]));
        peakels.extend(envelope(20, 998.0, 1, &[500.0, 250.0]));
        let n = peakels.len();
        let features = picker.pick(peakels, &AbortHandle::new()).unwrap();
        assert!(!features.is_empty());
        let mut seen = HashSet::new();
        let mut total = 0;
        for f in features.iter() {
            for p in f.peakels() {
                assert!(seen.insert(p.id()), "{} used twice", p.id());
                total += 1;
            }
        }
        assert!(total <= n);
        let masses: Vec<f64> = features.iter().map(|f| f.monoisotopic_mass()).collect();
        assert!(masses.iter().any(|m| (m - 998.0).abs() < 0.01), "{masses:?}");
    }

    #[test]
    fn test_min_abundance() {
        let picker =
            IsotopeEnvelopePicker::new(PeakelPickerConfig::default().with_min_abundance(1e9))
                .unwrap();
        let peakels = envelope(0, 1500.0, 2, &[1000.0, 800.0, 300.0]);
        let features = picker.pick(peakels, &AbortHandle::new()).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn test_abort() {
        let picker = IsotopeEnvelopePicker::default();
        let peakels = envelope(0, 1500.0, 2, &[1000.0, 800.0, 300.0]);
        let abort = AbortHandle::new();
        abort.abort();
        assert_eq!(
            picker.pick(peakels, &abort).unwrap_err(),
            PickingError::Aborted(0)
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(PeakelPickerConfig::default().validate().is_ok());
        assert!(PeakelPickerConfig::default()
            .with_charge_range(ChargeRange::new(0, 3))
            .validate()
            .is_err());
        assert!(PeakelPickerConfig::default()
            .with_min_member_count(0)
            .validate()
            .is_err());
        assert!(IsotopeEnvelopePicker::new(
            PeakelPickerConfig::default().with_isotope_tolerance(Tolerance::Da(0.0))
        )
        .is_err());
        let range: ChargeRange = (2..=5).into();
        assert!(range.contains(3) && !range.contains(1));
        assert_eq!(range.iter().count(), 4);
        assert!((neutral_mass(mass_charge_ratio(10.0, 2), 2) - 10.0).abs() < 1e-9);
    }
}
