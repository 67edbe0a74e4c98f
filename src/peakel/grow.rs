use indexmap::IndexMap;
use log::{debug, trace};
use mzpeaks::prelude::*;
use mzpeaks::Tolerance;
use thiserror::Error;

use super::peakel::{Peakel, PeakelId};
use crate::config::{check_count, check_tolerance, ConfigurationError};
use crate::peaks::ExtractedScan;

/// Errors raised while linking peaks into peakels
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GrowthError {
    #[error(
        "Scan {scan_index} at time {time} arrived after scan {last_scan_index} at time {last_time}"
    )]
    ScanOutOfOrder {
        scan_index: usize,
        time: f64,
        last_scan_index: usize,
        last_time: f64,
    },
}

/// Parameters for [`ProximityPeakelGrower`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PeakelGrowerConfig {
    /// How far a peak may be from a peakel's running centroid and still extend it
    pub mz_tolerance: Tolerance,
    /// The largest allowed difference in scan index between consecutive members of
    /// a peakel. `1` requires peaks on every scan.
    pub max_gap: usize,
}

impl Default for PeakelGrowerConfig {
    fn default() -> Self {
        Self {
            mz_tolerance: Tolerance::PPM(10.0),
            max_gap: 2,
        }
    }
}

impl PeakelGrowerConfig {
    pub fn new(mz_tolerance: Tolerance, max_gap: usize) -> Self {
        Self {
            mz_tolerance,
            max_gap,
        }
    }

    pub fn with_mz_tolerance(mut self, mz_tolerance: Tolerance) -> Self {
        self.mz_tolerance = mz_tolerance;
        self
    }

    pub fn with_max_gap(mut self, max_gap: usize) -> Self {
        self.max_gap = max_gap;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_tolerance("mz_tolerance", self.mz_tolerance)?;
        check_count("max_gap", self.max_gap)
    }
}

/// The working state of a single growth pass over a run.
///
/// Scans must be pushed in strictly increasing scan order. The session owns
/// every open peakel exclusively until [`PeakelGrowth::finish`] hands them off.
pub trait PeakelGrowth {
    /// Link the peaks of the next scan to the open peakels, closing peakels that
    /// can no longer be extended and opening new ones for unmatched peaks.
    fn push_scan(&mut self, scan: &ExtractedScan) -> Result<(), GrowthError>;

    /// The number of peakels that may still be extended
    fn open_count(&self) -> usize;

    /// The number of peakels already finalized
    fn closed_count(&self) -> usize;

    /// Close every remaining open peakel and return all peakels produced
    fn finish(self) -> Vec<Peakel>;
}

/// A strategy for linking peaks across scans into [`Peakel`]s.
pub trait PeakelGrower: Send + Sync {
    type Session: PeakelGrowth;

    /// Start a new, empty growth pass
    fn begin(&self) -> Self::Session;

    /// Run a complete growth pass over `scans`
    fn grow<'a, I>(&self, scans: I) -> Result<Vec<Peakel>, GrowthError>
    where
        I: IntoIterator<Item = &'a ExtractedScan>,
    {
        let mut session = self.begin();
        for scan in scans {
            session.push_scan(scan)?;
        }
        Ok(session.finish())
    }
}

/// Extends each open peakel with the closest peak of the next scan, resolving
/// competing matches greedily in order of increasing m/z error.
#[derive(Debug, Clone, Default)]
pub struct ProximityPeakelGrower {
    config: PeakelGrowerConfig,
}

impl ProximityPeakelGrower {
    pub fn new(config: PeakelGrowerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PeakelGrowerConfig {
        &self.config
    }
}

impl PeakelGrower for ProximityPeakelGrower {
    type Session = ProximityGrowthSession;

    fn begin(&self) -> Self::Session {
        ProximityGrowthSession::new(self.config)
    }
}

#[derive(Debug, Clone, Copy)]
struct MatchCandidate {
    peakel: PeakelId,
    peak_index: usize,
    mz_error: f64,
    peakel_mz: f64,
    first_scan: usize,
    peak_mz: f64,
}

impl MatchCandidate {
    fn cmp_priority(&self, other: &Self) -> std::cmp::Ordering {
        self.mz_error
            .total_cmp(&other.mz_error)
            .then(self.peakel_mz.total_cmp(&other.peakel_mz))
            .then(self.first_scan.cmp(&other.first_scan))
            .then(self.peakel.cmp(&other.peakel))
            .then(self.peak_mz.total_cmp(&other.peak_mz))
    }
}

/// The [`PeakelGrowth`] session of [`ProximityPeakelGrower`]. Open peakels are kept
/// in an arena keyed by [`PeakelId`].
#[derive(Debug, Clone)]
pub struct ProximityGrowthSession {
    config: PeakelGrowerConfig,
    open: IndexMap<PeakelId, Peakel>,
    closed: Vec<Peakel>,
    next_id: usize,
    last_scan: Option<(usize, f64)>,
}

impl ProximityGrowthSession {
    pub fn new(config: PeakelGrowerConfig) -> Self {
        Self {
            config,
            open: IndexMap::new(),
            closed: Vec::new(),
            next_id: 0,
            last_scan: None,
        }
    }

    /// Iterate over the peakels that are still open
    pub fn open_peakels(&self) -> impl Iterator<Item = &Peakel> {
        self.open.values()
    }

    fn next_id(&mut self) -> PeakelId {
        let id = PeakelId(self.next_id);
        self.next_id += 1;
        id
    }

    fn check_order(&mut self, scan: &ExtractedScan) -> Result<(), GrowthError> {
        if let Some((last_scan_index, last_time)) = self.last_scan {
            if scan.scan_index <= last_scan_index || scan.retention_time < last_time {
                return Err(GrowthError::ScanOutOfOrder {
                    scan_index: scan.scan_index,
                    time: scan.retention_time,
                    last_scan_index,
                    last_time,
                });
            }
        }
        self.last_scan = Some((scan.scan_index, scan.retention_time));
        Ok(())
    }

    /// Close every open peakel that would exceed the maximum gap if extended at `scan_index`
    fn close_stale(&mut self, scan_index: usize) {
        let max_gap = self.config.max_gap;
        if !self
            .open
            .values()
            .any(|p| scan_index - p.last_scan() > max_gap)
        {
            return;
        }
        let open = std::mem::take(&mut self.open);
        let mut n_closed = 0usize;
        for (id, peakel) in open {
            if scan_index - peakel.last_scan() > max_gap {
                self.closed.push(peakel);
                n_closed += 1;
            } else {
                self.open.insert(id, peakel);
            }
        }
        trace!("Closed {n_closed} peakels before scan {scan_index}");
    }

    fn collect_candidates(&self, scan: &ExtractedScan) -> Vec<MatchCandidate> {
        let tolerance = self.config.mz_tolerance;
        let mut candidates = Vec::new();
        for (id, peakel) in self.open.iter() {
            let centroid = peakel.mz();
            for peak in scan.peaks.all_peaks_for(centroid, tolerance) {
                if !tolerance.test(peak.mz, centroid) {
                    continue;
                }
                candidates.push(MatchCandidate {
                    peakel: *id,
                    peak_index: peak.index as usize,
                    mz_error: (peak.mz - centroid).abs(),
                    peakel_mz: centroid,
                    first_scan: peakel.first_scan(),
                    peak_mz: peak.mz,
                });
            }
        }
        candidates.sort_by(|a, b| a.cmp_priority(b));
        candidates
    }
}

impl PeakelGrowth for ProximityGrowthSession {
    fn push_scan(&mut self, scan: &ExtractedScan) -> Result<(), GrowthError> {
        self.check_order(scan)?;
        self.close_stale(scan.scan_index);

        let candidates = self.collect_candidates(scan);
        let mut peak_claimed = vec![false; scan.len()];
        let mut extended: IndexMap<PeakelId, usize> = IndexMap::new();
        for candidate in candidates {
            if peak_claimed[candidate.peak_index] || extended.contains_key(&candidate.peakel) {
                continue;
            }
            peak_claimed[candidate.peak_index] = true;
            extended.insert(candidate.peakel, candidate.peak_index);
        }

        for (id, peak_index) in extended.iter() {
            if let Some(peakel) = self.open.get_mut(id) {
                peakel.push(scan.stamped(*peak_index))?;
            }
        }

        let mut n_new = 0usize;
        for (peak_index, claimed) in peak_claimed.iter().enumerate() {
            if !claimed {
                let id = self.next_id();
                self.open.insert(id, Peakel::new(id, scan.stamped(peak_index)));
                n_new += 1;
            }
        }
        trace!(
            "Scan {}: extended {} peakels, opened {n_new}, {} open",
            scan.scan_index,
            extended.len(),
            self.open.len()
        );
        Ok(())
    }

    fn open_count(&self) -> usize {
        self.open.len()
    }

    fn closed_count(&self) -> usize {
        self.closed.len()
    }

    fn finish(mut self) -> Vec<Peakel> {
        let open = std::mem::take(&mut self.open);
        self.closed.extend(open.into_values());
        self.closed.sort_by(|a, b| {
            a.first_scan()
                .cmp(&b.first_scan())
                .then(a.mz().total_cmp(&b.mz()))
                .then(a.id().cmp(&b.id()))
        });
        debug!("Finished growing {} peakels", self.closed.len());
        self.closed
    }
}
