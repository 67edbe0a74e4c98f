//! Drive a whole run through extraction, growth and picking.
//!
//! [`FeatureDetectorPeakel`] holds one strategy per stage and produces a
//! [`FeatureField`] for each [`SpectrumRunSource`] it is given. The work of a
//! single run is carried by a [`DetectionRun`], which may also be stepped one
//! stage at a time.
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace};
#[cfg(feature = "parallelism")]
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{check_count, ConfigurationError, DetectorConfig};
use crate::feature::{FeatureField, IsotopeEnvelopePicker, PeakelPicker, PickingError};
use crate::peakel::{GrowthError, Peakel, PeakelGrower, PeakelGrowth, ProximityPeakelGrower};
use crate::peaks::{ExtractedScan, LocalMaximumPeakExtractor, PeakExtractor};
use crate::source::{SpectrumAccessError, SpectrumRunSource};
use crate::spectrum::{SpectrumData, SpectrumError};

/// A shared flag a caller can raise to stop a detection run early.
///
/// Clones share the same flag. The run checks it between batches of spectra,
/// between scans fed to the grower and between picking seeds.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that any run watching this handle stop
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the handle can be used for another run
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The stages of a [`DetectionRun`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DetectorState {
    #[default]
    Init,
    Extracting,
    Growing,
    Picking,
    Done,
    Failed,
}

impl Display for DetectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl DetectorState {
    /// Whether the run can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Run-level options that are not specific to any one stage
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectionOptions {
    /// Only spectra of this MS level take part in detection. `None` uses every spectrum.
    pub ms_level: Option<u8>,
    /// How many spectra are read and extracted together before their peaks are
    /// handed to the grower
    pub batch_size: usize,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            ms_level: Some(1),
            batch_size: 64,
        }
    }
}

impl DetectionOptions {
    pub fn with_ms_level(mut self, ms_level: Option<u8>) -> Self {
        self.ms_level = ms_level;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_count("batch_size", self.batch_size)
    }

    fn accepts(&self, spectrum: &SpectrumData) -> bool {
        self.ms_level.map_or(true, |level| spectrum.ms_level == level)
    }
}

/// Errors that abort a detection run. No [`FeatureField`] is produced when any
/// of these occur.
#[derive(Debug, Error)]
pub enum FeatureDetectionError {
    #[error("Spectrum {index} is malformed: {source}")]
    InputError {
        index: usize,
        #[source]
        source: SpectrumError,
    },
    #[error(
        "Spectrum {index} at time {time} does not come after the preceding spectrum at time {previous_time}"
    )]
    OrderingError {
        index: usize,
        time: f64,
        previous_time: f64,
    },
    #[error("Invalid configuration: {0}")]
    ConfigurationError(#[from] ConfigurationError),
    #[error("Failed to read a spectrum: {0}")]
    SpectrumAccess(#[from] SpectrumAccessError),
    #[error("Failed to grow peakels: {0}")]
    Growth(#[from] GrowthError),
    #[error("Feature detection was aborted")]
    Aborted,
}

impl From<PickingError> for FeatureDetectionError {
    fn from(value: PickingError) -> Self {
        match value {
            PickingError::Aborted(_) => Self::Aborted,
        }
    }
}

/// Anything that can turn a run of spectra into a [`FeatureField`]
pub trait FeatureDetector {
    /// Detect features in `source`, stopping early if `abort` is raised
    fn detect_with_abort<S: SpectrumRunSource>(
        &self,
        source: &mut S,
        abort: &AbortHandle,
    ) -> Result<FeatureField, FeatureDetectionError>;

    /// Detect features in `source`
    fn detect<S: SpectrumRunSource>(
        &self,
        source: &mut S,
    ) -> Result<FeatureField, FeatureDetectionError> {
        self.detect_with_abort(source, &AbortHandle::new())
    }
}

/**
A feature detector built from one [`PeakExtractor`], one [`PeakelGrower`] and one
[`PeakelPicker`].

The strategies are shared through [`Arc`] and never mutated, so one set of
strategies may serve many detectors, or many runs at once.

```
use std::sync::Arc;
use mzfeature::prelude::*;
use mzfeature::{MemoryRunSource, SpectrumData};

let detector = FeatureDetectorPeakel::new(
    Arc::new(LocalMaximumPeakExtractor::default()),
    Arc::new(ProximityPeakelGrower::default()),
    Arc::new(IsotopeEnvelopePicker::default()),
);
let mut source = MemoryRunSource::from(vec![SpectrumData::new(
    1.0,
    vec![500.0, 500.01, 500.02],
    vec![0.0, 10.0, 0.0],
    1,
)]);
let features = detector.detect(&mut source).unwrap();
assert!(features.is_empty());
```
*/
#[derive(Debug)]
pub struct FeatureDetectorPeakel<E: PeakExtractor, G: PeakelGrower, P: PeakelPicker> {
    extractor: Arc<E>,
    grower: Arc<G>,
    picker: Arc<P>,
    options: DetectionOptions,
}

impl<E: PeakExtractor, G: PeakelGrower, P: PeakelPicker> Clone for FeatureDetectorPeakel<E, G, P> {
    fn clone(&self) -> Self {
        Self {
            extractor: self.extractor.clone(),
            grower: self.grower.clone(),
            picker: self.picker.clone(),
            options: self.options,
        }
    }
}

/// The detector built from the default strategy of each stage
pub type DefaultFeatureDetector =
    FeatureDetectorPeakel<LocalMaximumPeakExtractor, ProximityPeakelGrower, IsotopeEnvelopePicker>;

impl DefaultFeatureDetector {
    /// Validate `config` and build the default strategies from it
    pub fn from_config(config: DetectorConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let extractor = LocalMaximumPeakExtractor::new(config.extraction)?;
        let grower = ProximityPeakelGrower::new(config.growth)?;
        let picker = IsotopeEnvelopePicker::new(config.picking)?;
        Self::new(Arc::new(extractor), Arc::new(grower), Arc::new(picker))
            .with_options(config.options)
    }
}

impl<E: PeakExtractor, G: PeakelGrower, P: PeakelPicker> FeatureDetectorPeakel<E, G, P> {
    pub fn new(extractor: Arc<E>, grower: Arc<G>, picker: Arc<P>) -> Self {
        Self {
            extractor,
            grower,
            picker,
            options: DetectionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DetectionOptions) -> Result<Self, ConfigurationError> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    pub fn options(&self) -> &DetectionOptions {
        &self.options
    }

    pub fn extractor(&self) -> &Arc<E> {
        &self.extractor
    }

    pub fn grower(&self) -> &Arc<G> {
        &self.grower
    }

    pub fn picker(&self) -> &Arc<P> {
        &self.picker
    }

    /// Start a new run that can be stepped stage by stage
    pub fn begin_run(&self, abort: AbortHandle) -> DetectionRun<'_, E, G, P> {
        DetectionRun::new(self, abort)
    }

    #[cfg(not(feature = "parallelism"))]
    fn extract_batch(
        &self,
        batch: &[(usize, usize, SpectrumData)],
    ) -> Result<Vec<ExtractedScan>, FeatureDetectionError> {
        batch
            .iter()
            .map(|(index, scan_index, spectrum)| {
                self.extractor
                    .extract(spectrum, *scan_index)
                    .map_err(|source| FeatureDetectionError::InputError {
                        index: *index,
                        source,
                    })
            })
            .collect()
    }

    #[cfg(feature = "parallelism")]
    fn extract_batch(
        &self,
        batch: &[(usize, usize, SpectrumData)],
    ) -> Result<Vec<ExtractedScan>, FeatureDetectionError> {
        let results: Vec<_> = batch
            .par_iter()
            .map(|(index, scan_index, spectrum)| {
                self.extractor
                    .extract(spectrum, *scan_index)
                    .map_err(|source| (*index, source))
            })
            .collect();
        results
            .into_iter()
            .map(|r| r.map_err(|(index, source)| FeatureDetectionError::InputError { index, source }))
            .collect()
    }
}

impl<E: PeakExtractor, G: PeakelGrower, P: PeakelPicker> FeatureDetector
    for FeatureDetectorPeakel<E, G, P>
{
    fn detect_with_abort<S: SpectrumRunSource>(
        &self,
        source: &mut S,
        abort: &AbortHandle,
    ) -> Result<FeatureField, FeatureDetectionError> {
        self.begin_run(abort.clone()).run(source)
    }
}

/**
The state of one detection run.

Each call to [`DetectionRun::step`] performs the work of the current
[`DetectorState`] and moves to the next one:

- `Init` starts a growth session.
- `Extracting` reads the next batch of spectra, checks their retention time
  order and extracts their peaks. Once the source is exhausted, the remaining
  open peakels are closed and the run moves to `Picking`.
- `Growing` feeds the extracted scans to the growth session, then returns to
  `Extracting`.
- `Picking` groups the peakels into features and commits the [`FeatureField`].

Any error moves the run to `Failed`, where it stays.
*/
pub struct DetectionRun<'a, E: PeakExtractor, G: PeakelGrower, P: PeakelPicker> {
    detector: &'a FeatureDetectorPeakel<E, G, P>,
    abort: AbortHandle,
    state: DetectorState,
    session: Option<G::Session>,
    next_index: usize,
    next_scan_index: usize,
    last_time: Option<f64>,
    pending: Vec<ExtractedScan>,
    peakels: Vec<Peakel>,
    n_peaks: usize,
    field: Option<FeatureField>,
}

impl<'a, E: PeakExtractor, G: PeakelGrower, P: PeakelPicker> DetectionRun<'a, E, G, P> {
    pub fn new(detector: &'a FeatureDetectorPeakel<E, G, P>, abort: AbortHandle) -> Self {
        Self {
            detector,
            abort,
            state: DetectorState::Init,
            session: None,
            next_index: 0,
            next_scan_index: 0,
            last_time: None,
            pending: Vec::new(),
            peakels: Vec::new(),
            n_peaks: 0,
            field: None,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// The number of scans that have taken part in the run so far
    pub fn scans_read(&self) -> usize {
        self.next_scan_index
    }

    /// Perform the work of the current state and advance to the next
    pub fn step<S: SpectrumRunSource>(
        &mut self,
        source: &mut S,
    ) -> Result<DetectorState, FeatureDetectionError> {
        match self.advance(source) {
            Ok(state) => {
                if state != self.state {
                    debug!("Detection run moved from {} to {state}", self.state);
                }
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                debug!("Detection run failed in {}: {e}", self.state);
                self.state = DetectorState::Failed;
                self.session = None;
                self.pending.clear();
                self.peakels.clear();
                self.field = None;
                Err(e)
            }
        }
    }

    /// Step until the run finishes, returning its [`FeatureField`]
    pub fn run<S: SpectrumRunSource>(
        mut self,
        source: &mut S,
    ) -> Result<FeatureField, FeatureDetectionError> {
        while !self.state.is_terminal() {
            self.step(source)?;
        }
        self.into_field().ok_or(FeatureDetectionError::Aborted)
    }

    /// The features of a run that reached [`DetectorState::Done`]
    pub fn into_field(self) -> Option<FeatureField> {
        match self.state {
            DetectorState::Done => self.field,
            _ => None,
        }
    }

    fn check_abort(&self) -> Result<(), FeatureDetectionError> {
        if self.abort.is_aborted() {
            Err(FeatureDetectionError::Aborted)
        } else {
            Ok(())
        }
    }

    fn advance<S: SpectrumRunSource>(
        &mut self,
        source: &mut S,
    ) -> Result<DetectorState, FeatureDetectionError> {
        match self.state {
            DetectorState::Init => {
                debug!(
                    "Starting feature detection over {} spectra",
                    source.spectrum_count()
                );
                self.session = Some(self.detector.grower.begin());
                Ok(DetectorState::Extracting)
            }
            DetectorState::Extracting => self.extract_next_batch(source),
            DetectorState::Growing => self.grow_pending(),
            DetectorState::Picking => self.pick(),
            DetectorState::Done => Ok(DetectorState::Done),
            DetectorState::Failed => Ok(DetectorState::Failed),
        }
    }

    fn read_batch<S: SpectrumRunSource>(
        &mut self,
        source: &mut S,
    ) -> Result<Vec<(usize, usize, SpectrumData)>, FeatureDetectionError> {
        let options = self.detector.options;
        let n = source.spectrum_count();
        let mut batch = Vec::with_capacity(options.batch_size.min(n));
        while self.next_index < n && batch.len() < options.batch_size {
            let index = self.next_index;
            self.next_index += 1;
            let spectrum = source.spectrum(index)?;
            if !options.accepts(&spectrum) {
                trace!(
                    "Skipping spectrum {index} with MS level {}",
                    spectrum.ms_level
                );
                continue;
            }
            let time = spectrum.retention_time;
            if !time.is_finite() {
                return Err(FeatureDetectionError::InputError {
                    index,
                    source: SpectrumError::NonFiniteRetentionTime(time),
                });
            }
            if let Some(previous_time) = self.last_time {
                if time <= previous_time {
                    return Err(FeatureDetectionError::OrderingError {
                        index,
                        time,
                        previous_time,
                    });
                }
            }
            self.last_time = Some(time);
            batch.push((index, self.next_scan_index, spectrum));
            self.next_scan_index += 1;
        }
        Ok(batch)
    }

    fn extract_next_batch<S: SpectrumRunSource>(
        &mut self,
        source: &mut S,
    ) -> Result<DetectorState, FeatureDetectionError> {
        self.check_abort()?;
        let batch = self.read_batch(source)?;
        if batch.is_empty() {
            let session = self.session.take().ok_or(FeatureDetectionError::Aborted)?;
            self.peakels = session.finish();
            debug!(
                "Extracted {} peaks from {} scans into {} peakels",
                self.n_peaks,
                self.next_scan_index,
                self.peakels.len()
            );
            return Ok(DetectorState::Picking);
        }
        let scans = self.detector.extract_batch(&batch)?;
        self.n_peaks += scans.iter().map(|s| s.len()).sum::<usize>();
        self.pending = scans;
        Ok(DetectorState::Growing)
    }

    fn grow_pending(&mut self) -> Result<DetectorState, FeatureDetectionError> {
        let session = self.session.as_mut().ok_or(FeatureDetectionError::Aborted)?;
        for scan in self.pending.drain(..) {
            if self.abort.is_aborted() {
                return Err(FeatureDetectionError::Aborted);
            }
            session.push_scan(&scan)?;
        }
        trace!(
            "{} open and {} closed peakels after {} scans",
            session.open_count(),
            session.closed_count(),
            self.next_scan_index
        );
        Ok(DetectorState::Extracting)
    }

    fn pick(&mut self) -> Result<DetectorState, FeatureDetectionError> {
        self.check_abort()?;
        let peakels: Vec<Arc<Peakel>> = std::mem::take(&mut self.peakels)
            .into_iter()
            .map(Arc::new)
            .collect();
        let features = self.detector.picker.pick(peakels, &self.abort)?;
        let field = FeatureField::new(features);
        debug!("Detected {} features", field.len());
        self.field = Some(field);
        Ok(DetectorState::Done)
    }
}
