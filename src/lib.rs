//! `mzfeature` detects features, isotope-resolved and charge-resolved chemical
//! species, in LC-MS runs.
//!
//! Detection runs in three stages, each behind its own trait:
//!
//! 1. A [`PeakExtractor`] finds the peaks of each spectrum.
//! 2. A [`PeakelGrower`] links peaks of the same m/z across scans into [`Peakel`]s.
//! 3. A [`PeakelPicker`] groups co-eluting peakels whose m/z follow an isotopic
//!    series into [`Feature`]s.
//!
//! [`FeatureDetectorPeakel`] runs the stages over a [`SpectrumRunSource`] and
//! produces a [`FeatureField`].
pub mod config;
pub mod detector;
pub mod feature;
pub mod peakel;
pub mod peaks;
pub mod prelude;
pub mod source;
pub mod spectrum;
pub mod utils;

pub use crate::config::{ConfigurationError, DetectorConfig};
pub use crate::detector::{
    AbortHandle, DefaultFeatureDetector, DetectionOptions, DetectionRun, DetectorState,
    FeatureDetectionError, FeatureDetector, FeatureDetectorPeakel,
};
pub use crate::feature::{
    ChargeRange, Feature, FeatureField, IsotopeEnvelopePicker, PeakelPicker, PeakelPickerConfig,
    PickingError,
};
pub use crate::peakel::{
    GrowthError, Peakel, PeakelGrower, PeakelGrowerConfig, PeakelGrowth, PeakelId,
    ProximityPeakelGrower,
};
pub use crate::peaks::{
    ExtractedScan, LocalMaximumPeakExtractor, NoiseThreshold, Peak, PeakExtractor,
    PeakExtractorConfig, PeakList,
};
pub use crate::source::{MemoryRunSource, SpectrumAccessError, SpectrumRunSource};
pub use crate::spectrum::{SignalContinuity, SpectrumData, SpectrumError};

pub use mzpeaks::Tolerance;
