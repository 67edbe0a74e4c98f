//! The traits and default strategies most callers need
pub use crate::detector::{FeatureDetector, FeatureDetectorPeakel};
pub use crate::feature::{IsotopeEnvelopePicker, PeakelPicker};
pub use crate::peakel::{PeakelGrower, PeakelGrowth, ProximityPeakelGrower};
pub use crate::peaks::{LocalMaximumPeakExtractor, PeakExtractor};
pub use crate::source::SpectrumRunSource;
pub use mzpeaks::feature::TimeInterval;
pub use mzpeaks::KnownCharge;
