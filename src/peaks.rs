//! Single-spectrum peak detection.
mod extract;
mod noise;
mod peak;

pub use extract::{LocalMaximumPeakExtractor, PeakExtractor, PeakExtractorConfig};
pub use noise::{NoiseFloor, NoiseThreshold};
pub use peak::{ExtractedScan, Peak, PeakList};
