//! Linking peaks across scans into chromatographic traces.
mod grow;
#[allow(clippy::module_inception)]
mod peakel;

pub use grow::{
    GrowthError, PeakelGrower, PeakelGrowerConfig, PeakelGrowth, ProximityGrowthSession,
    ProximityPeakelGrower,
};
pub use peakel::{Peakel, PeakelId};
