//! Grouping peakels into isotope-resolved, charge-resolved features.
mod field;
mod model;
mod pick;

pub use field::FeatureField;
pub use model::Feature;
pub use pick::{ChargeRange, IsotopeEnvelopePicker, PeakelPicker, PeakelPickerConfig, PickingError};
