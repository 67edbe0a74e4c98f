//! Configuration for the whole feature detection pipeline.
//!
//! Each stage owns its own configuration type next to its implementation. This
//! module bundles them into [`DetectorConfig`] and defines the error raised when
//! any parameter is unusable.
use mzpeaks::Tolerance;
use thiserror::Error;

use crate::detector::DetectionOptions;
use crate::feature::PeakelPickerConfig;
use crate::peakel::PeakelGrowerConfig;
use crate::peaks::PeakExtractorConfig;

/// Errors describing invalid strategy parameters, detected before a run starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("{name} must be a finite, non-negative number, but got {value}")]
    InvalidValue { name: &'static str, value: f64 },
    #[error("{name} must be a finite, positive tolerance, but got {tolerance:?}")]
    InvalidTolerance {
        name: &'static str,
        tolerance: Tolerance,
    },
    #[error("The charge range {min}..={max} is empty or includes non-positive charges")]
    InvalidChargeRange { min: i32, max: i32 },
    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),
    #[error("Failed to read configuration: {0}")]
    Malformed(String),
}

pub(crate) fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue { name, value })
    }
}

pub(crate) fn check_tolerance(
    name: &'static str,
    tolerance: Tolerance,
) -> Result<(), ConfigurationError> {
    let width = match tolerance {
        Tolerance::PPM(v) => v,
        Tolerance::Da(v) => v,
    };
    if width.is_finite() && width > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidTolerance { name, tolerance })
    }
}

pub(crate) fn check_count(name: &'static str, value: usize) -> Result<(), ConfigurationError> {
    if value == 0 {
        Err(ConfigurationError::ZeroCount(name))
    } else {
        Ok(())
    }
}

/// The complete set of parameters for a [`FeatureDetectorPeakel`](crate::detector::FeatureDetectorPeakel)
/// built from the default strategies.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectorConfig {
    pub extraction: PeakExtractorConfig,
    pub growth: PeakelGrowerConfig,
    pub picking: PeakelPickerConfig,
    pub options: DetectionOptions,
}

impl DetectorConfig {
    pub fn new(
        extraction: PeakExtractorConfig,
        growth: PeakelGrowerConfig,
        picking: PeakelPickerConfig,
        options: DetectionOptions,
    ) -> Self {
        Self {
            extraction,
            growth,
            picking,
            options,
        }
    }

    pub fn with_extraction(mut self, extraction: PeakExtractorConfig) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn with_growth(mut self, growth: PeakelGrowerConfig) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_picking(mut self, picking: PeakelPickerConfig) -> Self {
        self.picking = picking;
        self
    }

    pub fn with_options(mut self, options: DetectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Check every stage's parameters
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.extraction.validate()?;
        self.growth.validate()?;
        self.picking.validate()?;
        self.options.validate()?;
        Ok(())
    }

    /// Read a configuration from JSON, filling in defaults for missing sections
    /// and validating the result.
    ///
    /// **Requires the `serde` feature**
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ConfigurationError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// **Requires the `serde` feature**
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, ConfigurationError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigurationError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::ChargeRange;

    #[test]
    fn test_default_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_parameters() {
        let config = DetectorConfig::default().with_growth(
            PeakelGrowerConfig::default().with_mz_tolerance(Tolerance::PPM(-5.0)),
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidTolerance { .. })
        ));

        let config = DetectorConfig::default().with_picking(
            PeakelPickerConfig::default().with_charge_range(ChargeRange::new(3, 1)),
        );
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::InvalidChargeRange { min: 3, max: 1 })
        );

        let config = DetectorConfig::default()
            .with_growth(PeakelGrowerConfig::default().with_max_gap(0));
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ZeroCount("max_gap"))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_roundtrip() {
        let config = DetectorConfig::default().with_picking(
            PeakelPickerConfig::default().with_charge_range(ChargeRange::new(1, 4)),
        );
        let text = config.to_json().unwrap();
        let dup = DetectorConfig::from_json(&text).unwrap();
        assert_eq!(config, dup);

        let partial = DetectorConfig::from_json(r#"{"growth": {"max_gap": 3}}"#).unwrap();
        assert_eq!(partial.growth.max_gap, 3);
        assert_eq!(partial.picking, PeakelPickerConfig::default());

        assert!(matches!(
            DetectorConfig::from_json(r#"{"growth": {"max_gap": 0}}"#),
            Err(ConfigurationError::ZeroCount("max_gap"))
        ));
    }
}
