use crate::config::{check_count, check_non_negative, ConfigurationError};

/// How to decide which signal is indistinguishable from noise
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NoiseThreshold {
    /// A constant intensity floor for every sample
    Fixed(f64),
    /// Each sample's floor is `multiplier` times the median intensity of the
    /// samples at most `half_width` positions away from it
    LocalMedian { half_width: usize, multiplier: f64 },
    /// Estimate the noise level as the root mean square intensity, assuming the
    /// noise has zero mean, then repeat the estimate using only samples at most
    /// `z_cutoff` times the first estimate. The floor is `snr` times the second
    /// estimate.
    GlobalZeroMean { z_cutoff: f64, snr: f64 },
}

impl Default for NoiseThreshold {
    fn default() -> Self {
        Self::Fixed(0.0)
    }
}

impl NoiseThreshold {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Self::Fixed(floor) => check_non_negative("noise_threshold", *floor),
            Self::LocalMedian {
                half_width,
                multiplier,
            } => {
                check_count("half_width", *half_width)?;
                check_non_negative("multiplier", *multiplier)
            }
            Self::GlobalZeroMean { z_cutoff, snr } => {
                check_non_negative("z_cutoff", *z_cutoff)?;
                check_non_negative("snr", *snr)
            }
        }
    }

    /// Compute the noise floor for a spectrum's intensity array
    pub fn floor_for(&self, intensities: &[f64]) -> NoiseFloor {
        match self {
            Self::Fixed(floor) => NoiseFloor::Uniform(*floor),
            Self::LocalMedian {
                half_width,
                multiplier,
            } => NoiseFloor::PerPoint(local_median_floor(intensities, *half_width, *multiplier)),
            Self::GlobalZeroMean { z_cutoff, snr } => {
                NoiseFloor::Uniform(zero_mean_noise(intensities, *z_cutoff) * snr)
            }
        }
    }
}

/// The noise floor computed for one spectrum
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseFloor {
    Uniform(f64),
    PerPoint(Vec<f64>),
}

impl NoiseFloor {
    /// The floor at sample `i`
    #[inline]
    pub fn at(&self, i: usize) -> f64 {
        match self {
            Self::Uniform(floor) => *floor,
            Self::PerPoint(floors) => floors.get(i).copied().unwrap_or(f64::INFINITY),
        }
    }

    /// Whether the sample at position `i` with intensity `intensity` is signal
    #[inline]
    pub fn passes(&self, i: usize, intensity: f64) -> bool {
        intensity > 0.0 && intensity >= self.at(i)
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn local_median_floor(intensities: &[f64], half_width: usize, multiplier: f64) -> Vec<f64> {
    let n = intensities.len();
    // A window wider than the spectrum covers all of it
    let half_width = half_width.min(n);
    let mut window = Vec::with_capacity(half_width.saturating_mul(2).saturating_add(1).min(n));
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half_width);
            let end = i.saturating_add(half_width).saturating_add(1).min(n);
            window.clear();
            window.extend_from_slice(&intensities[start..end]);
            median(&mut window) * multiplier
        })
        .collect()
}

fn zero_mean_noise(intensities: &[f64], z_cutoff: f64) -> f64 {
    let rms = |values: &mut dyn Iterator<Item = f64>| -> f64 {
        let (acc, n) = values.fold((0.0, 0usize), |(acc, n), x| (acc + x * x, n + 1));
        if n == 0 {
            0.0
        } else {
            (acc / n as f64).sqrt()
        }
    };
    let first = rms(&mut intensities.iter().copied());
    let cutoff = first * z_cutoff;
    rms(&mut intensities.iter().copied().filter(|x| *x <= cutoff))
}
