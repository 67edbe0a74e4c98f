use std::collections::HashSet;

use mzfeature::prelude::*;
use mzfeature::utils::{isotopic_spacing, mass_charge_ratio};
use mzfeature::{
    DefaultFeatureDetector, DetectionOptions, DetectorConfig, FeatureDetectionError,
    MemoryRunSource, NoiseThreshold, PeakExtractorConfig, PeakelPickerConfig, SpectrumData,
    SpectrumError, Tolerance,
};

const MZ_STEP: f64 = 0.002;
const MZ_SIGMA: f64 = 0.005;
const HALF_POINTS: i32 = 4;

/// An isotopic envelope that elutes as a Gaussian over a range of scans
struct SimulatedSpecies {
    mass: f64,
    charge: i32,
    heights: Vec<f64>,
    first_scan: usize,
    last_scan: usize,
}

impl SimulatedSpecies {
    fn new(mass: f64, charge: i32, heights: &[f64], first_scan: usize, last_scan: usize) -> Self {
        Self {
            mass,
            charge,
            heights: heights.to_vec(),
            first_scan,
            last_scan,
        }
    }

    fn elution(&self, scan: usize) -> f64 {
        if scan < self.first_scan || scan > self.last_scan {
            return 0.0;
        }
        let center = (self.first_scan + self.last_scan) as f64 / 2.0;
        let x = scan as f64 - center;
        (-(x * x) / 8.0).exp()
    }

    fn centers(&self) -> Vec<(f64, f64)> {
        let mz = mass_charge_ratio(self.mass, self.charge);
        self.heights
            .iter()
            .enumerate()
            .map(|(k, h)| (mz + k as f64 * isotopic_spacing(self.charge), *h))
            .collect()
    }
}

/// Draw each `(center, height)` pair as a sampled Gaussian bordered by zero intensity
/// samples. Samples shared by several peaks carry the sum of their intensities.
fn render_profile(centers: &[(f64, f64)]) -> (Vec<f64>, Vec<f64>) {
    let mut mzs: Vec<f64> = centers
        .iter()
        .flat_map(|(center, _)| {
            (-(HALF_POINTS + 1)..=(HALF_POINTS + 1)).map(move |k| center + k as f64 * MZ_STEP)
        })
        .collect();
    mzs.sort_by(|a, b| a.total_cmp(b));
    mzs.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    let window = HALF_POINTS as f64 * MZ_STEP + 1e-9;
    let intensities = mzs
        .iter()
        .map(|mz| {
            centers
                .iter()
                .filter(|(center, _)| (mz - center).abs() <= window)
                .map(|(center, height)| {
                    height * (-((mz - center).powi(2)) / (2.0 * MZ_SIGMA * MZ_SIGMA)).exp()
                })
                .sum()
        })
        .collect();
    (mzs, intensities)
}

/// Render every species into a profile spectrum for each scan. Isotopes that are not
/// eluting are still drawn, with zero intensity.
fn simulate_run(species: &[SimulatedSpecies], n_scans: usize) -> Vec<SpectrumData> {
    (0..n_scans)
        .map(|scan| {
            let centers: Vec<(f64, f64)> = species
                .iter()
                .flat_map(|s| {
                    let scale = s.elution(scan);
                    s.centers().into_iter().map(move |(mz, h)| (mz, h * scale))
                })
                .collect();
            let (mzs, intensities) = render_profile(&centers);
            SpectrumData::new(scan as f64 * 0.1, mzs, intensities, 1)
        })
        .collect()
}

fn single_envelope_run() -> Vec<SpectrumData> {
    simulate_run(
        &[SimulatedSpecies::new(1500.0, 2, &[1e4, 8e3, 3.5e3], 5, 15)],
        20,
    )
}

#[test_log::test]
fn test_single_envelope() {
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();
    let mut source = MemoryRunSource::from(single_envelope_run());
    let field = detector.detect(&mut source).unwrap();

    assert_eq!(field.len(), 1);
    let feature = &field[0];
    assert_eq!(feature.charge(), 2);
    assert!(
        (feature.monoisotopic_mass() - 1500.0).abs() < 0.01,
        "{}",
        feature.monoisotopic_mass()
    );
    assert_eq!(feature.len(), 3);
    let (start, end) = feature.retention_time_range();
    assert!(start <= 0.5 + 1e-9, "{start}");
    assert!(end >= 1.5 - 1e-9, "{end}");
    assert!((feature.apex_time() - 1.0).abs() < 1e-9);
    for peakel in feature.peakels() {
        assert_eq!(peakel.first_scan(), 5);
        assert_eq!(peakel.last_scan(), 15);
    }
}

#[test]
fn test_unrelated_trace_is_noise() {
    let spectra = simulate_run(
        &[
            SimulatedSpecies::new(1500.0, 2, &[1e4, 8e3, 3.5e3], 5, 15),
            SimulatedSpecies::new(599.0, 1, &[2e4], 0, 19),
        ],
        20,
    );
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();
    let field = detector
        .detect(&mut MemoryRunSource::from(spectra.clone()))
        .unwrap();
    assert_eq!(field.len(), 1);
    assert_eq!(field[0].charge(), 2);

    let detector = DefaultFeatureDetector::from_config(
        DetectorConfig::default()
            .with_picking(PeakelPickerConfig::default().with_allow_singletons(true)),
    )
    .unwrap();
    let field = detector.detect(&mut MemoryRunSource::from(spectra)).unwrap();
    assert_eq!(field.len(), 2);
    assert!(field.nearest_mass(599.0, Tolerance::PPM(10.0)).is_some());
}

#[test]
fn test_idempotent() {
    let spectra = simulate_run(
        &[
            SimulatedSpecies::new(1500.0, 2, &[1e4, 8e3, 3.5e3], 5, 15),
            SimulatedSpecies::new(2100.0, 3, &[5e3, 6e3, 3e3, 1e3], 2, 12),
            SimulatedSpecies::new(900.0, 1, &[7e3, 3e3], 8, 18),
        ],
        20,
    );
    let detector = DefaultFeatureDetector::from_config(
        DetectorConfig::default().with_options(DetectionOptions::default().with_batch_size(3)),
    )
    .unwrap();
    let first = detector
        .detect(&mut MemoryRunSource::from(spectra.clone()))
        .unwrap();
    let second = detector.detect(&mut MemoryRunSource::from(spectra)).unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.charge(), b.charge());
        assert_eq!(a.monoisotopic_mass(), b.monoisotopic_mass());
        assert_eq!(a.total_abundance(), b.total_abundance());
        assert_eq!(a.retention_time_range(), b.retention_time_range());
    }
    let charges: Vec<i32> = first.iter().map(|f| f.charge()).collect();
    assert_eq!(charges, vec![3, 2, 1]);
}

#[test]
fn test_no_shared_peakels() {
    // The charge 2 and charge 4 envelopes share m/z channels
    let spectra = simulate_run(
        &[
            SimulatedSpecies::new(1500.0, 2, &[1e4, 8e3, 3.5e3], 3, 15),
            SimulatedSpecies::new(3000.0, 4, &[4e3, 5e3, 3e3, 2e3, 1e3], 6, 18),
        ],
        20,
    );
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();
    let field = detector.detect(&mut MemoryRunSource::from(spectra)).unwrap();
    assert!(!field.is_empty());
    let mut seen = HashSet::new();
    for feature in field.iter() {
        for peakel in feature.peakels() {
            assert!(seen.insert(peakel.id()), "{peakel} is claimed twice");
        }
    }
}

#[test]
fn test_inconsistent_spacing_not_grouped() {
    let spectra: Vec<_> = (0..10)
        .map(|scan| {
            let (mzs, intensities) =
                render_profile(&[(700.0, 1000.0), (700.37, 1000.0), (700.74, 1000.0)]);
            SpectrumData::new(scan as f64, mzs, intensities, 1)
        })
        .collect();
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();
    let field = detector.detect(&mut MemoryRunSource::from(spectra)).unwrap();
    assert!(field.is_empty());
}

#[test]
fn test_all_zero_scan_contributes_nothing() {
    let mut spectra = single_envelope_run();
    for inten in spectra[10].intensities.iter_mut() {
        *inten = 0.0;
    }
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();
    let field = detector.detect(&mut MemoryRunSource::from(spectra)).unwrap();
    assert_eq!(field.len(), 1);
    for peakel in field[0].peakels() {
        assert!(peakel.iter().all(|p| p.scan_index != 10));
        assert_eq!(peakel.len(), 10);
        assert_eq!(peakel.max_scan_gap(), 2);
    }
}

#[test]
fn test_out_of_order_run() {
    let mut spectra = single_envelope_run();
    spectra.swap(7, 8);
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();
    let result = detector.detect(&mut MemoryRunSource::from(spectra));
    match result {
        Err(FeatureDetectionError::OrderingError {
            index,
            time,
            previous_time,
        }) => {
            assert_eq!(index, 8);
            assert!(time < previous_time);
        }
        other => panic!("Expected an ordering error, got {other:?}"),
    }
}

#[test]
fn test_malformed_spectrum() {
    let mut spectra = single_envelope_run();
    spectra[4].intensities.pop();
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();
    let result = detector.detect(&mut MemoryRunSource::from(spectra));
    assert!(matches!(
        result,
        Err(FeatureDetectionError::InputError {
            index: 4,
            source: SpectrumError::MZIntensityArraySizeMismatch { .. }
        })
    ));
}

#[test]
fn test_empty_run() {
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();
    let field = detector.detect(&mut MemoryRunSource::default()).unwrap();
    assert!(field.is_empty());
}

#[test]
fn test_noise_floor_respected() {
    let extractor = LocalMaximumPeakExtractor::new(
        PeakExtractorConfig::default().with_noise_threshold(NoiseThreshold::Fixed(2000.0)),
    )
    .unwrap();
    for (i, spectrum) in single_envelope_run().iter().enumerate() {
        let scan = extractor.extract(spectrum, i).unwrap();
        for peak in scan.iter() {
            assert!(peak.intensity >= 2000.0, "{peak}");
        }
    }
}

#[test]
fn test_non_finite_retention_time_rejected() {
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();
    for index in [0, 9] {
        let mut spectra = single_envelope_run();
        spectra[index].retention_time = f64::NAN;
        let result = detector.detect(&mut MemoryRunSource::from(spectra));
        match result {
            Err(FeatureDetectionError::InputError {
                index: i,
                source: SpectrumError::NonFiniteRetentionTime(time),
            }) => {
                assert_eq!(i, index);
                assert!(time.is_nan());
            }
            other => panic!("Expected an input error, got {other:?}"),
        }
    }
}
