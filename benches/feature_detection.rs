use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mzfeature::prelude::*;
use mzfeature::utils::{isotopic_spacing, mass_charge_ratio};
use mzfeature::{DefaultFeatureDetector, DetectorConfig, MemoryRunSource, SpectrumData};

const MZ_STEP: f64 = 0.002;
const MZ_SIGMA: f64 = 0.005;

/// A run of `n_scans` profile spectra holding `n_species` charge 2 envelopes spread
/// across m/z and retention time
fn synthetic_run(n_scans: usize, n_species: usize) -> Vec<SpectrumData> {
    (0..n_scans)
        .map(|scan| {
            let mut mzs = Vec::new();
            let mut intensities = Vec::new();
            for i in 0..n_species {
                let mz = mass_charge_ratio(800.0 + i as f64 * 7.3, 2);
                let apex = (i * 7) % n_scans;
                let x = scan as f64 - apex as f64;
                let scale = 1e4 * (-(x * x) / 18.0).exp();
                for (k, rel) in [1.0, 0.7, 0.3].iter().enumerate() {
                    let center = mz + k as f64 * isotopic_spacing(2);
                    for j in -5i32..=5 {
                        let point = center + j as f64 * MZ_STEP;
                        let inten = if j.abs() == 5 {
                            0.0
                        } else {
                            scale * rel * (-((point - center).powi(2)) / (2.0 * MZ_SIGMA * MZ_SIGMA)).exp()
                        };
                        mzs.push(point);
                        intensities.push(inten);
                    }
                }
            }
            SpectrumData::new(scan as f64 * 0.05, mzs, intensities, 1)
        })
        .collect()
}

fn detection(c: &mut Criterion) {
    let spectra = synthetic_run(200, 100);
    let detector = DefaultFeatureDetector::from_config(DetectorConfig::default()).unwrap();

    c.bench_function("extract_peaks", |b| {
        let extractor = detector.extractor().clone();
        b.iter(|| {
            for (i, s) in spectra.iter().enumerate() {
                black_box(extractor.extract(black_box(s), i).unwrap());
            }
        })
    });
    c.bench_function("detect_features", |b| {
        b.iter(|| {
            let mut source = MemoryRunSource::from(spectra.clone());
            black_box(detector.detect(&mut source).unwrap())
        })
    });
}

criterion_group!(benches, detection);
criterion_main!(benches);
