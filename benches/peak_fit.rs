use criterion::Criterion;

use chromsignal::arrayops::linspace;
use chromsignal::peak_fit::{ExponentialGaussianPeakShape, PeakFitter};
use chromsignal::PeakDetector;

fn tailing_peak() -> (Vec<f64>, Vec<f64>) {
    let time = linspace(0.0, 20.0, 2000);
    let intensity = ExponentialGaussianPeakShape::new(8.0, 100.0, 0.6, 0.4).predict(&time);
    (time, intensity)
}

fn detection(c: &mut Criterion) {
    let (time, intensity) = tailing_peak();
    let detector = PeakDetector::default();
    c.bench_function("detect_tailing_peak", |b| {
        b.iter(|| detector.detect(&time, &intensity))
    });
}

fn fitting(c: &mut Criterion) {
    let (time, intensity) = tailing_peak();
    let fitter = PeakFitter::default();
    c.bench_function("fit_tailing_peak", |b| {
        b.iter(|| fitter.fit(&time, &intensity))
    });
}

fn peak_fitting(c: &mut Criterion) {
    detection(c);
    fitting(c);
}

criterion::criterion_group!(benches, peak_fitting);
criterion::criterion_main!(benches);
