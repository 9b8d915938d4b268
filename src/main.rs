use std::env;
use std::io;
use std::process;
use std::time::Instant;

use chromsignal::arrayops::linspace;
use chromsignal::pipeline::Pipeline;
use chromsignal::signal::{Selection, Signal};
use chromsignal::text::{peaks_to_writer, signal_from_file, TextError};

/// A sloped baseline under a tailing peak, used when no input file is given
fn demo_signal() -> Result<Signal, TextError> {
    let time = linspace(0.0, 30.0, 1500);
    let intensity = time
        .iter()
        .map(|t| {
            let d = t - 12.0;
            let denom = 2.0 * 0.6f64.powi(2) + 0.3 * d;
            let peak = if denom > 0.0 {
                250.0 * (-(d * d) / denom).exp()
            } else {
                0.0
            };
            10.0 + 0.5 * t + peak
        })
        .collect();
    Ok(Signal::from_trace(time, intensity)?)
}

fn main() -> io::Result<()> {
    pretty_env_logger::init();

    let signal = match env::args().nth(1) {
        Some(path) => signal_from_file(&path),
        None => demo_signal(),
    };
    let signal = match signal {
        Ok(signal) => signal,
        Err(err) => {
            eprintln!("Failed to load signal: {err}");
            process::exit(1);
        }
    };
    println!(
        "Loaded {} points with {} intensity columns",
        signal.len(),
        signal.columns()
    );

    let start = Instant::now();
    let peaks = match Pipeline::default().run(&signal, &Selection::All, None) {
        Ok(peaks) => peaks,
        Err(err) => {
            eprintln!("Processing failed: {err}");
            process::exit(1);
        }
    };
    println!(
        "Processing took milliseconds {}",
        (Instant::now() - start).as_millis()
    );

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    peaks_to_writer(peaks.results.iter().map(|p| p.as_ref()), &mut handle)?;
    Ok(())
}
