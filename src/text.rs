//! Read and write delimited text tables of signals and peaks
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path;

use thiserror::Error;

use crate::peak::ChromatographicPeak;
use crate::signal::{IntensityMatrix, Signal, SignalError};

#[derive(Debug, Error)]
pub enum TextError {
    #[error("An IO error occurred: {0}")]
    Io(#[from] io::Error),
    #[error("Could not parse {value:?} as a number on line {line}")]
    Parse { line: usize, value: String },
    #[error("Line {line} has {found} columns, expected {expected}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("The table must have a time column and at least one intensity column")]
    TooFewColumns,
    #[error(transparent)]
    Signal(#[from] SignalError),
}

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

/// Read a time column followed by one or more intensity columns.
///
/// Fields may be separated by commas, semicolons, tabs or spaces. Blank lines and lines
/// starting with `#` are skipped, as is a header line before the first numeric row.
pub fn signal_from_reader<R: BufRead>(reader: R) -> Result<Signal, TextError> {
    let mut time = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut width: Option<usize> = None;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = split_fields(trimmed).collect();
        let parsed: Result<Vec<f64>, _> = fields.iter().map(|f| f.parse::<f64>()).collect();
        let values = match parsed {
            Ok(values) => values,
            Err(_) if width.is_none() && time.is_empty() => continue,
            Err(_) => {
                let value = fields
                    .iter()
                    .find(|f| f.parse::<f64>().is_err())
                    .map(|f| f.to_string())
                    .unwrap_or_default();
                return Err(TextError::Parse {
                    line: line_no,
                    value,
                });
            }
        };
        let expected = *width.get_or_insert(values.len());
        if values.len() != expected {
            return Err(TextError::ColumnCount {
                line: line_no,
                expected,
                found: values.len(),
            });
        }
        if expected < 2 {
            return Err(TextError::TooFewColumns);
        }
        time.push(values[0]);
        rows.push(values[1..].to_vec());
    }
    if rows.is_empty() {
        return Err(TextError::TooFewColumns);
    }
    let intensity = IntensityMatrix::from_rows(&rows)?;
    Ok(Signal::new(time, intensity)?)
}

pub fn signal_from_file<P: AsRef<path::Path>>(path: P) -> Result<Signal, TextError> {
    let reader = io::BufReader::new(fs::File::open(path)?);
    signal_from_reader(reader)
}

/// Write `signal` as tab-separated rows of time followed by each intensity column
pub fn signal_to_writer<W: Write>(signal: &Signal, writer: &mut W) -> io::Result<()> {
    for (i, t) in signal.time().iter().enumerate() {
        write!(writer, "{t}")?;
        for col in signal.intensity().iter_columns() {
            write!(writer, "\t{}", col[i])?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn signal_to_file<P: AsRef<path::Path>>(signal: &Signal, path: P) -> io::Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = io::BufWriter::new(file);
    signal_to_writer(signal, &mut writer)?;
    writer.flush()
}

/// Write a tab-separated peak table with one row per fitted column.
///
/// Columns without a result, e.g. after cancellation, are skipped.
pub fn peaks_to_writer<'a, W: Write, I>(peaks: I, writer: &mut W) -> io::Result<()>
where
    I: IntoIterator<Item = Option<&'a ChromatographicPeak>>,
{
    writeln!(
        writer,
        "column\tcenter\tleft\tright\theight\twidth\tdecay\tarea\tfit_error"
    )?;
    for (i, peak) in peaks.into_iter().enumerate() {
        let Some(peak) = peak else { continue };
        writeln!(
            writer,
            "{i}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            peak.center,
            peak.left,
            peak.right,
            peak.height,
            peak.width,
            peak.decay,
            peak.area,
            peak.fit_error
        )?;
    }
    Ok(())
}
