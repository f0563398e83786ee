//! Text formats around a run: price CSV in, `a; b; value;` pair lists out,
//! plus CSV dumps of the square matrix and of cluster labels.
//!
//! Input rows look like `Date,Open,High,Low,Close,Adj Close,Volume,Ticker`.
//! Close prices are grouped per ticker in order of first appearance.

use crate::block::BlockPlan;
use crate::cluster::Clustering;
use crate::condensed::CondensedMatrix;
use crate::farm_error::FarmError;
use crate::sequence::{SequenceTable, SeriesMeta};
use hashbrown::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const CLOSE_COLUMN: usize = 4;
const TICKER_COLUMN: usize = 7;

/// Default cap on points kept per ticker.
pub const MAX_POINTS: usize = 2000;

/// Parse price rows into one series per ticker.
///
/// The first line is a header. Rows with too few columns or an empty close
/// are skipped; a close that does not parse is an error. Tickers beyond
/// `max_series` are dropped, as are points beyond `max_points`.
pub fn parse_series_csv<R: BufRead>(
    reader: R,
    max_series: usize,
    max_points: usize,
) -> Result<SequenceTable, FarmError> {
    let mut series: Vec<Vec<f64>> = Vec::new();
    let mut meta: Vec<SeriesMeta> = Vec::new();
    let mut by_ticker: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for (n, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
        let (Some(close), Some(ticker)) = (fields.get(CLOSE_COLUMN), fields.get(TICKER_COLUMN))
        else {
            skipped += 1;
            continue;
        };
        let (close, ticker) = (close.trim(), ticker.trim());
        if close.is_empty() || ticker.is_empty() {
            skipped += 1;
            continue;
        }
        let value: f64 = close.parse().map_err(|e| FarmError::Parse {
            line: n + 1,
            reason: format!("close {close:?}: {e}"),
        })?;

        let id = match by_ticker.get(ticker).copied() {
            Some(id) => id,
            None if series.len() < max_series => {
                by_ticker.insert(ticker.to_string(), series.len());
                series.push(Vec::new());
                meta.push(SeriesMeta::new(ticker));
                series.len() - 1
            }
            None => continue,
        };
        if series[id].len() < max_points {
            series[id].push(value);
        }
    }

    if skipped > 0 {
        log::debug!("csv: skipped {skipped} incomplete rows");
    }
    log::info!("csv: loaded {} series", series.len());
    SequenceTable::with_meta(series, meta)
}

pub fn load_series_csv(
    path: impl AsRef<Path>,
    max_series: usize,
    max_points: usize,
) -> Result<SequenceTable, FarmError> {
    let file = File::open(path)?;
    parse_series_csv(BufReader::new(file), max_series, max_points)
}

/// One `a; b; value;` line per pair, in condensed order.
pub fn write_pairs<W: Write>(
    mut out: W,
    matrix: &CondensedMatrix,
    meta: &[SeriesMeta],
) -> Result<(), FarmError> {
    let label = |i: usize| -> Result<&str, FarmError> {
        meta.get(i)
            .map(|m| m.label.as_str())
            .ok_or(FarmError::UnknownSequence(i))
    };
    for (index, value) in matrix.as_slice().iter().enumerate() {
        let (a, b) = matrix
            .plan()
            .pair_at(index)
            .ok_or_else(|| FarmError::InvalidBlock(format!("no pair at index {index}")))?;
        writeln!(out, "{}; {}; {value:.6};", label(a)?, label(b)?)?;
    }
    out.flush()?;
    Ok(())
}

pub fn save_pairs(
    path: impl AsRef<Path>,
    matrix: &CondensedMatrix,
    meta: &[SeriesMeta],
) -> Result<(), FarmError> {
    write_pairs(BufWriter::new(File::create(path)?), matrix, meta)
}

/// Read a pair list written by [`write_pairs`] back into `plan`'s layout.
///
/// Labels are not checked; values are taken positionally and their count
/// must match the plan exactly. Blank lines are ignored.
pub fn read_pairs<R: BufRead>(reader: R, plan: BlockPlan) -> Result<CondensedMatrix, FarmError> {
    let mut values: Vec<f64> = Vec::with_capacity(plan.len());
    let mut last_line = 0;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        last_line = n + 1;
        if line.trim().is_empty() {
            continue;
        }
        let raw = line.split(';').nth(2).map(str::trim).ok_or_else(|| FarmError::Parse {
            line: n + 1,
            reason: "expected `a; b; value;`".into(),
        })?;
        let value = raw.parse::<f64>().map_err(|e| FarmError::Parse {
            line: n + 1,
            reason: format!("value {raw:?}: {e}"),
        })?;
        values.push(value);
    }
    if values.len() != plan.len() {
        return Err(FarmError::Parse {
            line: last_line,
            reason: format!("expected {} distances, found {}", plan.len(), values.len()),
        });
    }
    CondensedMatrix::from_parts(plan, values)
}

/// Dense square CSV: a `Ticker,<labels>` header, then one row per series
/// led by its label. Pairs outside the block print as `NaN`.
pub fn write_square_matrix<W: Write>(
    mut out: W,
    matrix: &CondensedMatrix,
    meta: &[SeriesMeta],
) -> Result<(), FarmError> {
    let n = matrix.num_series();
    if meta.len() < n {
        return Err(FarmError::UnknownSequence(meta.len()));
    }
    let labels = &meta[..n];
    write!(out, "Ticker")?;
    for m in labels {
        write!(out, ",{}", m.label)?;
    }
    writeln!(out)?;
    for (m, row) in labels.iter().zip(matrix.to_square()) {
        write!(out, "{}", m.label)?;
        for v in row {
            write!(out, ",{v:.6}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

pub fn save_square_matrix(
    path: impl AsRef<Path>,
    matrix: &CondensedMatrix,
    meta: &[SeriesMeta],
) -> Result<(), FarmError> {
    write_square_matrix(BufWriter::new(File::create(path)?), matrix, meta)
}

/// `Ticker,Cluster` CSV with one row per series. Noise is written as `-1`.
pub fn write_cluster_labels<W: Write>(
    mut out: W,
    clustering: &Clustering,
    meta: &[SeriesMeta],
) -> Result<(), FarmError> {
    if meta.len() < clustering.labels.len() {
        return Err(FarmError::UnknownSequence(meta.len()));
    }
    writeln!(out, "Ticker,Cluster")?;
    for (m, label) in meta.iter().zip(&clustering.labels) {
        match label {
            Some(c) => writeln!(out, "{},{c}", m.label)?,
            None => writeln!(out, "{},-1", m.label)?,
        }
    }
    out.flush()?;
    Ok(())
}

pub fn save_cluster_labels(
    path: impl AsRef<Path>,
    clustering: &Clustering,
    meta: &[SeriesMeta],
) -> Result<(), FarmError> {
    write_cluster_labels(BufWriter::new(File::create(path)?), clustering, meta)
}
