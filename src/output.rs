//! Dated and "latest" copies of the fragility table, replaced atomically.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{FragilityError, Result};
use crate::scoring::{FragilityRow, table_order};
use crate::time::TimeBand;

pub const TABLE_STEM: &str = "fragility_by_timeband";
pub const SUMMARY_STEM: &str = "fragility_run_summary";

/// Column order of the published table.
#[derive(Debug, Serialize)]
struct OutputRecord<'a> {
    route_id: &'a str,
    route_short_name: &'a str,
    direction_id: u8,
    time_band: TimeBand,
    trips: usize,
    median_runtime_min: f64,
    p10_runtime_min: f64,
    p90_runtime_min: f64,
    runtime_spread_min: f64,
    layovers: Option<usize>,
    median_layover_min: f64,
    p10_layover_min: Option<f64>,
    p90_layover_min: Option<f64>,
    layover_score: f64,
    runtime_score: f64,
    fragility_score: f64,
    why: &'a str,
    data_updated_date: &'a str,
}

impl<'a> OutputRecord<'a> {
    fn new(row: &'a FragilityRow, date: &'a str) -> Self {
        OutputRecord {
            route_id: &row.route_id,
            route_short_name: &row.route_short_name,
            direction_id: row.direction_id,
            time_band: row.time_band,
            trips: row.trips,
            median_runtime_min: row.median_runtime_min,
            p10_runtime_min: row.p10_runtime_min,
            p90_runtime_min: row.p90_runtime_min,
            runtime_spread_min: row.runtime_spread_min,
            layovers: row.layovers,
            median_layover_min: row.median_layover_min,
            p10_layover_min: row.p10_layover_min,
            p90_layover_min: row.p90_layover_min,
            layover_score: row.layover_score,
            runtime_score: row.runtime_score,
            fragility_score: row.fragility_score,
            why: &row.why,
            data_updated_date: date,
        }
    }
}

/// Sorts into table order and serializes with the run date on every row.
pub fn render_table(rows: &[FragilityRow], date: NaiveDate) -> Result<Vec<u8>> {
    let mut sorted: Vec<&FragilityRow> = rows.iter().collect();
    sorted.sort_by(|a, b| table_order(a, b));

    let date = date.to_string();
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in sorted {
        wtr.serialize(OutputRecord::new(row, &date))
            .map_err(|e| FragilityError::FileError(format!("Failed to serialize row: {}", e)))?;
    }
    wtr.into_inner()
        .map_err(|e| FragilityError::FileError(format!("Failed to flush table: {}", e)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub dated: PathBuf,
    pub latest: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        OutputWriter { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self, stem: &str, extension: &str, date: NaiveDate) -> OutputPaths {
        OutputPaths {
            dated: self.dir.join(format!("{}_{}.{}", stem, date, extension)),
            latest: self.dir.join(format!("{}_latest.{}", stem, extension)),
        }
    }

    pub fn write_table(&self, rows: &[FragilityRow], date: NaiveDate) -> Result<OutputPaths> {
        let contents = render_table(rows, date)?;
        let paths = self.paths(TABLE_STEM, "csv", date);
        self.publish(&[(&paths, contents.as_slice())])?;
        tracing::info!(
            rows = rows.len(),
            dated = %paths.dated.display(),
            latest = %paths.latest.display(),
            "Saved fragility table"
        );
        Ok(paths)
    }

    pub fn write_summary<T: Serialize>(&self, summary: &T, date: NaiveDate) -> Result<OutputPaths> {
        let contents = render_summary(summary)?;
        let paths = self.paths(SUMMARY_STEM, "json", date);
        self.publish(&[(&paths, contents.as_slice())])?;
        Ok(paths)
    }

    /// Table and summary of one run. Both payloads are rendered before any
    /// file is touched, then the dated copies land ahead of the "latest" ones.
    pub fn write_run<T: Serialize>(
        &self,
        rows: &[FragilityRow],
        summary: &T,
        date: NaiveDate,
    ) -> Result<RunOutputs> {
        let table_contents = render_table(rows, date)?;
        let summary_contents = render_summary(summary)?;

        let outputs = RunOutputs {
            table: self.paths(TABLE_STEM, "csv", date),
            summary: self.paths(SUMMARY_STEM, "json", date),
        };
        self.publish(&[
            (&outputs.table, table_contents.as_slice()),
            (&outputs.summary, summary_contents.as_slice()),
        ])?;
        tracing::info!(
            rows = rows.len(),
            table = %outputs.table.latest.display(),
            summary = %outputs.summary.latest.display(),
            "Published run outputs"
        );
        Ok(outputs)
    }

    fn publish(&self, payloads: &[(&OutputPaths, &[u8])]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            FragilityError::FileError(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;
        for (paths, contents) in payloads {
            write_atomic(&self.dir, &paths.dated, contents)?;
        }
        for (paths, contents) in payloads {
            write_atomic(&self.dir, &paths.latest, contents)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutputs {
    pub table: OutputPaths,
    pub summary: OutputPaths,
}

fn render_summary<T: Serialize>(summary: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(summary).map_err(|e| {
        FragilityError::FileError(format!("Failed to serialize run summary: {}", e))
    })
}

/// Writes beside the target, then renames over it, so readers never see a
/// half-written file.
fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    let fail = |e: std::io::Error| {
        FragilityError::FileError(format!("Failed to write {}: {}", path.display(), e))
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(contents).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}
