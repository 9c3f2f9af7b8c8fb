//! Result aggregation.
//!
//! Partitions run outcomes into successes and failures, restores builder
//! order, and writes the sweep artifacts:
//!
//! - `study-<label>.csv`: one row per successful run
//! - `errors-<label>.csv`: one row per failed run
//! - `meta-<label>.json`: sweep metadata
//!
//! Both tables are written even when empty, so downstream consumers can rely
//! on their existence.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{AggregationError, ArtifactError};
use crate::io::atomic_write;
use crate::model::{ErrorRecord, RunOutcome, RunSpecification, StatsRecord, SweepMetadata};

/// Outcomes split by tag, each side sorted by run index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub good: Vec<StatsRecord>,
    pub bad: Vec<ErrorRecord>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.good.len() + self.bad.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split outcomes into successes and failures.
///
/// Every run index in `0..run_count` must appear exactly once.
pub fn partition(
    outcomes: Vec<RunOutcome>,
    run_count: usize,
) -> Result<Partition, AggregationError> {
    let mut seen = vec![false; run_count];
    let mut result = Partition::default();

    for outcome in outcomes {
        let run_index = outcome.run_index();
        let slot = seen
            .get_mut(run_index)
            .ok_or(AggregationError::UnknownRun {
                run_index,
                run_count,
            })?;
        if *slot {
            return Err(AggregationError::DuplicateRun(run_index));
        }
        *slot = true;
        match outcome {
            RunOutcome::Stats(record) => result.good.push(record),
            RunOutcome::Error(record) => result.bad.push(record),
        }
    }

    if let Some(missing) = seen.iter().position(|&s| !s) {
        return Err(AggregationError::MissingRun(missing));
    }

    result.good.sort_by_key(|r| r.spec.run_index);
    result.bad.sort_by_key(|r| r.spec.run_index);
    Ok(result)
}

/// Locations of one sweep's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub study: PathBuf,
    pub errors: PathBuf,
    pub meta: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, label: &str) -> Self {
        Self {
            study: dir.join(format!("study-{label}.csv")),
            errors: dir.join(format!("errors-{label}.csv")),
            meta: dir.join(format!("meta-{label}.json")),
        }
    }
}

/// Fixed columns of the study and errors tables. Axis names must not
/// reuse them.
pub const RESERVED_COLUMNS: [&str; 8] = [
    "run_index",
    "variant",
    "replicate",
    "seed",
    "elapsed_ms",
    "phase",
    "kind",
    "error",
];

/// Leading columns shared by both tables
fn spec_columns(axis_names: &[String]) -> Vec<String> {
    std::iter::once("run_index".to_string())
        .chain(axis_names.iter().cloned())
        .chain(["variant".to_string(), "replicate".to_string()])
        .collect()
}

fn spec_cells(spec: &RunSpecification, axis_names: &[String]) -> Vec<String> {
    std::iter::once(spec.run_index.to_string())
        .chain(
            axis_names
                .iter()
                .map(|name| spec.get(name).map(ToString::to_string).unwrap_or_default()),
        )
        .chain([spec.variant.to_string(), spec.replicate.to_string()])
        .collect()
}

fn finish_table(writer: csv::Writer<Vec<u8>>, path: &Path) -> Result<Vec<u8>, ArtifactError> {
    writer
        .into_inner()
        .map_err(|e| ArtifactError::io(path, e.into_error()))
}

/// Writes the tabular and metadata artifacts of a sweep
#[derive(Debug, Clone)]
pub struct Aggregator {
    paths: ArtifactPaths,
    axis_names: Vec<String>,
}

impl Aggregator {
    pub fn new(output_dir: &Path, label: &str, axis_names: Vec<String>) -> Self {
        Self {
            paths: ArtifactPaths::new(output_dir, label),
            axis_names,
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Success table: spec columns, seed, elapsed time, then the union of
    /// stat keys in sorted order. Stat keys that repeat a fixed column are
    /// not duplicated.
    pub fn render_good(&self, records: &[StatsRecord]) -> Result<Vec<u8>, ArtifactError> {
        let mut header = spec_columns(&self.axis_names);
        header.extend(["seed".to_string(), "elapsed_ms".to_string()]);
        let fixed: BTreeSet<&str> = header.iter().map(String::as_str).collect();
        let stat_keys: Vec<String> = records
            .iter()
            .flat_map(|r| r.stats.keys())
            .filter(|k| !fixed.contains(k.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        header.extend(stat_keys.iter().cloned());

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&header)?;
        for record in records {
            let mut row = spec_cells(&record.spec, &self.axis_names);
            row.push(record.seed.to_string());
            row.push(record.elapsed_ms.to_string());
            row.extend(
                stat_keys
                    .iter()
                    .map(|k| record.stats.get(k).map(ToString::to_string).unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }
        finish_table(writer, &self.paths.study)
    }

    pub fn render_bad(&self, records: &[ErrorRecord]) -> Result<Vec<u8>, ArtifactError> {
        let mut header = spec_columns(&self.axis_names);
        header.extend(
            ["seed", "phase", "kind", "error", "elapsed_ms"]
                .iter()
                .map(|s| s.to_string()),
        );

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&header)?;
        for record in records {
            let mut row = spec_cells(&record.spec, &self.axis_names);
            row.push(record.seed.map(|s| s.to_string()).unwrap_or_default());
            row.push(record.phase.to_string());
            row.push(record.kind.to_string());
            row.push(record.error.clone());
            row.push(record.elapsed_ms.to_string());
            writer.write_record(&row)?;
        }
        finish_table(writer, &self.paths.errors)
    }

    /// Write both tables, including header-only tables for empty sides
    pub fn write_tables(&self, partition: &Partition) -> Result<(), ArtifactError> {
        atomic_write(&self.paths.study, &self.render_good(&partition.good)?)?;
        atomic_write(&self.paths.errors, &self.render_bad(&partition.bad)?)?;
        tracing::info!(
            good = partition.good.len(),
            bad = partition.bad.len(),
            study = %self.paths.study.display(),
            errors = %self.paths.errors.display(),
            "wrote result tables"
        );
        Ok(())
    }

    pub fn write_metadata(&self, metadata: &SweepMetadata) -> Result<(), ArtifactError> {
        let json = serde_json::to_vec_pretty(metadata)?;
        atomic_write(&self.paths.meta, &json)?;
        tracing::info!(meta = %self.paths.meta.display(), "wrote sweep metadata");
        Ok(())
    }
}

/// A tabular artifact read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ArtifactTable {
    pub fn read(path: &Path) -> Result<Self, ArtifactError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.map(|record| record.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All cells of the named column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.headers.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}
