use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Cell, TableRow, TabletAlias};

/// Value of one column that differs between the two sides of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMismatch {
    pub column: String,
    pub source: Cell,
    pub destination: Cell,
}

/// A difference found while merging the two row streams of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// The source row has no counterpart in the destination.
    MissingInDestination { row: TableRow },
    /// The destination row has no counterpart in the source.
    MissingInSource { row: TableRow },
    /// Both sides have a row with this key, but some values differ.
    ValueMismatch {
        key: Vec<Cell>,
        columns: Vec<ColumnMismatch>,
    },
}

/// Outcome of the diff of one table.
///
/// Counters are exact, while at most `max_samples` discrepancies are kept as samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub table: String,
    /// Number of distinct keys seen on either side.
    pub processed_rows: u64,
    pub matching_rows: u64,
    pub mismatched_rows: u64,
    pub missing_in_destination: u64,
    pub missing_in_source: u64,
    /// Rows processed per second.
    pub processing_qps: u64,
    pub samples: Vec<Discrepancy>,
    #[serde(skip)]
    max_samples: usize,
}

impl DiscrepancyReport {
    pub fn new(table: impl Into<String>, max_samples: usize) -> Self {
        Self {
            table: table.into(),
            processed_rows: 0,
            matching_rows: 0,
            mismatched_rows: 0,
            missing_in_destination: 0,
            missing_in_source: 0,
            processing_qps: 0,
            samples: Vec::new(),
            max_samples,
        }
    }

    pub fn record_match(&mut self) {
        self.processed_rows += 1;
        self.matching_rows += 1;
    }

    pub fn record_missing_in_destination(&mut self, row: TableRow) {
        self.processed_rows += 1;
        self.missing_in_destination += 1;
        self.sample(Discrepancy::MissingInDestination { row });
    }

    pub fn record_missing_in_source(&mut self, row: TableRow) {
        self.processed_rows += 1;
        self.missing_in_source += 1;
        self.sample(Discrepancy::MissingInSource { row });
    }

    pub fn record_mismatch(&mut self, key: Vec<Cell>, columns: Vec<ColumnMismatch>) {
        self.processed_rows += 1;
        self.mismatched_rows += 1;
        self.sample(Discrepancy::ValueMismatch { key, columns });
    }

    fn sample(&mut self, discrepancy: Discrepancy) {
        if self.samples.len() < self.max_samples {
            self.samples.push(discrepancy);
        }
    }

    /// Computes the throughput once the diff completed.
    pub fn finish(&mut self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().max(1);
        self.processing_qps = (u128::from(self.processed_rows) * 1_000_000_000 / nanos) as u64;
    }

    pub fn has_differences(&self) -> bool {
        self.discrepancy_count() > 0
    }

    /// Total number of discrepancies, including those not kept as samples.
    pub fn discrepancy_count(&self) -> u64 {
        self.mismatched_rows + self.missing_in_destination + self.missing_in_source
    }

    /// Discrepancies that were counted but not sampled.
    pub fn omitted_samples(&self) -> u64 {
        self.discrepancy_count() - self.samples.len() as u64
    }

    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DiscrepancyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DiffReport{{{} processed, {} matching, {} mismatched, {} missing in destination, \
             {} missing in source, {} qps}}",
            self.processed_rows,
            self.matching_rows,
            self.mismatched_rows,
            self.missing_in_destination,
            self.missing_in_source,
            self.processing_qps
        )
    }
}

/// Outcome of the diff phase of a worker run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitDiffReport {
    pub source_tablet: TabletAlias,
    pub destination_tablet: TabletAlias,
    /// Human readable structural differences between the two schemas.
    pub schema_diffs: Vec<String>,
    /// Per table reports, for every table whose diff ran to completion.
    pub tables: BTreeMap<String, DiscrepancyReport>,
}

impl SplitDiffReport {
    /// Returns `true` if the schemas and every diffed table match.
    pub fn is_clean(&self) -> bool {
        self.schema_diffs.is_empty() && self.tables.values().all(|table| !table.has_differences())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
