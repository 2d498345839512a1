use std::cmp::Ordering;
use std::time::Instant;

use tracing::debug;

use crate::bail;
use crate::diff::{ColumnMismatch, DiscrepancyReport};
use crate::error::{DiffResult, ErrorKind};
use crate::remote::RowStream;
use crate::types::{Cell, TableDefinition, TableRow};

/// Compares the rows of one table as returned by two ordered scans.
///
/// Both streams must return rows in strictly ascending key order. The differ walks them like
/// a merge join, holding at most one row per side, so memory does not depend on table size.
#[derive(Debug, Clone)]
pub struct RowDiffer {
    table: String,
    column_names: Vec<String>,
    key_indices: Vec<usize>,
    value_indices: Vec<usize>,
    max_samples: usize,
}

impl RowDiffer {
    /// Creates a differ for `table`.
    ///
    /// Fails with [`ErrorKind::DiffSetupError`] if the table has no primary key or if a key
    /// column is not among its columns.
    pub fn new(table: &TableDefinition, max_samples: usize) -> DiffResult<Self> {
        if table.primary_key_columns.is_empty() {
            bail!(
                ErrorKind::DiffSetupError,
                "Table has no primary key to order the scans",
                table.name.clone()
            );
        }

        let mut key_indices = Vec::with_capacity(table.primary_key_columns.len());
        for key_column in &table.primary_key_columns {
            let Some(index) = table.column_index(key_column) else {
                bail!(
                    ErrorKind::DiffSetupError,
                    "Primary key column is missing from the table columns",
                    format!("{}.{key_column}", table.name)
                );
            };
            key_indices.push(index);
        }

        let value_indices = (0..table.columns.len())
            .filter(|index| !key_indices.contains(index))
            .collect();

        Ok(Self {
            table: table.name.clone(),
            column_names: table
                .columns
                .iter()
                .map(|column| column.name.clone())
                .collect(),
            key_indices,
            value_indices,
            max_samples,
        })
    }

    /// Merges both streams to the end and classifies every difference.
    ///
    /// Fails only if a stream fails or returns a row that does not match the table
    /// definition. Differences are reported in the returned [`DiscrepancyReport`].
    pub async fn diff<S, D>(&self, source: &mut S, destination: &mut D) -> DiffResult<DiscrepancyReport>
    where
        S: RowStream,
        D: RowStream,
    {
        let started = Instant::now();
        let mut report = DiscrepancyReport::new(self.table.clone(), self.max_samples);

        let mut source_row = self.read(source).await?;
        let mut destination_row = self.read(destination).await?;

        loop {
            match (source_row.take(), destination_row.take()) {
                (None, None) => break,
                (Some(source_value), None) => {
                    report.record_missing_in_destination(source_value);
                    source_row = self.read(source).await?;
                }
                (None, Some(destination_value)) => {
                    report.record_missing_in_source(destination_value);
                    destination_row = self.read(destination).await?;
                }
                (Some(source_value), Some(destination_value)) => {
                    match self.compare_keys(&source_value, &destination_value) {
                        Ordering::Less => {
                            report.record_missing_in_destination(source_value);
                            source_row = self.read(source).await?;
                            destination_row = Some(destination_value);
                        }
                        Ordering::Greater => {
                            report.record_missing_in_source(destination_value);
                            source_row = Some(source_value);
                            destination_row = self.read(destination).await?;
                        }
                        Ordering::Equal => {
                            self.compare_values(&source_value, &destination_value, &mut report);
                            source_row = self.read(source).await?;
                            destination_row = self.read(destination).await?;
                        }
                    }
                }
            }
        }

        report.finish(started.elapsed());
        debug!(table = %self.table, "{report}");

        Ok(report)
    }

    async fn read<S>(&self, stream: &mut S) -> DiffResult<Option<TableRow>>
    where
        S: RowStream,
    {
        let row = stream.next_row().await?;
        if let Some(row) = &row
            && row.values.len() != self.column_names.len()
        {
            bail!(
                ErrorKind::RowStreamFailed,
                "Row does not match the table definition",
                format!(
                    "table {} has {} columns, got a row with {} values",
                    self.table,
                    self.column_names.len(),
                    row.values.len()
                )
            );
        }

        Ok(row)
    }

    fn compare_keys(&self, source: &TableRow, destination: &TableRow) -> Ordering {
        for &index in &self.key_indices {
            let ordering = source.values[index].compare(&destination.values[index]);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }

    fn key_of(&self, row: &TableRow) -> Vec<Cell> {
        self.key_indices
            .iter()
            .map(|&index| row.values[index].clone())
            .collect()
    }

    fn compare_values(&self, source: &TableRow, destination: &TableRow, report: &mut DiscrepancyReport) {
        let columns: Vec<ColumnMismatch> = self
            .value_indices
            .iter()
            .filter(|&&index| source.values[index] != destination.values[index])
            .map(|&index| ColumnMismatch {
                column: self.column_names[index].clone(),
                source: source.values[index].clone(),
                destination: destination.values[index].clone(),
            })
            .collect();

        if columns.is_empty() {
            report.record_match();
        } else {
            report.record_mismatch(self.key_of(source), columns);
        }
    }
}
