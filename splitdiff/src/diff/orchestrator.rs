use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use splitdiff_config::shared::DiffConfig;
use tokio::sync::Semaphore;
use tracing::{Instrument, error, info, info_span, warn};

use crate::concurrency::deadline::with_deadline;
use crate::concurrency::recorder::ErrorAccumulator;
use crate::diff::{DiscrepancyReport, RowDiffer, SplitDiffReport, diff_schemas};
use crate::diff_error;
use crate::error::{DiffError, DiffResult, ErrorKind};
use crate::remote::{DeadlineRowStream, RowStream, SchemaService, TableScanner};
use crate::types::{SchemaDefinition, TableDefinition, TabletAlias};
use crate::workers::state::SharedWorkerState;

/// Runs the diff phase: compares the schemas of both tablets, then diffs every table with a
/// bounded number of table diffs in flight.
///
/// Failures of a single table never stop the other tables. They are written to the
/// [`ErrorAccumulator`] handed to [`DiffOrchestrator::run`] and flag the worker as going to
/// fail.
#[derive(Debug)]
pub struct DiffOrchestrator<C> {
    collaborators: Arc<C>,
    source: TabletAlias,
    destination: TabletAlias,
    parallel_diffs_count: usize,
    max_discrepancy_samples: usize,
    remote_action_timeout: Duration,
    state: SharedWorkerState,
}

impl<C> DiffOrchestrator<C>
where
    C: SchemaService + TableScanner + Send + Sync + 'static,
{
    pub fn new(
        collaborators: Arc<C>,
        source: TabletAlias,
        destination: TabletAlias,
        config: &DiffConfig,
        state: SharedWorkerState,
    ) -> Self {
        Self {
            collaborators,
            source,
            destination,
            parallel_diffs_count: config.parallel_diffs_count,
            max_discrepancy_samples: config.max_discrepancy_samples,
            remote_action_timeout: config.remote_action_timeout(),
            state,
        }
    }

    /// Diffs the tables named in `tables` between the source and the destination tablet.
    ///
    /// Fails only if neither schema could be fetched. If one side is missing, the tables of
    /// the other side are still diffed, since the row level results remain useful.
    pub async fn run(
        &self,
        tables: &[String],
        errors: &ErrorAccumulator,
    ) -> DiffResult<SplitDiffReport> {
        info!("gathering schema information");
        let (destination_schema, source_schema) = tokio::join!(
            self.fetch_schema(&self.destination, tables),
            self.fetch_schema(&self.source, tables),
        );

        let mut schema_diffs = Vec::new();
        let table_definitions = match (source_schema, destination_schema) {
            (Ok(source_schema), Ok(destination_schema)) => {
                info!("diffing the schema");
                schema_diffs = diff_schemas(
                    &self.source.to_string(),
                    &source_schema,
                    &self.destination.to_string(),
                    &destination_schema,
                );
                if schema_diffs.is_empty() {
                    info!("schema match, good");
                } else {
                    warn!("different schemas: {}", schema_diffs.join("; "));
                }

                destination_schema.table_definitions
            }
            (Ok(source_schema), Err(err)) => {
                self.mark_will_fail(errors, err).await;
                source_schema.table_definitions
            }
            (Err(err), Ok(destination_schema)) => {
                self.mark_will_fail(errors, err).await;
                destination_schema.table_definitions
            }
            (Err(source_err), Err(destination_err)) => {
                return Err(DiffError::many(vec![source_err, destination_err]));
            }
        };

        info!("running the diffs on {} tables", table_definitions.len());
        let tables = self.diff_tables(table_definitions, errors).await;

        Ok(SplitDiffReport {
            source_tablet: self.source.clone(),
            destination_tablet: self.destination.clone(),
            schema_diffs,
            tables,
        })
    }

    async fn fetch_schema(
        &self,
        tablet: &TabletAlias,
        tables: &[String],
    ) -> DiffResult<SchemaDefinition> {
        let schema = with_deadline(
            ErrorKind::DiffSetupError,
            "Failed to fetch the schema",
            "GetSchema",
            tablet,
            self.remote_action_timeout,
            self.collaborators.get_schema(tablet, tables),
        )
        .await?;
        info!("got schema from {tablet}");

        Ok(schema)
    }

    async fn mark_will_fail(&self, errors: &ErrorAccumulator, err: DiffError) {
        error!("{err}");
        errors.record(err).await;
        self.state.mark_will_fail();
    }

    /// Spawns one task per table and waits for all of them.
    ///
    /// Returns the reports of the tables whose diff completed, with or without differences.
    async fn diff_tables(
        &self,
        table_definitions: Vec<TableDefinition>,
        errors: &ErrorAccumulator,
    ) -> BTreeMap<String, DiscrepancyReport> {
        let permits = Arc::new(Semaphore::new(self.parallel_diffs_count));

        let mut names = Vec::with_capacity(table_definitions.len());
        let mut handles = Vec::with_capacity(table_definitions.len());
        for table in table_definitions {
            let name = table.name.clone();
            let task = TableDiffTask {
                collaborators: self.collaborators.clone(),
                source: self.source.clone(),
                destination: self.destination.clone(),
                table,
                max_discrepancy_samples: self.max_discrepancy_samples,
                remote_action_timeout: self.remote_action_timeout,
                permits: permits.clone(),
                errors: errors.clone(),
                state: self.state.clone(),
            };

            let span = info_span!("table_diff", table = %name);
            handles.push(tokio::spawn(task.run().instrument(span)));
            names.push(name);
        }

        let results = join_all(handles).await;

        let mut reports = BTreeMap::new();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(Some(report)) => {
                    reports.insert(name, report);
                }
                Ok(None) => {}
                Err(err) => {
                    let err = DiffError::from(err);
                    error!(table = %name, "{err}");
                    errors.record(err).await;
                    self.state.mark_will_fail();
                }
            }
        }

        reports
    }
}

/// Diff of one table, run in its own task.
struct TableDiffTask<C> {
    collaborators: Arc<C>,
    source: TabletAlias,
    destination: TabletAlias,
    table: TableDefinition,
    max_discrepancy_samples: usize,
    remote_action_timeout: Duration,
    permits: Arc<Semaphore>,
    errors: ErrorAccumulator,
    state: SharedWorkerState,
}

impl<C> TableDiffTask<C>
where
    C: TableScanner + Send + Sync + 'static,
{
    /// Waits for a permit, diffs the table and records its failure or differences.
    async fn run(self) -> Option<DiscrepancyReport> {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                self.fail(err.into()).await;
                return None;
            }
        };

        info!("starting the diff on table {}", self.table.name);
        match self.diff().await {
            Ok(report) => {
                if report.has_differences() {
                    let err = diff_error!(
                        ErrorKind::DiscrepancyFound,
                        "Table has differences",
                        format!("table {}: {report}", self.table.name)
                    );
                    self.fail(err).await;
                } else {
                    info!(
                        "table {} checks out ({} rows processed, {} qps)",
                        self.table.name, report.processed_rows, report.processing_qps
                    );
                }

                Some(report)
            }
            Err(err) => {
                self.fail(err).await;
                None
            }
        }
    }

    async fn fail(&self, err: DiffError) {
        error!("{err}");
        self.errors.record(err).await;
        self.state.mark_will_fail();
    }

    /// Opens both scans, merges them and releases them, whatever the outcome.
    ///
    /// A panic while the source scan is open is caught long enough to close the open
    /// streams, then resumed so that the spawning side records it.
    async fn diff(&self) -> DiffResult<DiscrepancyReport> {
        let differ = RowDiffer::new(&self.table, self.max_discrepancy_samples)?;

        let mut source = self.open_scan(&self.source).await?;
        let opened = AssertUnwindSafe(self.open_scan(&self.destination))
            .catch_unwind()
            .await;
        let mut destination = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                self.close(source).await;
                return Err(err);
            }
            Err(payload) => {
                self.close(source).await;
                panic::resume_unwind(payload);
            }
        };

        let result = AssertUnwindSafe(differ.diff(&mut source, &mut destination))
            .catch_unwind()
            .await;

        self.close(source).await;
        self.close(destination).await;

        match result {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    async fn open_scan(&self, tablet: &TabletAlias) -> DiffResult<DeadlineRowStream<C::Stream>> {
        let stream = with_deadline(
            ErrorKind::DiffSetupError,
            "Failed to open the row stream",
            &format!("OpenOrderedScan({})", self.table.name),
            tablet,
            self.remote_action_timeout,
            self.collaborators.open_ordered_scan(tablet, &self.table),
        )
        .await?;

        Ok(DeadlineRowStream::new(
            stream,
            tablet.clone(),
            self.table.name.clone(),
            self.remote_action_timeout,
        ))
    }

    async fn close<S>(&self, stream: S)
    where
        S: RowStream,
    {
        if let Err(err) = stream.close().await {
            warn!("failed to close a row stream of table {}: {err}", self.table.name);
        }
    }
}
