use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::DiffResult;
use crate::remote::RowStream;
use crate::test_utils::{FakeCluster, Operation, apply_failure};
use crate::types::{TableRow, TabletAlias};

/// Row stream served by [`FakeCluster`].
///
/// Counts as open in the cluster until [`RowStream::close`] is called on it. Dropping it
/// without closing leaves it open.
#[derive(Debug)]
pub struct FakeRowStream {
    cluster: FakeCluster,
    tablet: TabletAlias,
    table: String,
    rows: std::vec::IntoIter<TableRow>,
    delay: Duration,
}

impl FakeRowStream {
    pub(crate) fn new(
        cluster: FakeCluster,
        tablet: TabletAlias,
        table: String,
        rows: Vec<TableRow>,
        delay: Duration,
    ) -> Self {
        Self {
            cluster,
            tablet,
            table,
            rows: rows.into_iter(),
            delay,
        }
    }
}

impl RowStream for FakeRowStream {
    async fn next_row(&mut self) -> DiffResult<Option<TableRow>> {
        let mode = self.cluster.record_read(&self.tablet, &self.table);
        apply_failure(Operation::NextRow, mode).await?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        Ok(self.rows.next())
    }

    async fn close(self) -> DiffResult<()> {
        let mode = self
            .cluster
            .take_failure(Operation::CloseScan, &self.tablet, &self.table);
        self.cluster.release_stream(&self.table);

        apply_failure(Operation::CloseScan, mode).await
    }
}

/// Shared log of the reads issued on a pair of [`VecRowStream`]s, tagged by side.
pub type ReadLog = Arc<Mutex<Vec<&'static str>>>;

/// Row stream over a vector, counting the reads issued on it.
#[derive(Debug)]
pub struct VecRowStream {
    rows: std::vec::IntoIter<TableRow>,
    reads: Arc<AtomicUsize>,
    log: Option<(ReadLog, &'static str)>,
}

impl VecRowStream {
    pub fn new(rows: Vec<TableRow>) -> Self {
        Self {
            rows: rows.into_iter(),
            reads: Arc::new(AtomicUsize::new(0)),
            log: None,
        }
    }

    /// Appends `side` to `log` on every read.
    pub fn with_log(mut self, log: ReadLog, side: &'static str) -> Self {
        self.log = Some((log, side));
        self
    }

    /// Returns a counter of the reads issued on this stream, end of stream included.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RowStream for VecRowStream {
    async fn next_row(&mut self) -> DiffResult<Option<TableRow>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some((log, side)) = &self.log {
            log.lock().unwrap().push(side);
        }

        Ok(self.rows.next())
    }

    async fn close(self) -> DiffResult<()> {
        Ok(())
    }
}
