use std::future::Future;
use std::time::Duration;

use crate::concurrency::deadline::with_deadline;
use crate::error::{DiffResult, ErrorKind};
use crate::types::{TableDefinition, TableRow, TabletAlias};

/// A cursor over the rows of one table, in ascending primary key order.
///
/// Whoever opened the stream must call [`RowStream::close`] on every exit path.
pub trait RowStream: Send {
    /// Returns the next row, or `None` once the table was fully read.
    fn next_row(&mut self) -> impl Future<Output = DiffResult<Option<TableRow>>> + Send;

    /// Releases the resources held by the stream on the remote side.
    fn close(self) -> impl Future<Output = DiffResult<()>> + Send
    where
        Self: Sized;
}

/// Opens ordered scans over tables of a tablet.
pub trait TableScanner {
    type Stream: RowStream + 'static;

    /// Opens a scan of `table` on `tablet` returning rows sorted by the primary key of
    /// `table`, with values in the order of its columns.
    fn open_ordered_scan(
        &self,
        tablet: &TabletAlias,
        table: &TableDefinition,
    ) -> impl Future<Output = DiffResult<Self::Stream>> + Send;
}

/// Row stream applying the remote action deadline to each read and to the final close.
#[derive(Debug)]
pub struct DeadlineRowStream<S> {
    inner: S,
    tablet: TabletAlias,
    table: String,
    deadline: Duration,
}

impl<S> DeadlineRowStream<S> {
    pub fn new(inner: S, tablet: TabletAlias, table: String, deadline: Duration) -> Self {
        Self {
            inner,
            tablet,
            table,
            deadline,
        }
    }
}

impl<S> RowStream for DeadlineRowStream<S>
where
    S: RowStream,
{
    async fn next_row(&mut self) -> DiffResult<Option<TableRow>> {
        with_deadline(
            ErrorKind::RowStreamFailed,
            "Failed to read the next row",
            &format!("NextRow({})", self.table),
            &self.tablet,
            self.deadline,
            self.inner.next_row(),
        )
        .await
    }

    async fn close(self) -> DiffResult<()> {
        with_deadline(
            ErrorKind::RowStreamFailed,
            "Failed to close the row stream",
            &format!("CloseScan({})", self.table),
            &self.tablet,
            self.deadline,
            self.inner.close(),
        )
        .await
    }
}
