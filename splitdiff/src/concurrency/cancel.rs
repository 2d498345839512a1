use tokio::sync::watch;

/// Sending half of the cancellation signal of a worker.
#[derive(Debug, Clone)]
pub struct CancelTx(watch::Sender<bool>);

impl CancelTx {
    /// Requests cancellation.
    ///
    /// The request is stored in the channel, so receivers created or checked later still
    /// observe it.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> CancelRx {
        CancelRx(self.0.subscribe())
    }
}

/// Receiving half of the cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelRx(watch::Receiver<bool>);

impl CancelRx {
    /// Returns `true` if cancellation was requested, even if the sender is gone since.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Creates a new cancellation channel in the not-cancelled state.
pub fn create_cancel_channel() -> (CancelTx, CancelRx) {
    let (tx, rx) = watch::channel(false);
    (CancelTx(tx), CancelRx(rx))
}
