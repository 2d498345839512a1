use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::bail;
use crate::compensation::CompensationAction;
use crate::error::{DiffError, DiffResult, ErrorKind};
use crate::remote::TabletManager;

#[derive(Debug, Default)]
struct ChainState {
    pending: Vec<CompensationAction>,
    executed: Vec<CompensationAction>,
    consumed: bool,
}

/// Ordered list of the compensating actions registered by a diff run.
///
/// Cloning the chain yields a handle to the same list.
#[derive(Debug, Clone, Default)]
pub struct CompensationChain {
    state: Arc<Mutex<ChainState>>,
}

impl CompensationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action to the chain.
    ///
    /// Fails with [`ErrorKind::InvalidState`] once the chain was consumed, since the action
    /// would never run.
    pub async fn record(&self, action: CompensationAction) -> DiffResult<()> {
        let mut state = self.state.lock().await;
        if state.consumed {
            bail!(
                ErrorKind::InvalidState,
                "Compensation chain was already consumed",
                action
            );
        }

        info!("recorded compensation: {action}");
        state.pending.push(action);

        Ok(())
    }

    /// Removes the most recently recorded entry equal to `action`.
    ///
    /// Returns `true` if an entry was removed.
    pub async fn remove(&self, action: &CompensationAction) -> bool {
        let mut state = self.state.lock().await;
        let Some(index) = state.pending.iter().rposition(|entry| entry == action) else {
            return false;
        };

        state.pending.remove(index);
        info!("removed compensation: {action}");

        true
    }

    /// Returns the pending actions in registration order.
    pub async fn entries(&self) -> Vec<CompensationAction> {
        self.state.lock().await.pending.clone()
    }

    /// Returns the actions attempted by [`CompensationChain::cleanup`], in execution order.
    pub async fn executed(&self) -> Vec<CompensationAction> {
        self.state.lock().await.executed.clone()
    }

    pub async fn is_consumed(&self) -> bool {
        self.state.lock().await.consumed
    }

    /// Executes all pending actions in reverse registration order and consumes the chain.
    ///
    /// A failing action does not stop the remaining ones. The failures are returned together
    /// as [`ErrorKind::CleanupError`] errors.
    pub async fn cleanup<M>(&self, manager: &M, deadline: Duration) -> DiffResult<()>
    where
        M: TabletManager,
    {
        let pending = {
            let mut state = self.state.lock().await;
            if state.consumed {
                bail!(
                    ErrorKind::InvalidState,
                    "Compensation chain was already consumed"
                );
            }

            state.consumed = true;
            std::mem::take(&mut state.pending)
        };

        let mut errors = Vec::new();
        for action in pending.into_iter().rev() {
            info!("running compensation: {action}");

            let result = action.execute(manager, deadline).await;
            self.state.lock().await.executed.push(action);

            if let Err(err) = result {
                error!("compensation failed: {err}");
                errors.push(err);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(DiffError::many(errors)),
        }
    }
}
