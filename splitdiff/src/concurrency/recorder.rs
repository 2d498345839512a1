use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::DiffError;

/// Thread-safe collection of the errors produced by parallel table diffs.
///
/// Written concurrently by every diff task of one orchestrator run and read once after all
/// of them joined.
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator {
    errors: Arc<Mutex<Vec<DiffError>>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error.
    pub async fn record(&self, err: DiffError) {
        self.errors.lock().await.push(err);
    }

    /// Returns `true` if at least one error was recorded.
    pub async fn has_errors(&self) -> bool {
        !self.errors.lock().await.is_empty()
    }

    /// Returns the number of recorded errors.
    pub async fn len(&self) -> usize {
        self.errors.lock().await.len()
    }

    /// Returns the first recorded error, if any.
    pub async fn first(&self) -> Option<DiffError> {
        self.errors.lock().await.first().cloned()
    }

    /// Returns all recorded errors combined into one, or `None` if nothing was recorded.
    pub async fn error(&self) -> Option<DiffError> {
        let errors = self.errors.lock().await;
        match errors.len() {
            0 => None,
            1 => Some(errors[0].clone()),
            _ => Some(DiffError::many(errors.clone())),
        }
    }
}
