//! Confirmation boundary for the last-view close.

use async_trait::async_trait;
use thiserror::Error;

/// Errors a confirmation dialog can report.
#[derive(Debug, Error)]
pub enum ConfirmationError {
    /// The dialog could not be shown or crashed.
    #[error("confirmation failed: {0}")]
    Failed(String),

    /// The dialog went away without an answer.
    #[error("confirmation dismissed")]
    Dismissed,
}

/// Asks the user whether to delete a sandbox whose last view is closing.
#[async_trait]
pub trait CloseConfirmation: Send + Sync {
    /// Returns `Ok(true)` to delete, `Ok(false)` to keep.
    async fn confirm(&self, title: &str, message: &str) -> Result<bool, ConfirmationError>;
}

/// A confirmation that always gives the same answer without asking.
/// For headless hosts.
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmation(pub bool);

#[async_trait]
impl CloseConfirmation for FixedConfirmation {
    async fn confirm(&self, _title: &str, _message: &str) -> Result<bool, ConfirmationError> {
        Ok(self.0)
    }
}
