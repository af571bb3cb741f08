//! Outcome of skip-and-report batch operations.

use crate::ArchiveError;

/// One item that could not be processed
#[derive(Debug)]
pub struct BatchFailure {
    /// Name or path of the item
    pub item: String,
    /// Why it failed
    pub error: ArchiveError,
}

/// Per-item results of a batch operation.
///
/// A batch keeps going after an item fails; only errors that make the
/// whole call meaningless (missing dump root, lock held) abort it.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Items processed
    pub succeeded: Vec<String>,
    /// Items that failed, with their errors
    pub failed: Vec<BatchFailure>,
    /// Items deliberately left out, with the reason
    pub skipped: Vec<(String, String)>,
    /// Whether the observer stopped the batch early
    pub cancelled: bool,
}

impl BatchReport {
    pub(crate) fn success(&mut self, item: impl Into<String>) {
        self.succeeded.push(item.into());
    }

    pub(crate) fn failure(&mut self, item: impl Into<String>, error: ArchiveError) {
        self.failed.push(BatchFailure {
            item: item.into(),
            error,
        });
    }

    pub(crate) fn skip(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push((item.into(), reason.into()));
    }

    /// Every item succeeded and nothing was cancelled
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Items seen, in any outcome
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }
}
