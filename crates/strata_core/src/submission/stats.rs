//! Per-submission counters.

use std::fmt;
use std::time::Duration;

/// What one `step()` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubmissionStats {
    /// Fixed-point iterations executed.
    pub iterations: u32,
    /// Pending operations applied.
    pub operations_applied: usize,
    /// Pending operations skipped because their target was removed earlier
    /// in the same drain.
    pub operations_skipped: usize,
    /// Entities merged from the creation set.
    pub entities_added: usize,
    /// Entities removed, including those of removed groups.
    pub entities_removed: usize,
    /// Entities moved to another EGID.
    pub entities_moved: usize,
    /// Groups removed by request.
    pub groups_removed: usize,
    /// Group pairs swapped.
    pub groups_swapped: usize,
    /// Empty groups pruned at the end of the submission.
    pub groups_pruned: usize,
    /// Wall time of the submission.
    pub elapsed: Duration,
}

impl SubmissionStats {
    /// Checks if the submission found nothing to do.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.iterations == 0
    }

    /// Total structural changes applied.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.entities_added
            + self.entities_removed
            + self.entities_moved
            + self.groups_removed
            + self.groups_swapped
    }
}

impl fmt::Display for SubmissionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} iterations, +{} -{} ~{} entities, {} ops ({} skipped) in {:.1}us",
            self.iterations,
            self.entities_added,
            self.entities_removed,
            self.entities_moved,
            self.operations_applied,
            self.operations_skipped,
            self.elapsed.as_secs_f64() * 1_000_000.0
        )
    }
}
