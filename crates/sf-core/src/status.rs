use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status — step and job lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a step or job.
///
/// `Waiting -> Fireable -> Running` and then exactly one of the terminal
/// states. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Waiting,
    Fireable,
    Running,
    Completed,
    Skipped,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Completed | Status::Skipped | Status::Failed | Status::Cancelled
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Waiting => "WAITING",
            Status::Fireable => "FIREABLE",
            Status::Running => "RUNNING",
            Status::Completed => "COMPLETED",
            Status::Skipped => "SKIPPED",
            Status::Failed => "FAILED",
            Status::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Fold a set of sub-task statuses into one terminal status.
///
/// One `Failed` dominates, then one `Cancelled`; `Skipped` only when every
/// status is `Skipped` (vacuously for the empty set); otherwise `Completed`.
pub fn fold_statuses(statuses: &[Status]) -> Status {
    if statuses.iter().any(|s| *s == Status::Failed) {
        return Status::Failed;
    }
    if statuses.iter().any(|s| *s == Status::Cancelled) {
        return Status::Cancelled;
    }
    if statuses.iter().all(|s| *s == Status::Skipped) {
        return Status::Skipped;
    }
    Status::Completed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
