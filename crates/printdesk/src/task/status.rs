use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single task.
///
/// Stored as the SCREAMING_SNAKE_CASE string returned by [`TaskStatus::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Converting,
    Counting,
    Ready,
    ReadyNoCount,
    Printing,
    PrintSuccess,
    PrintSuccessNoCount,
    PrintFailed,
    ErrorConversion,
    ErrorPageCount,
    ErrorEmptyFile,
    ErrorFatalRead,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 13] = [
        TaskStatus::Queued,
        TaskStatus::Converting,
        TaskStatus::Counting,
        TaskStatus::Ready,
        TaskStatus::ReadyNoCount,
        TaskStatus::Printing,
        TaskStatus::PrintSuccess,
        TaskStatus::PrintSuccessNoCount,
        TaskStatus::PrintFailed,
        TaskStatus::ErrorConversion,
        TaskStatus::ErrorPageCount,
        TaskStatus::ErrorEmptyFile,
        TaskStatus::ErrorFatalRead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Converting => "CONVERTING",
            TaskStatus::Counting => "COUNTING",
            TaskStatus::Ready => "READY",
            TaskStatus::ReadyNoCount => "READY_NO_COUNT",
            TaskStatus::Printing => "PRINTING",
            TaskStatus::PrintSuccess => "PRINT_SUCCESS",
            TaskStatus::PrintSuccessNoCount => "PRINT_SUCCESS_NO_COUNT",
            TaskStatus::PrintFailed => "PRINT_FAILED",
            TaskStatus::ErrorConversion => "ERROR_CONVERSION",
            TaskStatus::ErrorPageCount => "ERROR_PAGE_COUNT",
            TaskStatus::ErrorEmptyFile => "ERROR_EMPTY_FILE",
            TaskStatus::ErrorFatalRead => "ERROR_FATAL_READ",
        }
    }

    /// Converting or counting is still owed by the pipeline.
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            TaskStatus::Queued | TaskStatus::Converting | TaskStatus::Counting
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::ReadyNoCount)
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TaskStatus::ErrorConversion
                | TaskStatus::ErrorPageCount
                | TaskStatus::ErrorEmptyFile
                | TaskStatus::ErrorFatalRead
        )
    }

    pub fn is_printed(&self) -> bool {
        matches!(
            self,
            TaskStatus::PrintSuccess | TaskStatus::PrintSuccessNoCount
        )
    }

    /// No pipeline or print executor will touch the task again on its own.
    ///
    /// `Printing` is excluded: the executor still owns it.
    pub fn is_terminal(&self) -> bool {
        self.is_ready() || self.is_error() || self.is_printed() || *self == TaskStatus::PrintFailed
    }

    /// Whether a task in `self` may move to `next`.
    ///
    /// Writing the current status again is always accepted. Print outcomes may
    /// re-enter `Printing` because every reprint is a fresh print attempt.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        if *self == next {
            return true;
        }
        match self {
            Queued => matches!(next, Converting | ErrorEmptyFile | ErrorConversion),
            Converting => matches!(next, Counting | ErrorConversion | ErrorEmptyFile),
            Counting => matches!(
                next,
                Ready | ReadyNoCount | ErrorFatalRead | ErrorPageCount | ErrorConversion
            ),
            Ready | ReadyNoCount => matches!(next, Printing | PrintFailed),
            Printing => matches!(next, PrintSuccess | PrintSuccessNoCount | PrintFailed),
            PrintSuccess | PrintSuccessNoCount | PrintFailed => {
                matches!(next, Printing | PrintFailed)
            }
            ErrorConversion | ErrorPageCount | ErrorEmptyFile | ErrorFatalRead => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown task status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
