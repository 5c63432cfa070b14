//! Error types for lifecycle domain validation and parsing.

use super::{PeriodId, TaskId, TaskStatus};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors returned while constructing or mutating domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleDomainError {
    /// The task title is empty after trimming.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// The resource identifier is empty after trimming.
    #[error("resource identifier must not be empty")]
    EmptyResource,

    /// The project category is empty after trimming.
    #[error("project category must not be empty")]
    EmptyCategory,

    /// The task already has the requested status.
    #[error("task {task_id} is already {status}")]
    NoOpTransition {
        /// Task identifier.
        task_id: TaskId,
        /// Status the task already has.
        status: TaskStatus,
    },

    /// A completed task can only leave `completed` through a reopen.
    #[error("task {task_id} is completed; reopen it before moving it to {target}")]
    ReopenRequired {
        /// Task identifier.
        task_id: TaskId,
        /// Status that was requested.
        target: TaskStatus,
    },

    /// Reopen was requested for a task that is not completed.
    #[error("task {task_id} cannot be reopened from {status}")]
    InvalidReopen {
        /// Task identifier.
        task_id: TaskId,
        /// Current task status.
        status: TaskStatus,
    },

    /// The task has been soft-deleted.
    #[error("task {0} has been deleted")]
    TombstonedTask(TaskId),

    /// The period is not the current period and cannot be closed.
    #[error("period {0} is already closed")]
    PeriodAlreadyClosed(PeriodId),

    /// The closing date precedes the period start.
    #[error("period {period_id} starts {start}; cannot close it at {end}")]
    InvalidRange {
        /// Period identifier.
        period_id: PeriodId,
        /// Period start date.
        start: NaiveDate,
        /// Requested end date.
        end: NaiveDate,
    },

    /// The successor start date would overflow the calendar.
    #[error("no calendar date follows {0}")]
    DateOutOfRange(NaiveDate),
}

/// Error returned while parsing task statuses from persistence or input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);
