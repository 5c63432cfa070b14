//! Store port for period and task persistence.
//!
//! Writes happen inside a scoped transaction: the adapter begins it, hands
//! the operation a [`StoreWriter`], commits when the operation returns `Ok`
//! and rolls back on every other path. Reads run against a [`StoreReader`]
//! bound to one consistent view so they never observe a half-applied write.

use crate::lifecycle::domain::{PerformancePeriod, PeriodId, Task, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Whether task queries include soft-deleted tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFilter {
    /// Only tasks that have not been tombstoned.
    #[default]
    Live,
    /// Every stored task, tombstones included.
    IncludeTombstoned,
}

impl TaskFilter {
    /// Returns whether `task` passes the filter.
    #[must_use]
    pub const fn admits(self, task: &Task) -> bool {
        match self {
            Self::Live => !task.is_tombstoned(),
            Self::IncludeTombstoned => true,
        }
    }
}

/// Read access to stored periods and tasks.
pub trait StoreReader {
    /// Finds a period by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the lookup fails.
    fn find_period(&mut self, id: PeriodId) -> StoreResult<Option<PerformancePeriod>>;

    /// Returns the period flagged as current, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the lookup fails.
    fn current_period(&mut self) -> StoreResult<Option<PerformancePeriod>>;

    /// Returns every period ordered by start date.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the lookup fails.
    fn list_periods(&mut self) -> StoreResult<Vec<PerformancePeriod>>;

    /// Finds a task by identifier, tombstoned or not.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the lookup fails.
    fn find_task(&mut self, id: TaskId) -> StoreResult<Option<Task>>;

    /// Returns the tasks attached to `period_id` that pass `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the lookup fails.
    fn query_tasks(&mut self, period_id: PeriodId, filter: TaskFilter) -> StoreResult<Vec<Task>>;

    /// Returns every stored task, tombstones included.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the lookup fails.
    fn all_tasks(&mut self) -> StoreResult<Vec<Task>>;
}

/// Write access inside a transaction.
pub trait StoreWriter: StoreReader {
    /// Inserts or replaces a period.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MultipleCurrentPeriods`] when another period is
    /// already current, or [`StoreError::Persistence`] on failure.
    fn put_period(&mut self, period: &PerformancePeriod) -> StoreResult<()>;

    /// Inserts or replaces a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DanglingPeriod`] when the task's period does not
    /// exist, or [`StoreError::Persistence`] on failure.
    fn put_task(&mut self, task: &Task) -> StoreResult<()>;

    /// Marks a stored task as deleted at `deleted_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] when the task does not exist, or
    /// [`StoreError::Persistence`] on failure.
    fn soft_delete_task(&mut self, id: TaskId, deleted_at: DateTime<Utc>) -> StoreResult<()>;
}

/// Transactional period and task storage.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// Runs `operation` inside a write transaction.
    ///
    /// The transaction commits only when `operation` returns `Ok`; any error,
    /// from the operation or the commit itself, leaves the store untouched.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or a [`StoreError`] converted into `E`
    /// when the transaction cannot be started or committed.
    async fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreWriter) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static;

    /// Runs `operation` against one consistent read view.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the view cannot be opened or a read fails.
    async fn read<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn StoreReader) -> StoreResult<T> + Send + 'static,
        T: Send + 'static;
}

/// Errors returned by store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The task was not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// A task references a period that is not stored.
    #[error("task {task_id} references missing period {period_id}")]
    DanglingPeriod {
        /// Task identifier.
        task_id: TaskId,
        /// Missing period identifier.
        period_id: PeriodId,
    },

    /// Storing the period would leave two current periods.
    #[error("period {existing} is already current; cannot mark {attempted} current")]
    MultipleCurrentPeriods {
        /// Period that is already current.
        existing: PeriodId,
        /// Period that was being stored.
        attempted: PeriodId,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
