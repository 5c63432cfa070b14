//! Facade wiring the period manager, task controller and metrics aggregator
//! behind one entry point.

use super::{
    ClosedPeriodSummary, CreateTaskRequest, MetricsAggregator, MetricsError, MetricsScope,
    PeriodError, PeriodManager, TaskLifecycleError, TaskLifecycleService,
};
use crate::lifecycle::{
    domain::{
        LifecycleDomainError, MetricsSnapshot, PerformancePeriod, PeriodId, Task, TaskId,
        TaskStatus,
    },
    ports::{LifecycleStore, StoreError, TaskFilter},
};
use chrono::NaiveDate;
use mockable::Clock;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Engine operation named in error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Current-period detection.
    CurrentPeriod,
    /// Closing the current period.
    ClosePeriod,
    /// Period lookup.
    FindPeriod,
    /// Period listing.
    ListPeriods,
    /// Task creation.
    CreateTask,
    /// Status transition.
    MoveTask,
    /// Reopening a completed task.
    ReopenTask,
    /// Assignee change.
    ReassignTask,
    /// Category change.
    ReclassifyTask,
    /// Soft deletion.
    DeleteTask,
    /// Task lookup.
    FindTask,
    /// Task listing.
    ListTasks,
    /// Metrics computation.
    Metrics,
}

impl Operation {
    /// Returns the operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentPeriod => "current_period",
            Self::ClosePeriod => "close_period",
            Self::FindPeriod => "find_period",
            Self::ListPeriods => "list_periods",
            Self::CreateTask => "create_task",
            Self::MoveTask => "move_task",
            Self::ReopenTask => "reopen_task",
            Self::ReassignTask => "reassign_task",
            Self::ReclassifyTask => "reclassify_task",
            Self::DeleteTask => "delete_task",
            Self::FindTask => "find_task",
            Self::ListTasks => "list_tasks",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error categories, ordered from caller mistakes to infrastructure faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// Input failed validation.
    Validation,
    /// A referenced entity does not exist.
    NotFound,
    /// The entity's state does not permit the operation.
    InvalidState,
    /// A multi-step write could not be applied atomically.
    Consistency,
    /// The store failed.
    Store,
}

/// Errors surfaced by [`LifecycleEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input failed validation.
    #[error("{operation}: invalid input: {source}")]
    Validation {
        /// Failing operation.
        operation: Operation,
        /// Validation failure.
        #[source]
        source: LifecycleDomainError,
    },

    /// A referenced entity does not exist.
    #[error("{operation}: {entity} {id} not found")]
    NotFound {
        /// Failing operation.
        operation: Operation,
        /// Kind of entity, such as `task` or `period`.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The entity's state does not permit the operation.
    #[error("{operation}: {source}")]
    InvalidState {
        /// Failing operation.
        operation: Operation,
        /// Violated state rule.
        #[source]
        source: LifecycleDomainError,
    },

    /// The current period could not be closed; nothing was committed.
    #[error("{operation}: no current period to close")]
    AlreadyClosed {
        /// Failing operation.
        operation: Operation,
    },

    /// A multi-step write was rolled back.
    #[error("{operation}: {source}")]
    Consistency {
        /// Failing operation.
        operation: Operation,
        /// Period involved, when known.
        period_id: Option<PeriodId>,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// The store failed.
    #[error("{operation}: {source}")]
    Store {
        /// Failing operation.
        operation: Operation,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// A background metrics task did not finish.
    #[error("{operation}: background task failed: {source}")]
    Join {
        /// Failing operation.
        operation: Operation,
        /// Runtime failure.
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Returns the error's category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } | Self::AlreadyClosed { .. } => ErrorKind::InvalidState,
            Self::Consistency { .. } => ErrorKind::Consistency,
            Self::Store { .. } | Self::Join { .. } => ErrorKind::Store,
        }
    }

    /// Returns the operation that failed.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Validation { operation, .. }
            | Self::NotFound { operation, .. }
            | Self::InvalidState { operation, .. }
            | Self::AlreadyClosed { operation }
            | Self::Consistency { operation, .. }
            | Self::Store { operation, .. }
            | Self::Join { operation, .. } => *operation,
        }
    }

    fn domain(operation: Operation, source: LifecycleDomainError) -> Self {
        match source {
            LifecycleDomainError::EmptyTitle
            | LifecycleDomainError::EmptyResource
            | LifecycleDomainError::EmptyCategory => Self::Validation { operation, source },
            _ => Self::InvalidState { operation, source },
        }
    }

    fn store(operation: Operation, source: StoreError) -> Self {
        match source {
            StoreError::TaskNotFound(id) => Self::NotFound {
                operation,
                entity: "task",
                id: id.to_string(),
            },
            StoreError::DanglingPeriod { period_id, .. } => Self::Consistency {
                operation,
                period_id: Some(period_id),
                source,
            },
            StoreError::MultipleCurrentPeriods { attempted, .. } => Self::Consistency {
                operation,
                period_id: Some(attempted),
                source,
            },
            StoreError::Persistence(_) => Self::Store { operation, source },
        }
    }

    fn period(operation: Operation, err: PeriodError) -> Self {
        match err {
            PeriodError::NoPeriod(source) | PeriodError::Store(source) => {
                Self::store(operation, source)
            }
            PeriodError::AlreadyClosed => Self::AlreadyClosed { operation },
            PeriodError::NotFound(id) => Self::NotFound {
                operation,
                entity: "period",
                id: id.to_string(),
            },
            PeriodError::Domain(source) => Self::domain(operation, source),
            PeriodError::Consistency { period_id, source } => Self::Consistency {
                operation,
                period_id: Some(period_id),
                source,
            },
        }
    }

    fn task(operation: Operation, err: TaskLifecycleError) -> Self {
        match err {
            TaskLifecycleError::Domain(source) => Self::domain(operation, source),
            TaskLifecycleError::NotFound(id) => Self::NotFound {
                operation,
                entity: "task",
                id: id.to_string(),
            },
            TaskLifecycleError::Store(source) => Self::store(operation, source),
        }
    }

    fn metrics(operation: Operation, err: MetricsError) -> Self {
        match err {
            MetricsError::PeriodNotFound(id) => Self::NotFound {
                operation,
                entity: "period",
                id: id.to_string(),
            },
            MetricsError::Store(source) => Self::store(operation, source),
        }
    }
}

/// Single entry point for period, task and metrics operations.
///
/// Mutating operations are serialized through one writer lock so callers
/// sharing an engine observe a total order of writes. Metrics and lookups
/// read store snapshots and never wait on that lock.
pub struct LifecycleEngine<S, C>
where
    S: LifecycleStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    periods: PeriodManager<S, C>,
    tasks: TaskLifecycleService<S, C>,
    metrics: MetricsAggregator<S, C>,
    writer: Arc<Mutex<()>>,
}

impl<S, C> Clone for LifecycleEngine<S, C>
where
    S: LifecycleStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            periods: self.periods.clone(),
            tasks: self.tasks.clone(),
            metrics: self.metrics.clone(),
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<S, C> LifecycleEngine<S, C>
where
    S: LifecycleStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an engine over `store`, reading time from `clock`.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self {
            periods: PeriodManager::new(Arc::clone(&store), Arc::clone(&clock)),
            tasks: TaskLifecycleService::new(Arc::clone(&store), Arc::clone(&clock)),
            metrics: MetricsAggregator::new(store, clock),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the current period, opening one on the clock's date if none
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the period cannot be created.
    pub async fn current_period(&self) -> EngineResult<PerformancePeriod> {
        let _guard = self.writer.lock().await;
        self.periods
            .get_current_period(None)
            .await
            .map_err(|err| EngineError::period(Operation::CurrentPeriod, err))
    }

    /// Returns the current period, opening one starting on `today` if none
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the period cannot be created.
    pub async fn current_period_from(&self, today: NaiveDate) -> EngineResult<PerformancePeriod> {
        let _guard = self.writer.lock().await;
        self.periods
            .get_current_period(Some(today))
            .await
            .map_err(|err| EngineError::period(Operation::CurrentPeriod, err))
    }

    /// Closes the current period on `end_date` and rolls unfinished tasks
    /// into its successor.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyClosed`] without a current period,
    /// [`EngineError::InvalidState`] when `end_date` precedes the start, or
    /// [`EngineError::Consistency`] when the rollover was rolled back.
    pub async fn close_period(&self, end_date: NaiveDate) -> EngineResult<ClosedPeriodSummary> {
        let _guard = self.writer.lock().await;
        self.periods
            .close_current_period(end_date)
            .await
            .map_err(|err| EngineError::period(Operation::ClosePeriod, err))
    }

    /// Finds a period by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown periods.
    pub async fn find_period(&self, period_id: PeriodId) -> EngineResult<PerformancePeriod> {
        self.periods
            .find_period(period_id)
            .await
            .map_err(|err| EngineError::period(Operation::FindPeriod, err))
    }

    /// Lists every period ordered by start date.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the store fails.
    pub async fn periods(&self) -> EngineResult<Vec<PerformancePeriod>> {
        self.periods
            .list_periods()
            .await
            .map_err(|err| EngineError::period(Operation::ListPeriods, err))
    }

    /// Creates a task in the current period.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for blank fields or
    /// [`EngineError::Store`] when persistence fails.
    pub async fn create_task(&self, request: CreateTaskRequest) -> EngineResult<Task> {
        let _guard = self.writer.lock().await;
        self.tasks
            .create_task(request)
            .await
            .map_err(|err| EngineError::task(Operation::CreateTask, err))
    }

    /// Moves a task to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown tasks and
    /// [`EngineError::InvalidState`] for no-op moves, moves out of
    /// `completed` and deleted tasks.
    pub async fn move_task(&self, task_id: TaskId, target: TaskStatus) -> EngineResult<Task> {
        let _guard = self.writer.lock().await;
        self.tasks
            .transition(task_id, target)
            .await
            .map_err(|err| EngineError::task(Operation::MoveTask, err))
    }

    /// Reopens a completed task.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown tasks and
    /// [`EngineError::InvalidState`] when the task is not completed.
    pub async fn reopen_task(&self, task_id: TaskId) -> EngineResult<Task> {
        let _guard = self.writer.lock().await;
        self.tasks
            .reopen(task_id)
            .await
            .map_err(|err| EngineError::task(Operation::ReopenTask, err))
    }

    /// Replaces or clears a task's assignee.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for blank names,
    /// [`EngineError::NotFound`] for unknown tasks and
    /// [`EngineError::InvalidState`] for deleted tasks.
    pub async fn reassign_task(
        &self,
        task_id: TaskId,
        resource: Option<String>,
    ) -> EngineResult<Task> {
        let _guard = self.writer.lock().await;
        self.tasks
            .reassign_resource(task_id, resource)
            .await
            .map_err(|err| EngineError::task(Operation::ReassignTask, err))
    }

    /// Replaces or clears a task's category.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for blank categories,
    /// [`EngineError::NotFound`] for unknown tasks and
    /// [`EngineError::InvalidState`] for deleted tasks.
    pub async fn reclassify_task(
        &self,
        task_id: TaskId,
        category: Option<String>,
    ) -> EngineResult<Task> {
        let _guard = self.writer.lock().await;
        self.tasks
            .reclassify(task_id, category)
            .await
            .map_err(|err| EngineError::task(Operation::ReclassifyTask, err))
    }

    /// Soft-deletes a task.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown tasks and
    /// [`EngineError::InvalidState`] when already deleted.
    pub async fn delete_task(&self, task_id: TaskId) -> EngineResult<Task> {
        let _guard = self.writer.lock().await;
        self.tasks
            .delete_task(task_id)
            .await
            .map_err(|err| EngineError::task(Operation::DeleteTask, err))
    }

    /// Finds a task. Deleted tasks are reported as not found.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown or deleted tasks.
    pub async fn find_task(&self, task_id: TaskId) -> EngineResult<Task> {
        let task = self
            .tasks
            .find_task(task_id)
            .await
            .map_err(|err| EngineError::task(Operation::FindTask, err))?;
        if TaskFilter::Live.admits(&task) {
            Ok(task)
        } else {
            Err(EngineError::NotFound {
                operation: Operation::FindTask,
                entity: "task",
                id: task_id.to_string(),
            })
        }
    }

    /// Lists the live tasks attached to `period_id` in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the store fails.
    pub async fn tasks_in_period(&self, period_id: PeriodId) -> EngineResult<Vec<Task>> {
        self.tasks
            .tasks_in_period(period_id, TaskFilter::Live)
            .await
            .map_err(|err| EngineError::task(Operation::ListTasks, err))
    }

    /// Computes metrics for `scope` from one store snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown periods or
    /// [`EngineError::Store`] when the snapshot cannot be read.
    pub async fn metrics_for(&self, scope: MetricsScope) -> EngineResult<MetricsSnapshot> {
        self.metrics
            .metrics_for(scope)
            .await
            .map_err(|err| EngineError::metrics(Operation::Metrics, err))
    }

    /// Computes metrics on a background task so callers can keep writing.
    #[must_use]
    pub fn spawn_metrics(&self, scope: MetricsScope) -> JoinHandle<EngineResult<MetricsSnapshot>> {
        let aggregator = self.metrics.clone();
        tokio::spawn(async move {
            aggregator
                .metrics_for(scope)
                .await
                .map_err(|err| EngineError::metrics(Operation::Metrics, err))
        })
    }
}

/// Waits for a metrics task started by [`LifecycleEngine::spawn_metrics`].
///
/// # Errors
///
/// Returns the task's own error, or [`EngineError::Join`] when it panicked
/// or was cancelled.
pub async fn join_metrics(
    handle: JoinHandle<EngineResult<MetricsSnapshot>>,
) -> EngineResult<MetricsSnapshot> {
    handle.await.map_err(|source| EngineError::Join {
        operation: Operation::Metrics,
        source,
    })?
}
