//! Task lifecycle orchestration: creation, status transitions, reopening,
//! reassignment and soft deletion.

use super::period::ensure_current_period;
use crate::lifecycle::{
    domain::{
        LifecycleDomainError, NewTask, PeriodId, ProjectCategory, ResourceName, Task, TaskId,
        TaskStatus, TaskTitle,
    },
    ports::{LifecycleStore, StoreError, TaskFilter},
};
use chrono::NaiveDate;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Request to create a task in the current period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    title: String,
    description: Option<String>,
    resource: Option<String>,
    category: Option<String>,
    status: TaskStatus,
    today: Option<NaiveDate>,
}

impl CreateTaskRequest {
    /// Creates a request for an `Unassigned` task titled `title`.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            resource: None,
            category: None,
            status: TaskStatus::Unassigned,
            today: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the assignee.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the initial status.
    #[must_use]
    pub const fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the start date used if a period must be opened for the task.
    #[must_use]
    pub const fn on_date(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn into_fields(self) -> Result<(NewTask, Option<NaiveDate>), LifecycleDomainError> {
        let fields = NewTask {
            title: TaskTitle::new(self.title)?,
            description: self
                .description
                .map(|text| text.trim().to_owned())
                .filter(|text| !text.is_empty()),
            resource: self.resource.map(ResourceName::new).transpose()?,
            category: self.category.map(ProjectCategory::new).transpose()?,
            initial_status: self.status,
        };
        Ok((fields, self.today))
    }
}

/// Service-level errors for task operations.
#[derive(Debug, Error)]
pub enum TaskLifecycleError {
    /// Domain validation or state rule failed.
    #[error(transparent)]
    Domain(#[from] LifecycleDomainError),

    /// The task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for task lifecycle operations.
pub type TaskLifecycleResult<T> = Result<T, TaskLifecycleError>;

/// Task lifecycle orchestration service.
pub struct TaskLifecycleService<S, C>
where
    S: LifecycleStore,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> Clone for TaskLifecycleService<S, C>
where
    S: LifecycleStore,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, C> TaskLifecycleService<S, C>
where
    S: LifecycleStore,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a new lifecycle service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Creates a task attached to the current period, opening one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Domain`] for invalid fields or
    /// [`TaskLifecycleError::Store`] when persistence fails.
    pub async fn create_task(&self, request: CreateTaskRequest) -> TaskLifecycleResult<Task> {
        let (fields, today) = request.into_fields()?;
        let start = today.unwrap_or_else(|| self.clock.utc().date_naive());
        let clock = Arc::clone(&self.clock);
        let task = self
            .store
            .transaction(move |tx| {
                let (period, _) = ensure_current_period(tx, start, &*clock)?;
                let task = Task::create(fields, period.id(), &*clock);
                tx.put_task(&task)?;
                Ok::<_, TaskLifecycleError>(task)
            })
            .await?;

        tracing::info!(
            task_id = %task.id(),
            period_id = %task.period_id(),
            status = %task.status(),
            "created task"
        );
        Ok(task)
    }

    /// Moves a task to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] for unknown tasks and
    /// [`TaskLifecycleError::Domain`] for no-op, tombstoned or completed
    /// tasks.
    pub async fn transition(&self, task_id: TaskId, target: TaskStatus) -> TaskLifecycleResult<Task> {
        let task = self
            .mutate(task_id, move |task, clock| {
                task.transition_to(target, clock).map(drop)
            })
            .await?;
        tracing::info!(%task_id, status = %task.status(), "task transitioned");
        Ok(task)
    }

    /// Reopens a completed task into `InProgress`.
    ///
    /// A task left behind in a closed period moves to the current period in
    /// the same transaction. Its log, and with it the first completion
    /// counted by the closed period, is kept.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] for unknown tasks and
    /// [`TaskLifecycleError::Domain`] when the task is not completed.
    pub async fn reopen(&self, task_id: TaskId) -> TaskLifecycleResult<Task> {
        let clock = Arc::clone(&self.clock);
        let (task, from_period) = self
            .store
            .transaction(move |tx| {
                let mut task = tx
                    .find_task(task_id)?
                    .ok_or(TaskLifecycleError::NotFound(task_id))?;
                task.reopen(&*clock)?;
                let from_period = task.period_id();
                let today = clock.utc().date_naive();
                let (current, _) = ensure_current_period(tx, today, &*clock)?;
                if current.id() != from_period {
                    task.move_to_period(current.id(), &*clock);
                }
                tx.put_task(&task)?;
                Ok::<_, TaskLifecycleError>((task, from_period))
            })
            .await?;
        tracing::info!(
            %task_id,
            from_period = %from_period,
            period_id = %task.period_id(),
            "task reopened"
        );
        Ok(task)
    }

    /// Replaces or clears a task's assignee.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Domain`] for blank names or tombstoned
    /// tasks and [`TaskLifecycleError::NotFound`] for unknown tasks.
    pub async fn reassign_resource(
        &self,
        task_id: TaskId,
        resource: Option<String>,
    ) -> TaskLifecycleResult<Task> {
        let assignee = resource.map(ResourceName::new).transpose()?;
        self.mutate(task_id, move |task, clock| task.reassign_resource(assignee, clock))
            .await
    }

    /// Replaces or clears a task's category.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Domain`] for blank categories or
    /// tombstoned tasks and [`TaskLifecycleError::NotFound`] for unknown
    /// tasks.
    pub async fn reclassify(
        &self,
        task_id: TaskId,
        category: Option<String>,
    ) -> TaskLifecycleResult<Task> {
        let tag = category.map(ProjectCategory::new).transpose()?;
        self.mutate(task_id, move |task, clock| task.reclassify(tag, clock))
            .await
    }

    /// Soft-deletes a task. Its history stays in the store.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] for unknown tasks and
    /// [`TaskLifecycleError::Domain`] when already deleted.
    pub async fn delete_task(&self, task_id: TaskId) -> TaskLifecycleResult<Task> {
        let clock = Arc::clone(&self.clock);
        let task = self
            .store
            .transaction(move |tx| {
                let mut task = tx
                    .find_task(task_id)?
                    .ok_or(TaskLifecycleError::NotFound(task_id))?;
                task.tombstone(&*clock)?;
                tx.soft_delete_task(task_id, task.updated_at())?;
                Ok::<_, TaskLifecycleError>(task)
            })
            .await?;
        tracing::info!(%task_id, "task deleted");
        Ok(task)
    }

    /// Finds a task, including tombstoned ones.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::NotFound`] for unknown tasks.
    pub async fn find_task(&self, task_id: TaskId) -> TaskLifecycleResult<Task> {
        self.store
            .read(move |view| view.find_task(task_id))
            .await?
            .ok_or(TaskLifecycleError::NotFound(task_id))
    }

    /// Lists the tasks attached to `period_id` in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Store`] when the lookup fails.
    pub async fn tasks_in_period(
        &self,
        period_id: PeriodId,
        filter: TaskFilter,
    ) -> TaskLifecycleResult<Vec<Task>> {
        Ok(self
            .store
            .read(move |view| view.query_tasks(period_id, filter))
            .await?)
    }

    async fn mutate<F>(&self, task_id: TaskId, mutation: F) -> TaskLifecycleResult<Task>
    where
        F: FnOnce(&mut Task, &C) -> Result<(), LifecycleDomainError> + Send + 'static,
    {
        let clock = Arc::clone(&self.clock);
        self.store
            .transaction(move |tx| {
                let mut task = tx
                    .find_task(task_id)?
                    .ok_or(TaskLifecycleError::NotFound(task_id))?;
                mutation(&mut task, &*clock)?;
                tx.put_task(&task)?;
                Ok(task)
            })
            .await
    }
}
