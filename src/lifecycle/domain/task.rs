//! Task aggregate root.

use super::{
    LifecycleDomainError, PeriodId, ProjectCategory, ResourceName, TaskId, TaskStatus, TaskTitle,
    TransitionEntry, TransitionLog,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Validated fields for a task that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Task title.
    pub title: TaskTitle,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Optional assignee.
    pub resource: Option<ResourceName>,
    /// Optional classification tag.
    pub category: Option<ProjectCategory>,
    /// Status the task starts in.
    pub initial_status: TaskStatus,
}

impl NewTask {
    /// Creates task fields with the given title and default `Unassigned`
    /// status.
    #[must_use]
    pub const fn new(title: TaskTitle) -> Self {
        Self {
            title,
            description: None,
            resource: None,
            category: None,
            initial_status: TaskStatus::Unassigned,
        }
    }
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    title: TaskTitle,
    description: Option<String>,
    resource: Option<ResourceName>,
    category: Option<ProjectCategory>,
    status: TaskStatus,
    period_id: PeriodId,
    transition_log: TransitionLog,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted title.
    pub title: TaskTitle,
    /// Persisted description.
    pub description: Option<String>,
    /// Persisted assignee.
    pub resource: Option<ResourceName>,
    /// Persisted category.
    pub category: Option<ProjectCategory>,
    /// Persisted owning period.
    pub period_id: PeriodId,
    /// Persisted status history. The current status is its last entry.
    pub transition_log: TransitionLog,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Persisted tombstone timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a task in `period_id`, recording its initial status.
    #[must_use]
    pub fn create(fields: NewTask, period_id: PeriodId, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: TaskId::new(),
            title: fields.title,
            description: fields.description,
            resource: fields.resource,
            category: fields.category,
            status: fields.initial_status,
            period_id,
            transition_log: TransitionLog::start(fields.initial_status, timestamp),
            created_at: timestamp,
            updated_at: timestamp,
            deleted_at: None,
        }
    }

    /// Reconstructs a task from persisted storage.
    ///
    /// The status is derived from the log so the two can never disagree.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            title: data.title,
            description: data.description,
            resource: data.resource,
            category: data.category,
            status: data.transition_log.last().status,
            period_id: data.period_id,
            transition_log: data.transition_log,
            created_at: data.created_at,
            updated_at: data.updated_at,
            deleted_at: data.deleted_at,
        }
    }

    /// Decomposes the task into its persisted representation.
    #[must_use]
    pub fn into_persisted(self) -> PersistedTaskData {
        PersistedTaskData {
            id: self.id,
            title: self.title,
            description: self.description,
            resource: self.resource,
            category: self.category,
            period_id: self.period_id,
            transition_log: self.transition_log,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task title.
    #[must_use]
    pub const fn title(&self) -> &TaskTitle {
        &self.title
    }

    /// Returns the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the assignee, if any.
    #[must_use]
    pub const fn resource(&self) -> Option<&ResourceName> {
        self.resource.as_ref()
    }

    /// Returns the category, if any.
    #[must_use]
    pub const fn category(&self) -> Option<&ProjectCategory> {
        self.category.as_ref()
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the owning period.
    #[must_use]
    pub const fn period_id(&self) -> PeriodId {
        self.period_id
    }

    /// Returns the status history.
    #[must_use]
    pub const fn transition_log(&self) -> &TransitionLog {
        &self.transition_log
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest mutation timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when the task was soft-deleted, if it was.
    #[must_use]
    pub const fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Returns whether the task has been soft-deleted.
    #[must_use]
    pub const fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Moves the task to `target`, appending to the transition log.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::TombstonedTask`] for deleted tasks,
    /// [`LifecycleDomainError::NoOpTransition`] when `target` equals the
    /// current status, or [`LifecycleDomainError::ReopenRequired`] when the
    /// task is completed.
    pub fn transition_to(
        &mut self,
        target: TaskStatus,
        clock: &impl Clock,
    ) -> Result<TransitionEntry, LifecycleDomainError> {
        self.ensure_live()?;
        if self.status == target {
            return Err(LifecycleDomainError::NoOpTransition {
                task_id: self.id,
                status: target,
            });
        }
        if !self.status.can_transition_to(target) {
            return Err(LifecycleDomainError::ReopenRequired {
                task_id: self.id,
                target,
            });
        }
        Ok(self.record(target, clock))
    }

    /// Reopens a completed task into `InProgress`.
    ///
    /// The original completion stays in the log.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::TombstonedTask`] for deleted tasks or
    /// [`LifecycleDomainError::InvalidReopen`] when the task is not
    /// completed.
    pub fn reopen(&mut self, clock: &impl Clock) -> Result<TransitionEntry, LifecycleDomainError> {
        self.ensure_live()?;
        if self.status != TaskStatus::Completed {
            return Err(LifecycleDomainError::InvalidReopen {
                task_id: self.id,
                status: self.status,
            });
        }
        Ok(self.record(TaskStatus::InProgress, clock))
    }

    /// Replaces the assignee. No log entry is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::TombstonedTask`] for deleted tasks.
    pub fn reassign_resource(
        &mut self,
        resource: Option<ResourceName>,
        clock: &impl Clock,
    ) -> Result<(), LifecycleDomainError> {
        self.ensure_live()?;
        self.resource = resource;
        self.touch(clock);
        Ok(())
    }

    /// Replaces the category. No log entry is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::TombstonedTask`] for deleted tasks.
    pub fn reclassify(
        &mut self,
        category: Option<ProjectCategory>,
        clock: &impl Clock,
    ) -> Result<(), LifecycleDomainError> {
        self.ensure_live()?;
        self.category = category;
        self.touch(clock);
        Ok(())
    }

    /// Marks the task as deleted while keeping its history.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::TombstonedTask`] when already deleted.
    pub fn tombstone(&mut self, clock: &impl Clock) -> Result<(), LifecycleDomainError> {
        self.ensure_live()?;
        let timestamp = clock.utc().max(self.updated_at);
        self.deleted_at = Some(timestamp);
        self.updated_at = timestamp;
        Ok(())
    }

    /// Reattaches the task to another period during rollover.
    ///
    /// Status and log are untouched.
    pub(crate) fn move_to_period(&mut self, period_id: PeriodId, clock: &impl Clock) {
        self.period_id = period_id;
        self.touch(clock);
    }

    fn record(&mut self, target: TaskStatus, clock: &impl Clock) -> TransitionEntry {
        let entry = self.transition_log.append(target, clock.utc());
        self.status = entry.status;
        self.updated_at = entry.occurred_at.max(self.updated_at);
        entry
    }

    const fn ensure_live(&self) -> Result<(), LifecycleDomainError> {
        if self.deleted_at.is_some() {
            return Err(LifecycleDomainError::TombstonedTask(self.id));
        }
        Ok(())
    }

    /// Updates the `updated_at` timestamp to the current clock time.
    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc().max(self.updated_at);
    }
}
