//! In-memory lifecycle store.
//!
//! State lives in persistent maps behind an `Arc`. A write transaction works
//! on a cheap clone and publishes it with a pointer swap on commit; readers
//! take the published `Arc` and never hold a lock while they compute.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, RwLock};

use crate::lifecycle::{
    domain::{PerformancePeriod, PeriodId, Task, TaskId},
    ports::{LifecycleStore, StoreError, StoreReader, StoreResult, StoreWriter, TaskFilter},
};

/// Thread-safe in-memory lifecycle store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLifecycleStore {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    published: RwLock<Arc<StoreState>>,
    writer: Mutex<()>,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    periods: im::HashMap<PeriodId, PerformancePeriod>,
    tasks: im::HashMap<TaskId, Task>,
}

impl InMemoryLifecycleStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn published(&self) -> StoreResult<Arc<StoreState>> {
        let published = self
            .shared
            .published
            .read()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        Ok(Arc::clone(&published))
    }

    fn publish(&self, state: StoreState) -> StoreResult<()> {
        let mut published = self
            .shared
            .published
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        *published = Arc::new(state);
        Ok(())
    }
}

impl StoreState {
    fn current_period(&self) -> Option<PerformancePeriod> {
        self.periods
            .values()
            .find(|period| period.is_current())
            .cloned()
    }

    fn list_periods(&self) -> Vec<PerformancePeriod> {
        let mut periods: Vec<PerformancePeriod> = self.periods.values().cloned().collect();
        periods.sort_by_key(|period| (period.start(), period.created_at()));
        periods
    }

    fn query_tasks(&self, period_id: PeriodId, filter: TaskFilter) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|task| task.period_id() == period_id && filter.admits(task))
            .cloned()
            .collect();
        tasks.sort_by_key(|task| (task.created_at(), task.id()));
        tasks
    }

    fn all_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by_key(|task| (task.created_at(), task.id()));
        tasks
    }
}

/// Read view over a published state.
struct SnapshotView {
    state: Arc<StoreState>,
}

/// Uncommitted working copy of a write transaction.
struct WorkingSet {
    state: StoreState,
}

impl StoreReader for SnapshotView {
    fn find_period(&mut self, id: PeriodId) -> StoreResult<Option<PerformancePeriod>> {
        Ok(self.state.periods.get(&id).cloned())
    }

    fn current_period(&mut self) -> StoreResult<Option<PerformancePeriod>> {
        Ok(self.state.current_period())
    }

    fn list_periods(&mut self) -> StoreResult<Vec<PerformancePeriod>> {
        Ok(self.state.list_periods())
    }

    fn find_task(&mut self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.state.tasks.get(&id).cloned())
    }

    fn query_tasks(&mut self, period_id: PeriodId, filter: TaskFilter) -> StoreResult<Vec<Task>> {
        Ok(self.state.query_tasks(period_id, filter))
    }

    fn all_tasks(&mut self) -> StoreResult<Vec<Task>> {
        Ok(self.state.all_tasks())
    }
}

impl StoreReader for WorkingSet {
    fn find_period(&mut self, id: PeriodId) -> StoreResult<Option<PerformancePeriod>> {
        Ok(self.state.periods.get(&id).cloned())
    }

    fn current_period(&mut self) -> StoreResult<Option<PerformancePeriod>> {
        Ok(self.state.current_period())
    }

    fn list_periods(&mut self) -> StoreResult<Vec<PerformancePeriod>> {
        Ok(self.state.list_periods())
    }

    fn find_task(&mut self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.state.tasks.get(&id).cloned())
    }

    fn query_tasks(&mut self, period_id: PeriodId, filter: TaskFilter) -> StoreResult<Vec<Task>> {
        Ok(self.state.query_tasks(period_id, filter))
    }

    fn all_tasks(&mut self) -> StoreResult<Vec<Task>> {
        Ok(self.state.all_tasks())
    }
}

impl StoreWriter for WorkingSet {
    fn put_period(&mut self, period: &PerformancePeriod) -> StoreResult<()> {
        if period.is_current() {
            let other_current = self
                .state
                .periods
                .values()
                .find(|stored| stored.is_current() && stored.id() != period.id());
            if let Some(existing) = other_current {
                return Err(StoreError::MultipleCurrentPeriods {
                    existing: existing.id(),
                    attempted: period.id(),
                });
            }
        }
        self.state.periods.insert(period.id(), period.clone());
        Ok(())
    }

    fn put_task(&mut self, task: &Task) -> StoreResult<()> {
        if !self.state.periods.contains_key(&task.period_id()) {
            return Err(StoreError::DanglingPeriod {
                task_id: task.id(),
                period_id: task.period_id(),
            });
        }
        self.state.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    fn soft_delete_task(&mut self, id: TaskId, deleted_at: DateTime<Utc>) -> StoreResult<()> {
        let stored = self
            .state
            .tasks
            .get(&id)
            .cloned()
            .ok_or(StoreError::TaskNotFound(id))?;
        let mut data = stored.into_persisted();
        data.deleted_at = Some(deleted_at);
        data.updated_at = data.updated_at.max(deleted_at);
        self.state.tasks.insert(id, Task::from_persisted(data));
        Ok(())
    }
}

#[async_trait]
impl LifecycleStore for InMemoryLifecycleStore {
    async fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreWriter) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let _writer = self.shared.writer.lock().map_err(|err| {
            E::from(StoreError::persistence(std::io::Error::other(
                err.to_string(),
            )))
        })?;

        let base = self.published().map_err(E::from)?;
        let mut working = WorkingSet {
            state: StoreState::clone(&base),
        };
        let value = operation(&mut working)?;
        self.publish(working.state).map_err(E::from)?;
        Ok(value)
    }

    async fn read<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn StoreReader) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut view = SnapshotView {
            state: self.published()?,
        };
        operation(&mut view)
    }
}
