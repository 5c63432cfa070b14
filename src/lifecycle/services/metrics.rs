//! On-demand metrics computed from a consistent store snapshot.

use crate::lifecycle::{
    domain::{MetricsSnapshot, PeriodId},
    ports::{LifecycleStore, StoreError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Which periods a metrics request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsScope {
    /// A single period by identifier.
    Period(PeriodId),
    /// The current period; empty when none exists.
    Current,
    /// Every stored period.
    All,
}

/// Errors returned while computing metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The requested period does not exist.
    #[error("period not found: {0}")]
    PeriodNotFound(PeriodId),

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Computes derived statistics without mutating the store.
pub struct MetricsAggregator<S, C>
where
    S: LifecycleStore,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> Clone for MetricsAggregator<S, C>
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

impl<S, C> MetricsAggregator<S, C>
where
    S: LifecycleStore,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a new aggregator.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Computes metrics for `scope`.
    ///
    /// Periods and tasks are read from one snapshot, so concurrent writes are
    /// either fully visible or not at all. Open periods are measured up to
    /// the clock's current instant.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::PeriodNotFound`] for unknown periods or
    /// [`MetricsError::Store`] when the snapshot cannot be read.
    pub async fn metrics_for(&self, scope: MetricsScope) -> Result<MetricsSnapshot, MetricsError> {
        let (periods, tasks) = self
            .store
            .read(move |view| {
                let periods = match scope {
                    MetricsScope::Period(id) => view.find_period(id)?.into_iter().collect(),
                    MetricsScope::Current => view.current_period()?.into_iter().collect(),
                    MetricsScope::All => view.list_periods()?,
                };
                let tasks = if periods.is_empty() {
                    Vec::new()
                } else {
                    view.all_tasks()?
                };
                Ok((periods, tasks))
            })
            .await?;

        match scope {
            MetricsScope::Period(id) if periods.is_empty() => {
                return Err(MetricsError::PeriodNotFound(id));
            }
            _ => {}
        }

        let snapshot = MetricsSnapshot::compute(&periods, &tasks, self.clock.utc());
        tracing::debug!(
            periods = snapshot.periods.len(),
            tasks = tasks.len(),
            "computed metrics snapshot"
        );
        Ok(snapshot)
    }
}
