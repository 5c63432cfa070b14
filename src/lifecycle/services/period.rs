//! Performance period lifecycle: current-period detection, closing and
//! rollover.

use crate::lifecycle::{
    domain::{LifecycleDomainError, PerformancePeriod, PeriodId, TaskId, TaskStatus},
    ports::{LifecycleStore, StoreError, StoreWriter, TaskFilter},
};
use chrono::NaiveDate;
use mockable::Clock;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of closing the current period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedPeriodSummary {
    /// The period that was closed.
    pub closed: PerformancePeriod,
    /// The newly opened current period.
    pub successor: PerformancePeriod,
    /// Tasks moved to the successor, in creation order.
    pub rolled_over: Vec<TaskId>,
    /// Completed tasks that stayed with the closed period.
    pub retained_completed: usize,
}

/// Service-level errors for period operations.
#[derive(Debug, Error)]
pub enum PeriodError {
    /// No current period existed and one could not be created.
    #[error("no current period could be established: {0}")]
    NoPeriod(#[source] StoreError),

    /// There is no current period to close.
    #[error("no current period to close")]
    AlreadyClosed,

    /// The requested period does not exist.
    #[error("period not found: {0}")]
    NotFound(PeriodId),

    /// Domain validation failed, such as an end date before the start.
    #[error(transparent)]
    Domain(#[from] LifecycleDomainError),

    /// Rollover could not be applied; nothing was committed.
    #[error("rollover of period {period_id} failed and was rolled back: {source}")]
    Consistency {
        /// Period that was being closed.
        period_id: PeriodId,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for period operations.
pub type PeriodResult<T> = Result<T, PeriodError>;

/// Owns performance period records.
pub struct PeriodManager<S, C>
where
    S: LifecycleStore,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> Clone for PeriodManager<S, C>
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

impl<S, C> PeriodManager<S, C>
where
    S: LifecycleStore,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a new period manager.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Returns the current period, opening one when none exists.
    ///
    /// A new period starts on `today`, or on the clock's UTC date when
    /// `today` is `None`. Detection and creation share one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::NoPeriod`] when the store cannot read or
    /// create the period.
    pub async fn get_current_period(
        &self,
        today: Option<NaiveDate>,
    ) -> PeriodResult<PerformancePeriod> {
        let clock = Arc::clone(&self.clock);
        let start = today.unwrap_or_else(|| self.clock.utc().date_naive());
        let (period, opened) = self
            .store
            .transaction(move |tx| ensure_current_period(tx, start, &*clock))
            .await
            .map_err(PeriodError::NoPeriod)?;

        if opened {
            tracing::info!(
                period_id = %period.id(),
                start = %period.start(),
                "opened performance period"
            );
        }
        Ok(period)
    }

    /// Closes the current period on `end_date` and rolls unfinished tasks
    /// into a successor starting the next day.
    ///
    /// The close, the successor and every task move commit together or not
    /// at all.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::AlreadyClosed`] when no period is current,
    /// [`PeriodError::Domain`] when `end_date` precedes the start, and
    /// [`PeriodError::Consistency`] when any write fails mid-rollover.
    pub async fn close_current_period(
        &self,
        end_date: NaiveDate,
    ) -> PeriodResult<ClosedPeriodSummary> {
        let clock = Arc::clone(&self.clock);
        let summary = self
            .store
            .transaction(move |tx| roll_over(tx, end_date, &*clock))
            .await
            .inspect_err(|err| tracing::warn!(error = %err, %end_date, "period close failed"))?;

        tracing::info!(
            closed_period = %summary.closed.id(),
            successor = %summary.successor.id(),
            rolled_over = summary.rolled_over.len(),
            retained_completed = summary.retained_completed,
            "closed performance period"
        );
        Ok(summary)
    }

    /// Finds a period by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::NotFound`] for unknown identifiers or
    /// [`PeriodError::Store`] when the lookup fails.
    pub async fn find_period(&self, id: PeriodId) -> PeriodResult<PerformancePeriod> {
        self.store
            .read(move |view| view.find_period(id))
            .await?
            .ok_or(PeriodError::NotFound(id))
    }

    /// Lists every period ordered by start date.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::Store`] when the lookup fails.
    pub async fn list_periods(&self) -> PeriodResult<Vec<PerformancePeriod>> {
        Ok(self.store.read(|view| view.list_periods()).await?)
    }
}

/// Returns the current period, storing a new one starting on `start` when
/// none is current. The flag reports whether a period was created.
pub(crate) fn ensure_current_period<W, C>(
    tx: &mut W,
    start: NaiveDate,
    clock: &C,
) -> Result<(PerformancePeriod, bool), StoreError>
where
    W: StoreWriter + ?Sized,
    C: Clock,
{
    if let Some(current) = tx.current_period()? {
        return Ok((current, false));
    }
    let period = PerformancePeriod::open(start, clock);
    tx.put_period(&period)?;
    Ok((period, true))
}

fn roll_over<W, C>(
    tx: &mut W,
    end_date: NaiveDate,
    clock: &C,
) -> PeriodResult<ClosedPeriodSummary>
where
    W: StoreWriter + ?Sized,
    C: Clock,
{
    let mut closing = tx.current_period()?.ok_or(PeriodError::AlreadyClosed)?;
    closing.close(end_date)?;
    let successor =
        PerformancePeriod::open(PerformancePeriod::successor_start(end_date)?, clock);

    let closing_id = closing.id();
    let consistency = |source| PeriodError::Consistency {
        period_id: closing_id,
        source,
    };

    tx.put_period(&closing).map_err(consistency)?;
    tx.put_period(&successor).map_err(consistency)?;

    let attached = tx
        .query_tasks(closing_id, TaskFilter::Live)
        .map_err(consistency)?;
    let mut rolled_over = Vec::new();
    let mut retained_completed = 0_usize;
    for mut task in attached {
        if task.status() == TaskStatus::Completed {
            retained_completed += 1;
            continue;
        }
        task.move_to_period(successor.id(), clock);
        tx.put_task(&task).map_err(consistency)?;
        rolled_over.push(task.id());
    }

    Ok(ClosedPeriodSummary {
        closed: closing,
        successor,
        rolled_over,
        retained_completed,
    })
}
