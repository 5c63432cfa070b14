//! Performance period aggregate.

use super::{LifecycleDomainError, PeriodId};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Bounded calendar window that tasks and metrics are grouped against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformancePeriod {
    id: PeriodId,
    start: NaiveDate,
    end: Option<NaiveDate>,
    is_current: bool,
    created_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPeriodData {
    /// Persisted period identifier.
    pub id: PeriodId,
    /// First day of the period.
    pub start: NaiveDate,
    /// Last day of the period, if closed.
    pub end: Option<NaiveDate>,
    /// Whether the period is the current one.
    pub is_current: bool,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl PerformancePeriod {
    /// Opens a new current period starting on `start`.
    #[must_use]
    pub fn open(start: NaiveDate, clock: &impl Clock) -> Self {
        Self {
            id: PeriodId::new(),
            start,
            end: None,
            is_current: true,
            created_at: clock.utc(),
        }
    }

    /// Reconstructs a period from persisted storage.
    #[must_use]
    pub const fn from_persisted(data: PersistedPeriodData) -> Self {
        Self {
            id: data.id,
            start: data.start,
            end: data.end,
            is_current: data.is_current,
            created_at: data.created_at,
        }
    }

    /// Returns the period identifier.
    #[must_use]
    pub const fn id(&self) -> PeriodId {
        self.id
    }

    /// Returns the first day of the period.
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Returns the last day of the period, or `None` while it is open.
    #[must_use]
    pub const fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    /// Returns whether this is the current period.
    #[must_use]
    pub const fn is_current(&self) -> bool {
        self.is_current
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Closes the period on `end_date` (inclusive).
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::PeriodAlreadyClosed`] when the period
    /// is not current, or [`LifecycleDomainError::InvalidRange`] when
    /// `end_date` precedes the start date.
    pub fn close(&mut self, end_date: NaiveDate) -> Result<(), LifecycleDomainError> {
        if !self.is_current {
            return Err(LifecycleDomainError::PeriodAlreadyClosed(self.id));
        }
        if end_date < self.start {
            return Err(LifecycleDomainError::InvalidRange {
                period_id: self.id,
                start: self.start,
                end: end_date,
            });
        }
        self.end = Some(end_date);
        self.is_current = false;
        Ok(())
    }

    /// Returns the start date of the period that follows a close on
    /// `end_date`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::DateOutOfRange`] at the end of the
    /// supported calendar.
    pub fn successor_start(end_date: NaiveDate) -> Result<NaiveDate, LifecycleDomainError> {
        end_date
            .checked_add_days(Days::new(1))
            .ok_or(LifecycleDomainError::DateOutOfRange(end_date))
    }

    /// Returns the UTC instant window covered by the period.
    ///
    /// Closed periods cover `[start 00:00, end + 1 day 00:00)`; the open
    /// period covers `[start 00:00, now]`.
    #[must_use]
    pub fn window(&self, now: DateTime<Utc>) -> PeriodWindow {
        let from = self.start.and_time(NaiveTime::MIN).and_utc();
        let until = match self.end {
            Some(end) => end
                .checked_add_days(Days::new(1))
                .map_or(WindowEnd::Unbounded, |next| {
                    WindowEnd::Exclusive(next.and_time(NaiveTime::MIN).and_utc())
                }),
            None => WindowEnd::Inclusive(now),
        };
        PeriodWindow { from, until }
    }
}

/// Instant range covered by a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    from: DateTime<Utc>,
    until: WindowEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowEnd {
    Exclusive(DateTime<Utc>),
    Inclusive(DateTime<Utc>),
    Unbounded,
}

impl PeriodWindow {
    /// Returns whether `instant` falls within the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        if instant < self.from {
            return false;
        }
        match self.until {
            WindowEnd::Exclusive(limit) => instant < limit,
            WindowEnd::Inclusive(limit) => instant <= limit,
            WindowEnd::Unbounded => true,
        }
    }
}
