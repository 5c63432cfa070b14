//! Shared test helpers for in-memory lifecycle integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeDelta, TimeZone, Utc};
use kanban_engine::lifecycle::{
    adapters::memory::InMemoryLifecycleStore,
    domain::{PerformancePeriod, PeriodId, Task, TaskId},
    ports::{
        LifecycleStore, StoreError, StoreReader, StoreResult, StoreWriter, TaskFilter,
    },
    services::LifecycleEngine,
};
use mockable::Clock;
use rstest::fixture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Clock whose reading only changes when a test moves it.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock reading `year-month-day hour:00:00 UTC`.
    pub fn at(year: i32, month: u32, day: u32, hour: u32) -> Self {
        let now = Utc
            .with_ymd_and_hms(year, month, day, hour, 0, 0)
            .single()
            .expect("valid timestamp");
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().expect("clock lock");
        *now += delta;
    }

    /// Moves the clock to midday UTC on `date`.
    pub fn set_date(&self, date: NaiveDate) {
        let midday = date.and_hms_opt(12, 0, 0).expect("valid time").and_utc();
        *self.now.lock().expect("clock lock") = midday;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Engine under test over the in-memory store.
pub type TestEngine = LifecycleEngine<InMemoryLifecycleStore, ManualClock>;

/// Engine, store and clock sharing one board.
pub struct Board {
    /// Facade under test.
    pub engine: TestEngine,
    /// Store behind the engine.
    pub store: Arc<InMemoryLifecycleStore>,
    /// Clock behind the engine.
    pub clock: Arc<ManualClock>,
}

impl Board {
    /// Returns the clock's current UTC date.
    pub fn clock_today(&self) -> NaiveDate {
        self.clock.utc().date_naive()
    }
}

/// Provides an empty board whose clock reads 2025-01-01 09:00 UTC.
#[fixture]
pub fn board() -> Board {
    let store = Arc::new(InMemoryLifecycleStore::new());
    let clock = Arc::new(ManualClock::at(2025, 1, 1, 9));
    Board {
        engine: LifecycleEngine::new(Arc::clone(&store), Arc::clone(&clock)),
        store,
        clock,
    }
}

/// Builds a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Counts periods flagged as current.
pub async fn current_period_count<S: LifecycleStore>(store: &S) -> usize {
    store
        .read(|view| view.list_periods())
        .await
        .expect("period listing should succeed")
        .iter()
        .filter(|period| period.is_current())
        .count()
}

/// Store wrapper that fails task writes after a configurable number of
/// successful ones within a transaction.
pub struct FaultyStore {
    inner: InMemoryLifecycleStore,
    task_writes_allowed: AtomicUsize,
}

impl FaultyStore {
    /// Wraps a fresh in-memory store with no failures armed.
    pub fn new() -> Self {
        Self {
            inner: InMemoryLifecycleStore::new(),
            task_writes_allowed: AtomicUsize::new(usize::MAX),
        }
    }

    /// Fails every transaction's task write after `count` successes.
    pub fn fail_task_writes_after(&self, count: usize) {
        self.task_writes_allowed.store(count, Ordering::SeqCst);
    }

    /// Disarms the injected failure.
    pub fn heal(&self) {
        self.task_writes_allowed.store(usize::MAX, Ordering::SeqCst);
    }
}

impl Default for FaultyStore {
    fn default() -> Self {
        Self::new()
    }
}

struct FaultyWriter<'a> {
    inner: &'a mut dyn StoreWriter,
    remaining: usize,
}

impl StoreReader for FaultyWriter<'_> {
    fn find_period(&mut self, id: PeriodId) -> StoreResult<Option<PerformancePeriod>> {
        self.inner.find_period(id)
    }

    fn current_period(&mut self) -> StoreResult<Option<PerformancePeriod>> {
        self.inner.current_period()
    }

    fn list_periods(&mut self) -> StoreResult<Vec<PerformancePeriod>> {
        self.inner.list_periods()
    }

    fn find_task(&mut self, id: TaskId) -> StoreResult<Option<Task>> {
        self.inner.find_task(id)
    }

    fn query_tasks(&mut self, period_id: PeriodId, filter: TaskFilter) -> StoreResult<Vec<Task>> {
        self.inner.query_tasks(period_id, filter)
    }

    fn all_tasks(&mut self) -> StoreResult<Vec<Task>> {
        self.inner.all_tasks()
    }
}

impl StoreWriter for FaultyWriter<'_> {
    fn put_period(&mut self, period: &PerformancePeriod) -> StoreResult<()> {
        self.inner.put_period(period)
    }

    fn put_task(&mut self, task: &Task) -> StoreResult<()> {
        if self.remaining == 0 {
            return Err(StoreError::persistence(std::io::Error::other(
                "injected task write failure",
            )));
        }
        self.remaining -= 1;
        self.inner.put_task(task)
    }

    fn soft_delete_task(&mut self, id: TaskId, deleted_at: DateTime<Utc>) -> StoreResult<()> {
        self.inner.soft_delete_task(id, deleted_at)
    }
}

#[async_trait]
impl LifecycleStore for FaultyStore {
    async fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreWriter) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let remaining = self.task_writes_allowed.load(Ordering::SeqCst);
        self.inner
            .transaction(move |tx| {
                let mut faulty = FaultyWriter {
                    inner: tx,
                    remaining,
                };
                operation(&mut faulty)
            })
            .await
    }

    async fn read<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn StoreReader) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.read(operation).await
    }
}
