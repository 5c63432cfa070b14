//! Shared world state for period rollover BDD scenarios.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, TimeDelta, Utc};
use kanban_engine::lifecycle::{
    adapters::memory::InMemoryLifecycleStore,
    domain::{PerformancePeriod, Task},
    services::{ClosedPeriodSummary, EngineError, LifecycleEngine},
};
use mockable::Clock;
use rstest::fixture;

/// Clock that starts at midday on the board's opening date and only moves
/// when a step advances it.
pub struct StepClock {
    now: Mutex<DateTime<Utc>>,
}

impl StepClock {
    const fn new() -> Self {
        Self {
            now: Mutex::new(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    /// Moves the clock to midday UTC on `date`.
    pub fn set_date(&self, date: NaiveDate) -> Result<(), eyre::Report> {
        let midday = date
            .and_hms_opt(12, 0, 0)
            .ok_or_else(|| eyre::eyre!("invalid midday for {date}"))?
            .and_utc();
        *self.lock()? = midday;
        Ok(())
    }

    /// Moves the clock forward by one hour.
    pub fn tick(&self) -> Result<(), eyre::Report> {
        *self.lock()? += TimeDelta::hours(1);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, DateTime<Utc>>, eyre::Report> {
        self.now
            .lock()
            .map_err(|_| eyre::eyre!("step clock lock poisoned"))
    }
}

impl Clock for StepClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |guard| *guard)
    }
}

/// Engine type used by the BDD world.
pub type TestEngine = LifecycleEngine<InMemoryLifecycleStore, StepClock>;

/// Scenario world for period rollover behaviour tests.
pub struct RolloverWorld {
    pub engine: TestEngine,
    pub clock: Arc<StepClock>,
    pub tasks: HashMap<String, Task>,
    pub opened_period: Option<PerformancePeriod>,
    pub last_close: Option<Result<ClosedPeriodSummary, EngineError>>,
    pub last_move: Option<Result<Task, EngineError>>,
}

impl RolloverWorld {
    /// Creates a world over an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        let clock = Arc::new(StepClock::new());
        let engine = LifecycleEngine::new(Arc::new(InMemoryLifecycleStore::new()), Arc::clone(&clock));

        Self {
            engine,
            clock,
            tasks: HashMap::new(),
            opened_period: None,
            last_close: None,
            last_move: None,
        }
    }

    /// Looks up a task created earlier in the scenario by title.
    pub fn task(&self, title: &str) -> Result<&Task, eyre::Report> {
        self.tasks
            .get(title)
            .ok_or_else(|| eyre::eyre!("no task titled '{title}' in scenario world"))
    }
}

impl Default for RolloverWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> RolloverWorld {
    RolloverWorld::default()
}

/// Parses an ISO calendar date from a step argument.
pub fn parse_date(raw: &str) -> Result<NaiveDate, eyre::Report> {
    raw.parse::<NaiveDate>()
        .map_err(|err| eyre::eyre!("invalid date '{raw}' in scenario: {err}"))
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
