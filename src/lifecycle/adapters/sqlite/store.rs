//! `SQLite` store implementation for lifecycle persistence.

use super::{
    models::{PeriodRow, TaskRow},
    schema::{periods, tasks},
};
use crate::config::StoreConfig;
use crate::lifecycle::{
    domain::{
        PerformancePeriod, PeriodId, PersistedPeriodData, PersistedTaskData, ProjectCategory,
        ResourceName, Task, TaskId, TaskStatus, TaskTitle, TransitionLog,
    },
    ports::{LifecycleStore, StoreError, StoreReader, StoreResult, StoreWriter, TaskFilter},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

/// Connection pool type used by the `SQLite` adapter.
pub type LifecycleSqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const CREATE_SCHEMA_SQL: &str =
    include_str!("../../../../migrations/2025-01-01-000000_create_lifecycle_tables/up.sql");

/// `SQLite`-backed lifecycle store.
#[derive(Debug, Clone)]
pub struct SqliteLifecycleStore {
    pool: LifecycleSqlitePool,
}

#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout_ms: u32,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, connection: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        connection
            .batch_execute(&format!(
                concat!(
                    "PRAGMA busy_timeout = {};",
                    "PRAGMA foreign_keys = ON;",
                    "PRAGMA journal_mode = WAL;",
                    "PRAGMA synchronous = NORMAL;",
                ),
                self.busy_timeout_ms
            ))
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Failure inside a Diesel transaction closure.
enum TxFailure<E> {
    Operation(E),
    Database(diesel::result::Error),
}

impl<E> From<diesel::result::Error> for TxFailure<E> {
    fn from(err: diesel::result::Error) -> Self {
        Self::Database(err)
    }
}

impl<E: From<StoreError>> TxFailure<E> {
    fn into_error(self) -> E {
        match self {
            Self::Operation(err) => err,
            Self::Database(err) => E::from(StoreError::persistence(err)),
        }
    }
}

impl SqliteLifecycleStore {
    /// Creates a store from an existing pool whose schema is initialized.
    #[must_use]
    pub const fn new(pool: LifecycleSqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database described by `config` and
    /// applies the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the pool cannot be built or
    /// the schema cannot be applied.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(config.path.as_str());
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_customizer(Box::new(ConnectionPragmas {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)
            .map_err(StoreError::persistence)?;

        let mut connection = pool.get().map_err(StoreError::persistence)?;
        connection
            .batch_execute(CREATE_SCHEMA_SQL)
            .map_err(StoreError::persistence)?;
        tracing::debug!(path = %config.path, "sqlite lifecycle store opened");
        Ok(Self::new(pool))
    }

    async fn run_blocking<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool
                .get()
                .map_err(|err| E::from(StoreError::persistence(err)))?;
            f(&mut connection)
        })
        .await
        .map_err(|err| E::from(StoreError::persistence(err)))?
    }
}

#[async_trait]
impl LifecycleStore for SqliteLifecycleStore {
    async fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreWriter) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        self.run_blocking(move |connection| {
            connection
                .immediate_transaction(|conn| {
                    let mut writer = SqliteSession { connection: conn };
                    operation(&mut writer).map_err(TxFailure::Operation)
                })
                .map_err(TxFailure::into_error)
        })
        .await
    }

    async fn read<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn StoreReader) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_blocking(move |connection| {
            connection
                .transaction(|conn| {
                    let mut reader = SqliteSession { connection: conn };
                    operation(&mut reader).map_err(TxFailure::Operation)
                })
                .map_err(TxFailure::into_error)
        })
        .await
    }
}

/// Reader and writer bound to a connection inside an open transaction.
struct SqliteSession<'c> {
    connection: &'c mut SqliteConnection,
}

impl StoreReader for SqliteSession<'_> {
    fn find_period(&mut self, id: PeriodId) -> StoreResult<Option<PerformancePeriod>> {
        let row = periods::table
            .filter(periods::id.eq(id.to_string()))
            .select(PeriodRow::as_select())
            .first::<PeriodRow>(self.connection)
            .optional()
            .map_err(StoreError::persistence)?;
        row.map(row_to_period).transpose()
    }

    fn current_period(&mut self) -> StoreResult<Option<PerformancePeriod>> {
        let row = periods::table
            .filter(periods::is_current.eq(true))
            .select(PeriodRow::as_select())
            .first::<PeriodRow>(self.connection)
            .optional()
            .map_err(StoreError::persistence)?;
        row.map(row_to_period).transpose()
    }

    fn list_periods(&mut self) -> StoreResult<Vec<PerformancePeriod>> {
        periods::table
            .order((periods::start_date.asc(), periods::created_at.asc()))
            .select(PeriodRow::as_select())
            .load::<PeriodRow>(self.connection)
            .map_err(StoreError::persistence)?
            .into_iter()
            .map(row_to_period)
            .collect()
    }

    fn find_task(&mut self, id: TaskId) -> StoreResult<Option<Task>> {
        let row = tasks::table
            .filter(tasks::id.eq(id.to_string()))
            .select(TaskRow::as_select())
            .first::<TaskRow>(self.connection)
            .optional()
            .map_err(StoreError::persistence)?;
        row.map(row_to_task).transpose()
    }

    fn query_tasks(&mut self, period_id: PeriodId, filter: TaskFilter) -> StoreResult<Vec<Task>> {
        let rows = tasks::table
            .filter(tasks::period_id.eq(period_id.to_string()))
            .order((tasks::created_at.asc(), tasks::id.asc()))
            .select(TaskRow::as_select())
            .load::<TaskRow>(self.connection)
            .map_err(StoreError::persistence)?;

        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            let task = row_to_task(row)?;
            if filter.admits(&task) {
                found.push(task);
            }
        }
        Ok(found)
    }

    fn all_tasks(&mut self) -> StoreResult<Vec<Task>> {
        tasks::table
            .order((tasks::created_at.asc(), tasks::id.asc()))
            .select(TaskRow::as_select())
            .load::<TaskRow>(self.connection)
            .map_err(StoreError::persistence)?
            .into_iter()
            .map(row_to_task)
            .collect()
    }
}

impl StoreWriter for SqliteSession<'_> {
    fn put_period(&mut self, period: &PerformancePeriod) -> StoreResult<()> {
        let row = period_to_row(period);

        if row.is_current {
            // Semantic pre-check; the partial unique index still guards the
            // table.
            let existing = periods::table
                .filter(periods::is_current.eq(true))
                .filter(periods::id.ne(&row.id))
                .select(periods::id)
                .first::<String>(self.connection)
                .optional()
                .map_err(StoreError::persistence)?;
            if let Some(existing_id) = existing {
                return Err(StoreError::MultipleCurrentPeriods {
                    existing: parse_period_id(&existing_id)?,
                    attempted: period.id(),
                });
            }
        }

        let exists = diesel::select(diesel::dsl::exists(
            periods::table.filter(periods::id.eq(&row.id)),
        ))
        .get_result::<bool>(self.connection)
        .map_err(StoreError::persistence)?;

        if exists {
            diesel::update(periods::table.filter(periods::id.eq(&row.id)))
                .set((
                    periods::start_date.eq(row.start_date),
                    periods::end_date.eq(row.end_date),
                    periods::is_current.eq(row.is_current),
                ))
                .execute(self.connection)
                .map_err(StoreError::persistence)?;
        } else {
            diesel::insert_into(periods::table)
                .values(&row)
                .execute(self.connection)
                .map_err(StoreError::persistence)?;
        }
        Ok(())
    }

    fn put_task(&mut self, task: &Task) -> StoreResult<()> {
        let row = task_to_row(task)?;

        let period_exists = diesel::select(diesel::dsl::exists(
            periods::table.filter(periods::id.eq(&row.period_id)),
        ))
        .get_result::<bool>(self.connection)
        .map_err(StoreError::persistence)?;
        if !period_exists {
            return Err(StoreError::DanglingPeriod {
                task_id: task.id(),
                period_id: task.period_id(),
            });
        }

        let exists = diesel::select(diesel::dsl::exists(
            tasks::table.filter(tasks::id.eq(&row.id)),
        ))
        .get_result::<bool>(self.connection)
        .map_err(StoreError::persistence)?;

        if exists {
            diesel::update(tasks::table.filter(tasks::id.eq(&row.id)))
                .set((
                    tasks::title.eq(&row.title),
                    tasks::description.eq(&row.description),
                    tasks::resource.eq(&row.resource),
                    tasks::category.eq(&row.category),
                    tasks::status.eq(&row.status),
                    tasks::period_id.eq(&row.period_id),
                    tasks::transition_log.eq(&row.transition_log),
                    tasks::updated_at.eq(&row.updated_at),
                    tasks::deleted_at.eq(&row.deleted_at),
                ))
                .execute(self.connection)
                .map_err(StoreError::persistence)?;
        } else {
            diesel::insert_into(tasks::table)
                .values(&row)
                .execute(self.connection)
                .map_err(StoreError::persistence)?;
        }
        Ok(())
    }

    fn soft_delete_task(&mut self, id: TaskId, deleted_at: DateTime<Utc>) -> StoreResult<()> {
        let stamp = format_timestamp(deleted_at);
        let updated = diesel::update(tasks::table.filter(tasks::id.eq(id.to_string())))
            .set((
                tasks::deleted_at.eq(Some(&stamp)),
                tasks::updated_at.eq(&stamp),
            ))
            .execute(self.connection)
            .map_err(StoreError::persistence)?;
        if updated == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        Ok(())
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(StoreError::persistence)
}

fn parse_uuid(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(StoreError::persistence)
}

fn parse_period_id(raw: &str) -> StoreResult<PeriodId> {
    parse_uuid(raw).map(PeriodId::from_uuid)
}

fn period_to_row(period: &PerformancePeriod) -> PeriodRow {
    PeriodRow {
        id: period.id().to_string(),
        start_date: period.start(),
        end_date: period.end(),
        is_current: period.is_current(),
        created_at: format_timestamp(period.created_at()),
    }
}

fn row_to_period(row: PeriodRow) -> StoreResult<PerformancePeriod> {
    Ok(PerformancePeriod::from_persisted(PersistedPeriodData {
        id: parse_period_id(&row.id)?,
        start: row.start_date,
        end: row.end_date,
        is_current: row.is_current,
        created_at: parse_timestamp(&row.created_at)?,
    }))
}

fn task_to_row(task: &Task) -> StoreResult<TaskRow> {
    let transition_log =
        serde_json::to_string(task.transition_log()).map_err(StoreError::persistence)?;
    Ok(TaskRow {
        id: task.id().to_string(),
        title: task.title().as_str().to_owned(),
        description: task.description().map(ToOwned::to_owned),
        resource: task.resource().map(|resource| resource.as_str().to_owned()),
        category: task.category().map(|category| category.as_str().to_owned()),
        status: task.status().as_str().to_owned(),
        period_id: task.period_id().to_string(),
        transition_log,
        created_at: format_timestamp(task.created_at()),
        updated_at: format_timestamp(task.updated_at()),
        deleted_at: task.deleted_at().map(format_timestamp),
    })
}

fn row_to_task(row: TaskRow) -> StoreResult<Task> {
    let TaskRow {
        id,
        title,
        description,
        resource,
        category,
        status,
        period_id,
        transition_log,
        created_at,
        updated_at,
        deleted_at,
    } = row;

    let log = serde_json::from_str::<TransitionLog>(&transition_log)
        .map_err(StoreError::persistence)?;
    let stored_status = TaskStatus::try_from(status.as_str()).map_err(StoreError::persistence)?;
    if log.last().status != stored_status {
        return Err(StoreError::persistence(std::io::Error::other(format!(
            "task {id} status column '{stored_status}' disagrees with its transition log"
        ))));
    }

    let data = PersistedTaskData {
        id: TaskId::from_uuid(parse_uuid(&id)?),
        title: TaskTitle::new(title).map_err(StoreError::persistence)?,
        description,
        resource: resource
            .map(ResourceName::new)
            .transpose()
            .map_err(StoreError::persistence)?,
        category: category
            .map(ProjectCategory::new)
            .transpose()
            .map_err(StoreError::persistence)?,
        period_id: parse_period_id(&period_id)?,
        transition_log: log,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
    };
    Ok(Task::from_persisted(data))
}
