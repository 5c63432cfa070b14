//! Command-line front end for the lifecycle engine.
//!
//! Usage:
//!
//! ```text
//! kanban [--config <path>] [--db <path>] <command>
//! ```
//!
//! Commands operate on the `SQLite` store named in the configuration and
//! print JSON to standard output. Logs go to standard error.
//!
//! ```text
//! kanban task create "Write release notes" --resource alice --status todo
//! kanban task move 2b1d...e4 in_progress
//! kanban period close --end 2025-01-31
//! kanban metrics --all --output metrics.json
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use kanban_engine::{
    config::{ConfigError, EngineConfig},
    lifecycle::{
        adapters::sqlite::SqliteLifecycleStore,
        domain::{PeriodId, TaskId, TaskStatus},
        ports::StoreError,
        services::{CreateTaskRequest, EngineError, LifecycleEngine, MetricsScope},
    },
    telemetry::{self, TelemetryError},
};
use mockable::DefaultClock;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;
use uuid::Uuid;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Engine = LifecycleEngine<SqliteLifecycleStore, DefaultClock>;

#[derive(Debug, Parser)]
#[command(name = "kanban", version, about = "Track tasks across performance periods")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Database file, overriding the configuration.
    #[arg(long, global = true)]
    db: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inspect or close performance periods.
    #[command(subcommand)]
    Period(PeriodCommand),
    /// Create and move tasks.
    #[command(subcommand)]
    Task(TaskCommand),
    /// Compute metrics.
    Metrics(MetricsArgs),
}

#[derive(Debug, Subcommand)]
enum PeriodCommand {
    /// Show the current period, opening one if none exists.
    Current {
        /// Start date for a newly opened period.
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Close the current period and roll unfinished tasks forward.
    Close {
        /// Last day of the closing period.
        #[arg(long)]
        end: NaiveDate,
    },
    /// List every period.
    List,
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    /// Create a task in the current period.
    Create(CreateArgs),
    /// Move a task to another status.
    Move {
        /// Task identifier.
        id: Uuid,
        /// Target status.
        status: TaskStatus,
    },
    /// Reopen a completed task.
    Reopen {
        /// Task identifier.
        id: Uuid,
    },
    /// Set or clear a task's assignee.
    Assign {
        /// Task identifier.
        id: Uuid,
        /// New assignee; omit to clear.
        resource: Option<String>,
    },
    /// Set or clear a task's category.
    Classify {
        /// Task identifier.
        id: Uuid,
        /// New category; omit to clear.
        category: Option<String>,
    },
    /// Soft-delete a task.
    Delete {
        /// Task identifier.
        id: Uuid,
    },
    /// List live tasks in a period.
    List {
        /// Period identifier; defaults to the current period.
        #[arg(long)]
        period: Option<Uuid>,
    },
}

#[derive(Debug, Args)]
struct CreateArgs {
    /// Task title.
    title: String,
    /// Free-text description.
    #[arg(long)]
    description: Option<String>,
    /// Assignee.
    #[arg(long)]
    resource: Option<String>,
    /// Classification tag.
    #[arg(long)]
    category: Option<String>,
    /// Initial status.
    #[arg(long, default_value = "unassigned")]
    status: TaskStatus,
}

#[derive(Debug, Args)]
struct MetricsArgs {
    /// Period identifier; defaults to the current period.
    #[arg(long, conflicts_with = "all")]
    period: Option<Uuid>,
    /// Include every period.
    #[arg(long)]
    all: bool,
    /// Write flat metric records to this file instead of standard output.
    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

impl MetricsArgs {
    const fn scope(&self) -> MetricsScope {
        match (self.period, self.all) {
            (Some(id), _) => MetricsScope::Period(PeriodId::from_uuid(id)),
            (None, true) => MetricsScope::All,
            (None, false) => MetricsScope::Current,
        }
    }
}

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to write '{path}': {source}")]
    Output {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to standard output: {0}")]
    Stdout(#[source] io::Error),

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    run(cli).map_err(Into::into)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref(), cli.db)?;
    telemetry::init(&config.logging)?;

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(async {
        let store = SqliteLifecycleStore::open(&config.store)?;
        let engine = LifecycleEngine::new(Arc::new(store), Arc::new(DefaultClock));
        dispatch(&engine, cli.command).await
    })
}

fn load_config(
    path: Option<&Utf8Path>,
    db_override: Option<Utf8PathBuf>,
) -> Result<EngineConfig, ConfigError> {
    let mut config = match path {
        Some(file) => EngineConfig::load(file)?,
        None => EngineConfig::default(),
    };
    if let Some(db) = db_override {
        config.store.path = db;
    }
    Ok(config)
}

async fn dispatch(engine: &Engine, command: Command) -> Result<(), CliError> {
    match command {
        Command::Period(period) => run_period(engine, period).await,
        Command::Task(task) => run_task(engine, task).await,
        Command::Metrics(args) => run_metrics(engine, &args).await,
    }
}

async fn run_period(engine: &Engine, command: PeriodCommand) -> Result<(), CliError> {
    match command {
        PeriodCommand::Current { today } => {
            let period = match today {
                Some(date) => engine.current_period_from(date).await?,
                None => engine.current_period().await?,
            };
            emit(&period)
        }
        PeriodCommand::Close { end } => emit(&engine.close_period(end).await?),
        PeriodCommand::List => emit(&engine.periods().await?),
    }
}

async fn run_task(engine: &Engine, command: TaskCommand) -> Result<(), CliError> {
    let task = match command {
        TaskCommand::Create(args) => engine.create_task(create_request(args)).await?,
        TaskCommand::Move { id, status } => {
            engine.move_task(TaskId::from_uuid(id), status).await?
        }
        TaskCommand::Reopen { id } => engine.reopen_task(TaskId::from_uuid(id)).await?,
        TaskCommand::Assign { id, resource } => {
            engine.reassign_task(TaskId::from_uuid(id), resource).await?
        }
        TaskCommand::Classify { id, category } => {
            engine
                .reclassify_task(TaskId::from_uuid(id), category)
                .await?
        }
        TaskCommand::Delete { id } => engine.delete_task(TaskId::from_uuid(id)).await?,
        TaskCommand::List { period } => {
            let period_id = match period {
                Some(id) => PeriodId::from_uuid(id),
                None => engine.current_period().await?.id(),
            };
            return emit(&engine.tasks_in_period(period_id).await?);
        }
    };
    emit(&task)
}

async fn run_metrics(engine: &Engine, args: &MetricsArgs) -> Result<(), CliError> {
    let snapshot = engine.metrics_for(args.scope()).await?;
    match &args.output {
        Some(path) => {
            let body = serde_json::to_vec_pretty(&snapshot.to_records())?;
            write_file(path, &body)?;
            tracing::info!(%path, rows = snapshot.rows().len(), "wrote metrics");
            Ok(())
        }
        None => emit(&snapshot),
    }
}

fn create_request(args: CreateArgs) -> CreateTaskRequest {
    let CreateArgs {
        title,
        description,
        resource,
        category,
        status,
    } = args;
    let mut request = CreateTaskRequest::new(title).with_status(status);
    if let Some(text) = description {
        request = request.with_description(text);
    }
    if let Some(name) = resource {
        request = request.with_resource(name);
    }
    if let Some(tag) = category {
        request = request.with_category(tag);
    }
    request
}

fn emit<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let body = serde_json::to_string_pretty(value)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{body}").map_err(CliError::Stdout)
}

fn write_file(path: &Utf8Path, body: &[u8]) -> Result<(), CliError> {
    let output_error = |source| CliError::Output {
        path: path.to_owned(),
        source,
    };
    let file_name = path.file_name().ok_or_else(|| {
        output_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path must include a file name",
        ))
    })?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(output_error)?;
    dir.write(file_name, body).map_err(output_error)
}
