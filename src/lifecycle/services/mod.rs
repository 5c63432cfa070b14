//! Application services orchestrating lifecycle use-cases.

mod engine;
mod metrics;
mod period;
mod task;

pub use engine::{
    EngineError, EngineResult, ErrorKind, LifecycleEngine, Operation, join_metrics,
};
pub use metrics::{MetricsAggregator, MetricsError, MetricsScope};
pub use period::{ClosedPeriodSummary, PeriodError, PeriodManager, PeriodResult};
pub use task::{CreateTaskRequest, TaskLifecycleError, TaskLifecycleResult, TaskLifecycleService};
