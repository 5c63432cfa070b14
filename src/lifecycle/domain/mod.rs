//! Domain model for the period and task lifecycle.
//!
//! Periods, tasks, their transition history and the metrics derived from
//! that history live here, free of any storage or runtime concerns.

mod error;
mod ids;
pub mod metrics;
mod period;
mod status;
mod task;

pub use error::{LifecycleDomainError, ParseTaskStatusError};
pub use ids::{PeriodId, ProjectCategory, ResourceName, TaskId, TaskTitle};
pub use metrics::{MetricsRow, MetricsSnapshot, PeriodMetrics, ResourceMetrics};
pub use period::{PerformancePeriod, PeriodWindow, PersistedPeriodData};
pub use status::{TaskStatus, TransitionEntry, TransitionLog, TransitionLogError};
pub use task::{NewTask, PersistedTaskData, Task};
