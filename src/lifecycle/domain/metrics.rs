//! Derived statistics over task histories.
//!
//! Everything here is a pure function of periods, tasks and a reference
//! instant. Results are recomputed from the transition logs on every call.

use super::{PerformancePeriod, PeriodId, ResourceName, Task, TaskStatus};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Time a task spent in flight before its first completion.
///
/// Measured from the first non-`Unassigned` entry to the first `Completed`
/// entry. Returns `None` for tasks that were never completed.
#[must_use]
pub fn cycle_time(task: &Task) -> Option<TimeDelta> {
    let log = task.transition_log();
    let completed_at = log.first_completion()?;
    let started_at = log.first_in_flight()?;
    Some(completed_at.signed_duration_since(started_at))
}

/// Number of tasks whose first completion falls inside the period window.
#[must_use]
pub fn throughput(period: &PerformancePeriod, tasks: &[Task], now: DateTime<Utc>) -> u32 {
    saturating_count(completions_within(period, tasks, now).count())
}

/// Metrics for one resource within one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceMetrics {
    /// Assignee, or `None` for the unassigned bucket.
    pub resource: Option<ResourceName>,
    /// Live tasks attached to the period that are not completed.
    pub active_tasks: u32,
    /// Live tasks attached to the period whose latest status is completed.
    pub completed_tasks: u32,
    /// Share of the period's active tasks held by this resource.
    pub utilization_ratio: f64,
    /// First completions by this resource inside the period window.
    pub throughput: u32,
    /// Mean cycle time of those completions.
    #[serde(serialize_with = "serialize_seconds")]
    pub cycle_time_avg: Option<TimeDelta>,
}

/// Metrics for one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodMetrics {
    /// Period identifier.
    pub period_id: PeriodId,
    /// First day of the period.
    pub start: NaiveDate,
    /// Last day of the period, if closed.
    pub end: Option<NaiveDate>,
    /// Whether the period is current.
    pub is_current: bool,
    /// First completions inside the period window.
    pub throughput: u32,
    /// Mean cycle time of those completions.
    #[serde(serialize_with = "serialize_seconds")]
    pub cycle_time_avg: Option<TimeDelta>,
    /// Live, not completed tasks attached to the period.
    pub active_tasks: u32,
    /// Live tasks attached to the period whose latest status is completed.
    pub completed_tasks: u32,
    /// Per-resource breakdown ordered by resource, unassigned first.
    pub resources: Vec<ResourceMetrics>,
}

#[derive(Debug, Default)]
struct ResourceTally {
    active: u32,
    completed: u32,
    throughput: u32,
    cycle_times: Vec<TimeDelta>,
}

/// Computes the metrics of `period` from the full task set.
///
/// Utilization uses live tasks attached to the period, classified by their
/// latest status. Throughput and cycle time use every task, tombstoned ones
/// included, whose first completion lies inside the period window, so a task
/// that was rolled over before completing still counts where it finished.
#[must_use]
pub fn period_metrics(
    period: &PerformancePeriod,
    tasks: &[Task],
    now: DateTime<Utc>,
) -> PeriodMetrics {
    let mut tallies: BTreeMap<Option<ResourceName>, ResourceTally> = BTreeMap::new();

    for task in tasks
        .iter()
        .filter(|task| task.period_id() == period.id() && !task.is_tombstoned())
    {
        let tally = tallies.entry(task.resource().cloned()).or_default();
        if task.status() == TaskStatus::Completed {
            tally.completed = tally.completed.saturating_add(1);
        } else {
            tally.active = tally.active.saturating_add(1);
        }
    }

    let mut period_cycle_times = Vec::new();
    for task in completions_within(period, tasks, now) {
        let tally = tallies.entry(task.resource().cloned()).or_default();
        tally.throughput = tally.throughput.saturating_add(1);
        if let Some(elapsed) = cycle_time(task) {
            tally.cycle_times.push(elapsed);
            period_cycle_times.push(elapsed);
        }
    }

    let active_tasks = tallies
        .values()
        .fold(0_u32, |sum, tally| sum.saturating_add(tally.active));
    let completed_tasks = tallies
        .values()
        .fold(0_u32, |sum, tally| sum.saturating_add(tally.completed));
    let throughput = tallies
        .values()
        .fold(0_u32, |sum, tally| sum.saturating_add(tally.throughput));

    let resources = tallies
        .into_iter()
        .map(|(resource, tally)| ResourceMetrics {
            resource,
            active_tasks: tally.active,
            completed_tasks: tally.completed,
            utilization_ratio: load_share(tally.active, active_tasks),
            throughput: tally.throughput,
            cycle_time_avg: mean_duration(&tally.cycle_times),
        })
        .collect();

    PeriodMetrics {
        period_id: period.id(),
        start: period.start(),
        end: period.end(),
        is_current: period.is_current(),
        throughput,
        cycle_time_avg: mean_duration(&period_cycle_times),
        active_tasks,
        completed_tasks,
        resources,
    }
}

/// Metrics for a set of periods, in period start order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Reference instant used for open periods.
    pub generated_at: DateTime<Utc>,
    /// Per-period results.
    pub periods: Vec<PeriodMetrics>,
}

/// Flat export row for one resource in one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRow {
    /// Period identifier.
    pub period_id: PeriodId,
    /// First day of the period.
    pub period_start: NaiveDate,
    /// Last day of the period, if closed.
    pub period_end: Option<NaiveDate>,
    /// Assignee, or `None` for the unassigned bucket.
    pub resource: Option<String>,
    /// Mean cycle time in whole seconds.
    pub cycle_time_avg: Option<i64>,
    /// First completions inside the period window.
    pub throughput: u32,
    /// Load-share ratio of active tasks.
    pub utilization_ratio: f64,
    /// Active task count.
    pub active_tasks: u32,
    /// Completed task count.
    pub completed_tasks: u32,
}

impl MetricsSnapshot {
    /// Builds a snapshot for `periods`, sorting them by start date.
    #[must_use]
    pub fn compute(
        periods: &[PerformancePeriod],
        tasks: &[Task],
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut ordered: Vec<&PerformancePeriod> = periods.iter().collect();
        ordered.sort_by_key(|period| (period.start(), period.created_at()));
        Self {
            generated_at,
            periods: ordered
                .into_iter()
                .map(|period| period_metrics(period, tasks, generated_at))
                .collect(),
        }
    }

    /// Returns the metrics of a single period, if present.
    #[must_use]
    pub fn period(&self, period_id: PeriodId) -> Option<&PeriodMetrics> {
        self.periods
            .iter()
            .find(|metrics| metrics.period_id == period_id)
    }

    /// Flattens the snapshot into one row per period and resource.
    #[must_use]
    pub fn rows(&self) -> Vec<MetricsRow> {
        self.periods
            .iter()
            .flat_map(|period| {
                period.resources.iter().map(move |resource| MetricsRow {
                    period_id: period.period_id,
                    period_start: period.start,
                    period_end: period.end,
                    resource: resource.resource.as_ref().map(|name| name.as_str().to_owned()),
                    cycle_time_avg: resource.cycle_time_avg.map(|delta| delta.num_seconds()),
                    throughput: resource.throughput,
                    utilization_ratio: resource.utilization_ratio,
                    active_tasks: resource.active_tasks,
                    completed_tasks: resource.completed_tasks,
                })
            })
            .collect()
    }

    /// Returns the rows as metric-name to value maps for tabular export.
    #[must_use]
    pub fn to_records(&self) -> Vec<BTreeMap<String, Value>> {
        self.rows()
            .into_iter()
            .map(|row| {
                BTreeMap::from([
                    ("period_id".to_owned(), Value::from(row.period_id.to_string())),
                    (
                        "period_start".to_owned(),
                        Value::from(row.period_start.to_string()),
                    ),
                    (
                        "period_end".to_owned(),
                        row.period_end
                            .map_or(Value::Null, |end| Value::from(end.to_string())),
                    ),
                    (
                        "resource".to_owned(),
                        row.resource.map_or(Value::Null, Value::from),
                    ),
                    (
                        "cycle_time_avg".to_owned(),
                        row.cycle_time_avg.map_or(Value::Null, Value::from),
                    ),
                    ("throughput".to_owned(), Value::from(row.throughput)),
                    (
                        "utilization_ratio".to_owned(),
                        Value::from(row.utilization_ratio),
                    ),
                    ("active_tasks".to_owned(), Value::from(row.active_tasks)),
                    (
                        "completed_tasks".to_owned(),
                        Value::from(row.completed_tasks),
                    ),
                ])
            })
            .collect()
    }

    /// Serializes the snapshot as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn completions_within<'a>(
    period: &PerformancePeriod,
    tasks: &'a [Task],
    now: DateTime<Utc>,
) -> impl Iterator<Item = &'a Task> {
    let window = period.window(now);
    tasks.iter().filter(move |task| {
        task.transition_log()
            .first_completion()
            .is_some_and(|completed_at| window.contains(completed_at))
    })
}

fn saturating_count(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[expect(
    clippy::float_arithmetic,
    reason = "utilization is reported as a load-share ratio"
)]
fn load_share(part: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(part) / f64::from(total)
}

fn mean_duration(samples: &[TimeDelta]) -> Option<TimeDelta> {
    let count = i32::try_from(samples.len()).ok().filter(|count| *count > 0)?;
    let total = samples
        .iter()
        .try_fold(TimeDelta::zero(), |sum, sample| sum.checked_add(sample))?;
    Some(total / count)
}

#[expect(
    clippy::ref_option,
    reason = "serde's serialize_with passes the field by reference"
)]
fn serialize_seconds<S: Serializer>(value: &Option<TimeDelta>, serializer: S) -> Result<S::Ok, S::Error> {
    value.map(|delta| delta.num_seconds()).serialize(serializer)
}
