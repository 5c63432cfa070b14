//! Then steps for period rollover BDD scenarios.

use super::world::{RolloverWorld, parse_date, run_async};
use kanban_engine::lifecycle::{
    domain::{LifecycleDomainError, TaskStatus},
    services::{ClosedPeriodSummary, EngineError, ErrorKind, MetricsScope},
};
use rstest_bdd_macros::then;

fn closed_summary(world: &RolloverWorld) -> Result<&ClosedPeriodSummary, eyre::Report> {
    match world.last_close.as_ref() {
        Some(Ok(summary)) => Ok(summary),
        Some(Err(err)) => Err(eyre::eyre!("period close failed: {err}")),
        None => Err(eyre::eyre!("no period was closed in this scenario")),
    }
}

#[then(r#"the current period starts on "{date}""#)]
fn current_period_starts_on(world: &RolloverWorld, date: String) -> Result<(), eyre::Report> {
    let expected = parse_date(&date)?;
    let current = run_async(world.engine.current_period())?;
    if current.start() != expected {
        return Err(eyre::eyre!(
            "expected current period to start on {expected}, found {}",
            current.start()
        ));
    }
    Ok(())
}

#[then(r#"the task "{title}" belongs to the current period"#)]
fn task_in_current_period(world: &RolloverWorld, title: String) -> Result<(), eyre::Report> {
    let task_id = world.task(&title)?.id();
    let summary = closed_summary(world)?;
    let stored = run_async(world.engine.find_task(task_id))?;
    if stored.period_id() != summary.successor.id() {
        return Err(eyre::eyre!("task '{title}' was not rolled into the successor"));
    }
    if !summary.rolled_over.contains(&task_id) {
        return Err(eyre::eyre!("close summary does not list '{title}' as rolled over"));
    }
    Ok(())
}

#[then(r#"the task "{title}" stays in the closed period"#)]
fn task_in_closed_period(world: &RolloverWorld, title: String) -> Result<(), eyre::Report> {
    let task_id = world.task(&title)?.id();
    let summary = closed_summary(world)?;
    let stored = run_async(world.engine.find_task(task_id))?;
    if stored.period_id() != summary.closed.id() {
        return Err(eyre::eyre!("task '{title}' left the closed period"));
    }
    Ok(())
}

#[then("the closed period reports a throughput of {count:u64}")]
fn closed_period_throughput(world: &RolloverWorld, count: u64) -> Result<(), eyre::Report> {
    let closed_id = closed_summary(world)?.closed.id();
    let snapshot = run_async(world.engine.metrics_for(MetricsScope::Period(closed_id)))?;
    let metrics = snapshot
        .period(closed_id)
        .ok_or_else(|| eyre::eyre!("missing metrics for closed period"))?;
    if u64::from(metrics.throughput) != count {
        return Err(eyre::eyre!(
            "expected throughput {count}, found {}",
            metrics.throughput
        ));
    }
    Ok(())
}

#[then("the move fails because the task must be reopened")]
fn move_requires_reopen(world: &RolloverWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_move
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing move result"))?;

    if !matches!(
        result,
        Err(EngineError::InvalidState {
            source: LifecycleDomainError::ReopenRequired { .. },
            ..
        })
    ) {
        return Err(eyre::eyre!("expected ReopenRequired error, got {result:?}"));
    }
    Ok(())
}

#[then(r#"the task "{title}" has status "{status}""#)]
fn task_has_status(
    world: &RolloverWorld,
    title: String,
    status: String,
) -> Result<(), eyre::Report> {
    let expected = status
        .parse::<TaskStatus>()
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let task = world.task(&title)?;
    if task.status() != expected {
        return Err(eyre::eyre!(
            "expected status {expected}, found {}",
            task.status()
        ));
    }
    Ok(())
}

#[then("closing fails with an invalid state error")]
fn closing_fails_with_invalid_state(world: &RolloverWorld) -> Result<(), eyre::Report> {
    match world.last_close.as_ref() {
        Some(Err(err)) if err.kind() == ErrorKind::InvalidState => Ok(()),
        other => Err(eyre::eyre!("expected invalid state close error, got {other:?}")),
    }
}
