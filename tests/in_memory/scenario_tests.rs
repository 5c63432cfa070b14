//! End-to-end board scenarios through the engine facade.

use super::helpers::{Board, board, date};
use chrono::TimeDelta;
use eyre::{OptionExt, bail, ensure};
use kanban_engine::lifecycle::{
    domain::TaskStatus,
    services::{CreateTaskRequest, ErrorKind, MetricsScope},
};
use rstest::rstest;

#[expect(clippy::float_arithmetic, reason = "ratios are compared within a tolerance")]
fn ratio_eq(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completed_task_counts_toward_throughput_and_cycle_time(
    board: Board,
) -> eyre::Result<()> {
    let period = board.engine.current_period().await?;
    ensure!(period.start() == date(2025, 1, 1));
    let task = board
        .engine
        .create_task(CreateTaskRequest::new("Prepare quarterly review"))
        .await?;
    board.clock.advance(TimeDelta::hours(1));
    board.engine.move_task(task.id(), TaskStatus::Todo).await?;
    board.clock.advance(TimeDelta::hours(4));
    board.engine.move_task(task.id(), TaskStatus::InProgress).await?;
    board.clock.advance(TimeDelta::hours(19));
    let done = board
        .engine
        .move_task(task.id(), TaskStatus::Completed)
        .await?;

    let snapshot = board
        .engine
        .metrics_for(MetricsScope::Period(period.id()))
        .await?;
    let metrics = snapshot.period(period.id()).ok_or_eyre("period metrics")?;

    ensure!(done.transition_log().len() == 4);
    ensure!(metrics.throughput == 1);
    ensure!(metrics.cycle_time_avg == Some(TimeDelta::hours(23)));
    ensure!(metrics.completed_tasks == 1);
    ensure!(metrics.active_tasks == 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completing_twice_is_rejected_without_logging(board: Board) -> eyre::Result<()> {
    let task = board
        .engine
        .create_task(CreateTaskRequest::new("Fix flaky build").with_status(TaskStatus::InProgress))
        .await?;
    board.engine.move_task(task.id(), TaskStatus::Completed).await?;

    let Err(err) = board.engine.move_task(task.id(), TaskStatus::Completed).await else {
        bail!("second completion should fail");
    };

    ensure!(err.kind() == ErrorKind::InvalidState);
    ensure!(err.to_string().contains("already completed"));
    let stored = board.engine.find_task(task.id()).await?;
    ensure!(stored.transition_log().len() == 2);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn closing_january_rolls_open_work_into_february(board: Board) -> eyre::Result<()> {
    let january = board.engine.current_period().await?;
    let open_task = board
        .engine
        .create_task(CreateTaskRequest::new("Migrate billing").with_status(TaskStatus::InProgress))
        .await?;
    board.clock.set_date(date(2025, 1, 31));

    let summary = board.engine.close_period(date(2025, 1, 31)).await?;

    ensure!(summary.closed.id() == january.id());
    ensure!(summary.closed.end() == Some(date(2025, 1, 31)));
    ensure!(!summary.closed.is_current());
    ensure!(summary.successor.start() == date(2025, 2, 1));
    ensure!(summary.successor.is_current());
    ensure!(summary.rolled_over == vec![open_task.id()]);

    let moved = board.engine.find_task(open_task.id()).await?;
    ensure!(moved.period_id() == summary.successor.id());
    ensure!(moved.status() == TaskStatus::InProgress);
    ensure!(moved.transition_log() == open_task.transition_log());
    ensure!(board.engine.current_period().await?.id() == summary.successor.id());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reopen_after_close_keeps_past_throughput(board: Board) -> eyre::Result<()> {
    let january = board.engine.current_period().await?;
    let task = board
        .engine
        .create_task(CreateTaskRequest::new("Publish changelog").with_status(TaskStatus::Todo))
        .await?;
    board.clock.advance(TimeDelta::days(2));
    board.engine.move_task(task.id(), TaskStatus::Completed).await?;
    board.clock.set_date(date(2025, 1, 31));
    let february = board.engine.close_period(date(2025, 1, 31)).await?.successor;
    board.clock.set_date(date(2025, 2, 3));

    let reopened = board.engine.reopen_task(task.id()).await?;
    let snapshot = board.engine.metrics_for(MetricsScope::All).await?;

    ensure!(reopened.status() == TaskStatus::InProgress);
    ensure!(reopened.period_id() == february.id());
    let past = snapshot.period(january.id()).ok_or_eyre("january metrics")?;
    ensure!(past.throughput == 1);
    ensure!(past.cycle_time_avg == Some(TimeDelta::days(2)));
    ensure!(past.active_tasks == 0);
    ensure!(past.completed_tasks == 0);
    let current = snapshot.period(february.id()).ok_or_eyre("february metrics")?;
    ensure!(current.active_tasks == 1);
    ensure!(snapshot.periods.len() == 2);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reopened_task_is_carried_by_the_next_close(board: Board) -> eyre::Result<()> {
    let january = board.engine.current_period().await?;
    let task = board
        .engine
        .create_task(CreateTaskRequest::new("Fix invoice").with_status(TaskStatus::InProgress))
        .await?;
    board.clock.advance(TimeDelta::hours(4));
    board.engine.move_task(task.id(), TaskStatus::Completed).await?;
    board.clock.set_date(date(2025, 1, 31));
    let february = board.engine.close_period(date(2025, 1, 31)).await?.successor;
    board.clock.set_date(date(2025, 2, 10));
    board.engine.reopen_task(task.id()).await?;

    let visible = board.engine.tasks_in_period(february.id()).await?;
    ensure!(visible.iter().any(|entry| entry.id() == task.id()));
    ensure!(board.engine.tasks_in_period(january.id()).await?.is_empty());

    board.clock.set_date(date(2025, 2, 28));
    let march = board.engine.close_period(date(2025, 2, 28)).await?;

    ensure!(march.rolled_over == vec![task.id()]);
    let stored = board.engine.find_task(task.id()).await?;
    ensure!(stored.period_id() == march.successor.id());
    ensure!(stored.status() == TaskStatus::InProgress);
    ensure!(stored.transition_log().len() == 3);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn utilization_splits_active_load_per_resource(board: Board) -> eyre::Result<()> {
    for (title, resource) in [("One", "ana"), ("Two", "ana"), ("Three", "ben")] {
        board
            .engine
            .create_task(
                CreateTaskRequest::new(title)
                    .with_resource(resource)
                    .with_status(TaskStatus::Todo),
            )
            .await?;
    }
    board
        .engine
        .create_task(CreateTaskRequest::new("Backlog item"))
        .await?;

    let snapshot = board.engine.metrics_for(MetricsScope::Current).await?;
    let rows = snapshot.rows();

    ensure!(rows.len() == 3);
    let ana = rows
        .iter()
        .find(|row| row.resource.as_deref() == Some("ana"))
        .ok_or_eyre("ana row")?;
    ensure!(ana.active_tasks == 2);
    ensure!(ratio_eq(ana.utilization_ratio, 0.5));
    let unassigned = rows
        .iter()
        .find(|row| row.resource.is_none())
        .ok_or_eyre("unassigned row")?;
    ensure!(ratio_eq(unassigned.utilization_ratio, 0.25));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn spawned_metrics_match_inline_metrics(board: Board) -> eyre::Result<()> {
    board
        .engine
        .create_task(CreateTaskRequest::new("Background").with_status(TaskStatus::Completed))
        .await?;

    let handle = board.engine.spawn_metrics(MetricsScope::All);
    let background = kanban_engine::lifecycle::services::join_metrics(handle).await?;
    let inline = board.engine.metrics_for(MetricsScope::All).await?;

    ensure!(background.periods == inline.periods);
    Ok(())
}
