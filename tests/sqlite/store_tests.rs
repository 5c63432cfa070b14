//! Durability and integrity tests for the `SQLite` store.

use super::helpers::{SqliteContext, date, sqlite};
use chrono::TimeDelta;
use eyre::{OptionExt, ensure};
use kanban_engine::lifecycle::{
    domain::{NewTask, PerformancePeriod, PeriodId, Task, TaskId, TaskStatus, TaskTitle},
    ports::{LifecycleStore, StoreError, TaskFilter},
    services::CreateTaskRequest,
};
use mockable::Clock;
use rstest::rstest;
use std::sync::Arc;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn periods_and_tasks_survive_reopening_the_file(sqlite: SqliteContext) -> eyre::Result<()> {
    let engine = sqlite.engine();
    let task = engine
        .create_task(
            CreateTaskRequest::new("Persist me")
                .with_description("written to disk")
                .with_resource("alice")
                .with_category("storage")
                .with_status(TaskStatus::Todo),
        )
        .await?;
    sqlite.clock.advance(TimeDelta::hours(2));
    let moved = engine.move_task(task.id(), TaskStatus::InProgress).await?;
    let period = engine.current_period().await?;
    drop(engine);

    let reopened = sqlite.reopen();
    let task_id = task.id();
    let (periods, found) = reopened
        .read(move |view| Ok((view.list_periods()?, view.find_task(task_id)?)))
        .await?;

    ensure!(periods == vec![period]);
    ensure!(found.as_ref() == Some(&moved));
    let restored = found.ok_or_eyre("task should be stored")?;
    ensure!(restored.transition_log().len() == 2);
    ensure!(restored.status() == restored.transition_log().last().status);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_current_period_is_rejected(sqlite: SqliteContext) -> eyre::Result<()> {
    let first = PerformancePeriod::open(date(2025, 1, 1), sqlite.clock.as_ref());
    let second = PerformancePeriod::open(date(2025, 2, 1), sqlite.clock.as_ref());
    let (first_id, second_id) = (first.id(), second.id());

    let result = sqlite
        .store
        .transaction(move |tx| {
            tx.put_period(&first)?;
            tx.put_period(&second)
        })
        .await;

    ensure!(matches!(
        result,
        Err(StoreError::MultipleCurrentPeriods { existing, attempted })
            if existing == first_id && attempted == second_id
    ));
    ensure!(sqlite.store.read(|view| view.list_periods()).await?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn task_in_unknown_period_is_rejected(sqlite: SqliteContext) -> eyre::Result<()> {
    let orphan = Task::create(
        NewTask::new(TaskTitle::new("Orphan")?),
        PeriodId::new(),
        sqlite.clock.as_ref(),
    );
    let (task_id, period_id) = (orphan.id(), orphan.period_id());

    let result = sqlite.store.transaction(move |tx| tx.put_task(&orphan)).await;

    ensure!(matches!(
        result,
        Err(StoreError::DanglingPeriod { task_id: task, period_id: period })
            if task == task_id && period == period_id
    ));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn soft_deleting_unknown_task_is_not_found(sqlite: SqliteContext) {
    let missing = TaskId::new();
    let deleted_at = sqlite.clock.utc();

    let result = sqlite
        .store
        .transaction(move |tx| tx.soft_delete_task(missing, deleted_at))
        .await;

    assert!(matches!(result, Err(StoreError::TaskNotFound(id)) if id == missing));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_transaction_leaves_no_trace(sqlite: SqliteContext) -> eyre::Result<()> {
    let period = PerformancePeriod::open(date(2025, 1, 1), sqlite.clock.as_ref());

    let result: Result<(), StoreError> = sqlite
        .store
        .transaction(move |tx| {
            tx.put_period(&period)?;
            Err(StoreError::persistence(std::io::Error::other(
                "abort after write",
            )))
        })
        .await;

    ensure!(matches!(result, Err(StoreError::Persistence(_))));
    ensure!(sqlite.store.read(|view| view.current_period()).await?.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn soft_deleted_tasks_are_filtered_from_live_queries(
    sqlite: SqliteContext,
) -> eyre::Result<()> {
    let engine = sqlite.engine();
    let kept = engine.create_task(CreateTaskRequest::new("Keep")).await?;
    sqlite.clock.advance(TimeDelta::minutes(1));
    let dropped = engine.create_task(CreateTaskRequest::new("Drop")).await?;
    sqlite.clock.advance(TimeDelta::minutes(1));
    engine.delete_task(dropped.id()).await?;

    let store = Arc::clone(&sqlite.store);
    let period_id = kept.period_id();
    let (live, all) = store
        .read(move |view| {
            Ok((
                view.query_tasks(period_id, TaskFilter::Live)?,
                view.query_tasks(period_id, TaskFilter::IncludeTombstoned)?,
            ))
        })
        .await?;

    ensure!(live == vec![kept]);
    ensure!(all.len() == 2);
    let tombstoned = all.last().ok_or_eyre("deleted task")?;
    ensure!(tombstoned.id() == dropped.id());
    ensure!(tombstoned.deleted_at() == Some(sqlite.clock.utc()));
    Ok(())
}
