//! Concurrent writers and snapshot readers sharing one engine.

use super::helpers::{Board, board, current_period_count};
use eyre::{OptionExt, ensure};
use kanban_engine::lifecycle::{
    domain::TaskStatus,
    services::{CreateTaskRequest, MetricsScope},
};
use rstest::rstest;
use tokio::task::JoinSet;

const WRITERS: usize = 16;

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_share_one_current_period(board: Board) -> eyre::Result<()> {
    let mut writers = JoinSet::new();
    for index in 0..WRITERS {
        let engine = board.engine.clone();
        writers.spawn(async move {
            engine
                .create_task(CreateTaskRequest::new(format!("Task {index}")))
                .await
        });
    }

    let mut period_ids = Vec::new();
    while let Some(joined) = writers.join_next().await {
        period_ids.push(joined??.period_id());
    }

    ensure!(period_ids.len() == WRITERS);
    let first = *period_ids.first().ok_or_eyre("at least one task")?;
    ensure!(period_ids.iter().all(|id| *id == first));
    ensure!(current_period_count(board.store.as_ref()).await == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn metrics_snapshots_never_see_partial_writes(board: Board) -> eyre::Result<()> {
    let period = board.engine.current_period().await?;
    let writer_engine = board.engine.clone();
    let writer = tokio::spawn(async move {
        for index in 0..WRITERS {
            let task = writer_engine
                .create_task(CreateTaskRequest::new(format!("Work {index}")))
                .await?;
            writer_engine
                .move_task(task.id(), TaskStatus::Completed)
                .await?;
        }
        Ok::<_, kanban_engine::lifecycle::services::EngineError>(())
    });

    let mut seen = 0_u32;
    while !writer.is_finished() {
        let snapshot = board
            .engine
            .metrics_for(MetricsScope::Period(period.id()))
            .await?;
        let metrics = snapshot.period(period.id()).ok_or_eyre("period metrics")?;
        let total = metrics.active_tasks + metrics.completed_tasks;
        ensure!(total >= seen, "task count went backwards");
        ensure!(metrics.throughput == metrics.completed_tasks);
        seen = total;
        tokio::task::yield_now().await;
    }
    writer.await??;

    let snapshot = board
        .engine
        .metrics_for(MetricsScope::Period(period.id()))
        .await?;
    let metrics = snapshot.period(period.id()).ok_or_eyre("period metrics")?;
    ensure!(metrics.completed_tasks == u32::try_from(WRITERS)?);
    ensure!(metrics.active_tasks == 0);
    Ok(())
}
