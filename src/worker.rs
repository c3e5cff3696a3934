use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

use crate::config::ScheduleConfig;
use crate::queue::SharedQueue;

/// Start the periodic triggers: batch processing, cleanup and status reports.
/// Runs until `shutdown` flips to true.
pub fn spawn(
    queue: SharedQueue,
    schedule: ScheduleConfig,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(queue, schedule, shutdown))
}

async fn run(queue: SharedQueue, schedule: ScheduleConfig, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(
        "Scheduler started (process every {}s, cleanup every {}s)",
        schedule.process_interval.as_secs(),
        schedule.cleanup_interval.as_secs()
    );

    let mut process = interval(schedule.process_interval);
    let mut cleanup = interval(schedule.cleanup_interval);
    let mut statuses = schedule.status_interval.map(interval);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = process.tick() => process_tick(&queue).await,
            _ = cleanup.tick() => cleanup_tick(&queue).await,
            _ = tick_optional(statuses.as_mut()) => statuses_tick(&queue).await,
            _ = shutdown.changed() => {}
        }
    }

    tracing::info!("Scheduler stopped");
}

fn interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick_optional(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn process_tick(queue: &SharedQueue) {
    match queue.process_next_batch().await {
        Ok(Some(summary)) if summary.selected > 0 => {
            tracing::info!(
                "Batch done: {} selected, {} succeeded, {} skipped, {} failed, {} notified, {} notify failures{}",
                summary.selected,
                summary.succeeded,
                summary.skipped,
                summary.failed,
                summary.notified,
                summary.notify_failed,
                if summary.halted { " (halted)" } else { "" }
            );
        }
        Ok(_) => {}
        Err(e) => tracing::error!("Batch processing error: {e}"),
    }
}

async fn cleanup_tick(queue: &SharedQueue) {
    if let Err(e) = queue.cleanup().await {
        tracing::error!("Cleanup error: {e}");
    }
}

async fn statuses_tick(queue: &SharedQueue) {
    if let Err(e) = queue.statuses_check().await {
        tracing::error!("Status check error: {e}");
    }
}
