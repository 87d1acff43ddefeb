//! Scheduled embedding backfill for `memoria serve`.
//!
//! Registers one cron job that drives the reconciler to completion. A tick
//! that lands while a run is still active is skipped.

use tokio_cron_scheduler::{Job, JobScheduler};

use memoria_types::config::BackfillConfig;
use memoria_types::error::MemoryError;

use crate::state::AppState;

/// Start the backfill scheduler if `[backfill].enabled`.
///
/// Returns the running scheduler so the caller can shut it down.
pub async fn start_backfill_scheduler(
    state: &AppState,
    config: &BackfillConfig,
) -> anyhow::Result<Option<JobScheduler>> {
    if !config.enabled {
        tracing::info!("scheduled embedding backfill disabled");
        return Ok(None);
    }

    let scheduler = JobScheduler::new().await?;
    let service = state.memory_service.clone();

    let job = Job::new_async(config.schedule.as_str(), move |_uuid, _lock| {
        let service = service.clone();
        Box::pin(async move {
            tracing::debug!("backfill trigger fired");
            match service.backfill_all(None).await {
                Ok(report) if report.processed > 0 => tracing::info!(
                    processed = report.processed,
                    updated = report.updated,
                    failed = report.failed,
                    "scheduled backfill finished"
                ),
                Ok(_) => {}
                Err(MemoryError::ReconcileInProgress) => {
                    tracing::debug!("backfill already running, skipping tick")
                }
                Err(e) => tracing::warn!(error = %e, "scheduled backfill failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(schedule = %config.schedule, "scheduled embedding backfill started");
    Ok(Some(scheduler))
}
