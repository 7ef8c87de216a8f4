//! Rep performance counters.
//!
//! The server refreshes these on a timer; this runs the same refresh once,
//! e.g. from a cron job when the timer is disabled.

use cellionyx_crm::services::PerformanceService;

use super::{CommandError, connect};

/// Recompute every rep's prospect and conversion counts.
pub async fn refresh() -> Result<(), CommandError> {
    let store = connect().await?;

    let summary = PerformanceService::new(&store)
        .refresh_all()
        .await
        .map_err(|e| CommandError::Crm(e.to_string()))?;

    tracing::info!("Performance refreshed for {} reps", summary.reps_updated);
    Ok(())
}
