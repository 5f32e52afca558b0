//! Cron job reclaiming artifacts nobody downloaded in time.

use std::{sync::Arc, time::Duration};

use apalis::prelude::*;
use metrics::counter;

use crate::infra::artifacts::{ArtifactStore, SweepReport};

const METRIC_RECLAIMED: &str = "docket_janitor_reclaimed_total";
const METRIC_FAILURES: &str = "docket_janitor_failures_total";

/// Marker struct for the cron-triggered sweep.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct ArtifactSweepJob;

impl From<chrono::DateTime<chrono::Utc>> for ArtifactSweepJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

/// Context for the janitor worker. `ttl` is independent of the cron schedule.
#[derive(Clone)]
pub struct JanitorContext {
    pub store: Arc<ArtifactStore>,
    pub ttl: Duration,
}

/// Run one sweep, logging rather than propagating failures.
pub async fn run_artifact_sweep(ctx: &JanitorContext) -> SweepReport {
    match ctx.store.delete_if_older_than(ctx.ttl).await {
        Ok(report) => {
            if report.removed > 0 || report.failed > 0 {
                tracing::info!(
                    removed = report.removed,
                    failed = report.failed,
                    skipped = report.skipped,
                    ttl_secs = ctx.ttl.as_secs(),
                    "Swept expired artifacts"
                );
            }
            counter!(METRIC_RECLAIMED).increment(report.removed as u64);
            counter!(METRIC_FAILURES).increment(report.failed as u64);
            report
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                root = %ctx.store.root().display(),
                "Failed to sweep artifact store"
            );
            counter!(METRIC_FAILURES).increment(1);
            SweepReport::default()
        }
    }
}

/// Process a cron tick. Never fails, so a broken sweep cannot wedge the schedule.
pub async fn process_artifact_sweep_job(
    _job: ArtifactSweepJob,
    ctx: Data<JanitorContext>,
) -> Result<(), apalis::prelude::Error> {
    run_artifact_sweep(&ctx).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn sweep_keeps_fresh_artifacts() {
        let dir = TempDir::new().expect("temp dir");
        let store = Arc::new(ArtifactStore::new(dir.path().to_path_buf()).expect("store"));
        let token = store.save(b"fresh").await.expect("saved");

        let report = run_artifact_sweep(&JanitorContext {
            store: Arc::clone(&store),
            ttl: Duration::from_secs(600),
        })
        .await;
        assert_eq!(report.removed, 0);
        assert!(store.created_at(&token).await.expect("stat").is_some());

        let report = run_artifact_sweep(&JanitorContext {
            store: Arc::clone(&store),
            ttl: Duration::ZERO,
        })
        .await;
        assert_eq!(report.removed, 1);
    }
}
