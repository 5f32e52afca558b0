use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::{
    application::{
        downloads::DownloadLinks,
        notify::Notifier,
        render::{DocumentRenderer, InFlightRenders},
    },
    infra::artifacts::ArtifactStore,
};

/// Shared context passed to delivery workers so they can reach the renderer,
/// the artifact store and the notifier.
#[derive(Clone)]
pub struct DeliveryWorkerContext {
    pub renderer: Arc<dyn DocumentRenderer>,
    pub in_flight: InFlightRenders,
    pub store: Arc<ArtifactStore>,
    pub notifier: Arc<dyn Notifier>,
    pub links: DownloadLinks,
    pub link_expiry_minutes: u64,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
