mod context;
mod deliver;
mod janitor;
mod queue;

pub use context::{DeliveryWorkerContext, job_failed};
pub use deliver::{
    DeliverDocumentJobPayload, DeliveryError, DeliveryReceipt, deliver_document,
    enqueue_deliver_document_job, process_deliver_document_job,
};
pub use janitor::{
    ArtifactSweepJob, JanitorContext, process_artifact_sweep_job, run_artifact_sweep,
};
pub use queue::enqueue_job;
