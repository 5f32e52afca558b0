#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use docket::{
    application::{
        dispatch::RenderDispatcher,
        documents::DocumentService,
        downloads::{DownloadLinks, DownloadService},
        jobs::DeliveryWorkerContext,
        notify::{DeliveryMessage, Notifier, NotifyError},
        render::{DocumentRenderer, InFlightRenders, RenderError, RenderedDocument},
        repos::{JobsRepo, NewJobRecord, RepoError},
    },
    domain::content::ContentId,
    infra::{
        artifacts::ArtifactStore,
        db::PostgresRepositories,
        http::{HttpState, build_router},
    },
};
use sqlx::postgres::PgPoolOptions;
use tempfile::TempDir;
use url::Url;

pub const DOWNLOAD_PATH: &str = "/downloads";
pub const BASE_URL: &str = "https://docs.example.com";

/// Renderer that sleeps for a fixed time and counts how often it actually ran.
pub struct FakeRenderer {
    delay: Duration,
    missing: Option<ContentId>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            missing: None,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn missing(content_id: ContentId) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            missing: Some(content_id),
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            missing: None,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn body_for(content_id: ContentId) -> String {
    format!("<html><body>document {content_id}</body></html>")
}

#[async_trait]
impl DocumentRenderer for FakeRenderer {
    async fn render(&self, content_id: ContentId) -> Result<RenderedDocument, RenderError> {
        tokio::time::sleep(self.delay).await;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing == Some(content_id) {
            return Err(RenderError::ContentNotFound(content_id));
        }
        if self.fail {
            return Err(RenderError::Markdown("renderer crashed".to_string()));
        }
        Ok(RenderedDocument::html(
            format!("Quarterly Report {content_id}"),
            body_for(content_id),
        ))
    }
}

/// Queue that records every job instead of persisting it.
#[derive(Default)]
pub struct RecordingJobs {
    jobs: Mutex<Vec<NewJobRecord>>,
    fail: bool,
}

impl RecordingJobs {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn jobs(&self) -> Vec<NewJobRecord> {
        self.jobs.lock().expect("jobs lock").clone()
    }
}

#[async_trait]
impl JobsRepo for RecordingJobs {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        if self.fail {
            return Err(RepoError::from_persistence("queue unavailable"));
        }
        let mut jobs = self.jobs.lock().expect("jobs lock");
        jobs.push(job);
        Ok(format!("job-{}", jobs.len()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<DeliveryMessage>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn messages(&self) -> Vec<DeliveryMessage> {
        self.messages.lock().expect("messages lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &DeliveryMessage) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .expect("messages lock")
            .push(message.clone());
        if self.fail {
            return Err(NotifyError::Rejected { status: 502 });
        }
        Ok(())
    }
}

/// Everything a test needs to drive the router and play the worker's part.
pub struct Harness {
    pub router: Router,
    pub store: Arc<ArtifactStore>,
    pub renderer: Arc<FakeRenderer>,
    pub jobs: Arc<RecordingJobs>,
    pub notifier: Arc<RecordingNotifier>,
    pub worker: DeliveryWorkerContext,
    _dir: TempDir,
}

pub struct HarnessBuilder {
    renderer: Arc<FakeRenderer>,
    jobs: Arc<RecordingJobs>,
    notifier: Arc<RecordingNotifier>,
    deadline: Duration,
}

impl HarnessBuilder {
    pub fn new(renderer: Arc<FakeRenderer>, deadline: Duration) -> Self {
        Self {
            renderer,
            jobs: Arc::new(RecordingJobs::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            deadline,
        }
    }

    pub fn jobs(mut self, jobs: Arc<RecordingJobs>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn notifier(mut self, notifier: Arc<RecordingNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> Harness {
        let dir = TempDir::new().expect("temp dir");
        let store = Arc::new(ArtifactStore::new(dir.path().join("artifacts")).expect("store"));
        let in_flight = InFlightRenders::new();

        let renderer: Arc<dyn DocumentRenderer> = self.renderer.clone();
        let jobs: Arc<dyn JobsRepo> = self.jobs.clone();
        let dispatcher =
            RenderDispatcher::new(renderer.clone(), in_flight.clone(), Duration::from_secs(60));
        let documents = Arc::new(DocumentService::new(dispatcher, jobs, self.deadline, 5));
        let downloads = Arc::new(DownloadService::new(store.clone()));

        let base = Url::parse(BASE_URL).expect("base url");
        let worker = DeliveryWorkerContext {
            renderer,
            in_flight,
            store: store.clone(),
            notifier: self.notifier.clone(),
            links: DownloadLinks::new(&base, DOWNLOAD_PATH),
            link_expiry_minutes: 15,
        };

        let state = HttpState {
            documents,
            downloads,
            db: Arc::new(PostgresRepositories::new(unreachable_pool())),
        };

        Harness {
            router: build_router(state, DOWNLOAD_PATH),
            store,
            renderer: self.renderer,
            jobs: self.jobs,
            notifier: self.notifier,
            worker,
            _dir: dir,
        }
    }
}

/// Pool that is never connected; the flows under test do not touch Postgres.
fn unreachable_pool() -> sqlx::PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy("postgres://docket@127.0.0.1:1/docket")
        .expect("lazy pool")
}
