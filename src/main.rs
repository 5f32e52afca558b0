use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use docket::{
    application::{
        dispatch::RenderDispatcher,
        documents::DocumentService,
        downloads::{DownloadLinks, DownloadService},
        error::AppError,
        jobs::{
            DeliveryWorkerContext, JanitorContext, process_artifact_sweep_job,
            process_deliver_document_job, run_artifact_sweep,
        },
        notify::Notifier,
        render::{DocumentRenderer, InFlightRenders, MarkdownDocumentRenderer},
        repos::{ContentSource, JobsRepo},
    },
    config,
    domain::types::JobType,
    infra::{
        artifacts::ArtifactStore,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        notify::{LogNotifier, WebhookNotifier},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    for warning in settings.warnings() {
        warn!(target = "docket::config", "{warning}");
    }

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Sweep(_) => run_sweep(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (http_repositories, job_repositories) = init_repositories(&settings).await?;
    let store = open_artifact_store(&settings)?;
    let app = build_application_context(http_repositories, job_repositories, store, &settings)?;

    let mut monitor_handle =
        spawn_job_monitor(app.job_repositories, app.delivery, app.janitor, &settings);

    let result = serve_http(&settings, app.http_state).await;
    if result.is_err() {
        monitor_handle.abort();
        let _ = monitor_handle.await;
        return result;
    }

    if tokio::time::timeout(settings.server.graceful_shutdown, &mut monitor_handle)
        .await
        .is_err()
    {
        warn!(
            target = "docket::serve",
            "job monitor did not stop within the shutdown budget"
        );
        monitor_handle.abort();
    }

    result
}

async fn run_sweep(settings: config::Settings) -> Result<(), AppError> {
    let store = open_artifact_store(&settings)?;
    let ctx = JanitorContext {
        store,
        ttl: settings.artifacts.ttl,
    };

    let report = run_artifact_sweep(&ctx).await;
    info!(
        target = "docket::sweep",
        removed = report.removed,
        failed = report.failed,
        skipped = report.skipped,
        root = %ctx.store.root().display(),
        "Sweep completed"
    );
    Ok(())
}

struct ApplicationContext {
    http_state: HttpState,
    job_repositories: Arc<PostgresRepositories>,
    delivery: DeliveryWorkerContext,
    janitor: JanitorContext,
}

fn open_artifact_store(settings: &config::Settings) -> Result<Arc<ArtifactStore>, AppError> {
    ArtifactStore::new(settings.artifacts.directory.clone())
        .map(Arc::new)
        .map_err(|err| AppError::from(InfraError::io("artifact directory unavailable", err)))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let http_pool =
        PostgresRepositories::connect(database_url, settings.database.http_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database("connect", err)))?;

    PostgresRepositories::run_migrations(&http_pool)
        .await
        .map_err(|err| AppError::from(InfraError::database("migration", err)))?;

    let jobs_pool =
        PostgresRepositories::connect(database_url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database("connect", err)))?;

    Ok((
        Arc::new(PostgresRepositories::new(http_pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}

fn build_notifier(settings: &config::NotifierSettings) -> Result<Arc<dyn Notifier>, AppError> {
    match settings.webhook_url.clone() {
        Some(url) => {
            info!(target = "docket::serve", endpoint = %url, "Using webhook notifier");
            let notifier = WebhookNotifier::new(url, settings.timeout)
                .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;
            Ok(Arc::new(notifier))
        }
        None => {
            info!(
                target = "docket::serve",
                "No notifier webhook configured; deliveries are only logged"
            );
            Ok(Arc::new(LogNotifier))
        }
    }
}

fn build_application_context(
    http_repositories: Arc<PostgresRepositories>,
    job_repositories: Arc<PostgresRepositories>,
    store: Arc<ArtifactStore>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let http_content: Arc<dyn ContentSource> = http_repositories.clone();
    let job_content: Arc<dyn ContentSource> = job_repositories.clone();
    let jobs_repo: Arc<dyn JobsRepo> = http_repositories.clone();

    let http_renderer: Arc<dyn DocumentRenderer> =
        Arc::new(MarkdownDocumentRenderer::new(http_content));
    let job_renderer: Arc<dyn DocumentRenderer> =
        Arc::new(MarkdownDocumentRenderer::new(job_content));

    // Shared by the request path and the delivery worker so a deferred render
    // can be adopted instead of repeated.
    let in_flight = InFlightRenders::new();

    let max_attempts = i32::try_from(settings.jobs.max_attempts.get())
        .map_err(|_| AppError::validation("jobs.max_attempts exceeds supported range"))?;
    let dispatcher = RenderDispatcher::new(
        http_renderer,
        in_flight.clone(),
        settings.documents.handoff_grace,
    );
    let documents = Arc::new(DocumentService::new(
        dispatcher,
        jobs_repo,
        settings.documents.sync_deadline,
        max_attempts,
    ));
    let downloads = Arc::new(DownloadService::new(store.clone()));

    let links = DownloadLinks::new(
        &settings.documents.public_base_url,
        &settings.documents.download_path,
    );
    let delivery = DeliveryWorkerContext {
        renderer: job_renderer,
        in_flight,
        store: store.clone(),
        notifier: build_notifier(&settings.notifier)?,
        links,
        link_expiry_minutes: settings.documents.link_expiry_minutes.get(),
    };
    let janitor = JanitorContext {
        store,
        ttl: settings.artifacts.ttl,
    };

    let http_state = HttpState {
        documents,
        downloads,
        db: http_repositories,
    };

    Ok(ApplicationContext {
        http_state,
        job_repositories,
        delivery,
        janitor,
    })
}

fn spawn_job_monitor(
    repositories: Arc<PostgresRepositories>,
    delivery: DeliveryWorkerContext,
    janitor: JanitorContext,
    settings: &config::Settings,
) -> tokio::task::JoinHandle<()> {
    let delivery_storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::DeliverDocument.as_str()),
    );

    let delivery_concurrency = settings.jobs.delivery_concurrency.get() as usize;

    let delivery_worker = WorkerBuilder::new("deliver-document-worker")
        .concurrency(delivery_concurrency)
        .data(delivery)
        .backend(delivery_storage)
        .build_fn(process_deliver_document_job);

    let janitor_worker = WorkerBuilder::new("artifact-janitor-worker")
        .data(janitor)
        .backend(CronStream::new(settings.janitor.schedule.clone()))
        .build_fn(process_artifact_sweep_job);

    let monitor = Monitor::new()
        .register(delivery_worker)
        .register(janitor_worker)
        .shutdown_timeout(settings.server.graceful_shutdown);

    tokio::spawn(async move {
        if let Err(err) = monitor.run_with_signal(tokio::signal::ctrl_c()).await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, http_state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(http_state, &settings.documents.download_path);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::io("listener could not bind", err)))?;

    info!(
        target = "docket::serve",
        addr = %settings.server.addr,
        deadline_ms = settings.documents.sync_deadline.as_millis() as u64,
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "docket::serve", "Shutdown signal received");
}
