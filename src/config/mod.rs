//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides, SweepArgs};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use apalis_cron::Schedule;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "docket";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_HTTP_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_JOBS_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_SYNC_DEADLINE_MS: u64 = 1000;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_DOWNLOAD_PATH: &str = "/downloads";
const DEFAULT_LINK_EXPIRY_MINUTES: u64 = 15;
const DEFAULT_HANDOFF_GRACE_SECS: u64 = 300;
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
const DEFAULT_ARTIFACTS_TTL_MINUTES: u64 = 15;
const DEFAULT_JANITOR_SCHEDULE: &str = "0 */5 * * * *";
const DEFAULT_JOB_DELIVERY_CONCURRENCY: u32 = 2;
const DEFAULT_JOB_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_NOTIFIER_TIMEOUT_SECS: u64 = 10;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub documents: DocumentSettings,
    pub artifacts: ArtifactSettings,
    pub janitor: JanitorSettings,
    pub jobs: JobsSettings,
    pub notifier: NotifierSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub http_max_connections: NonZeroU32,
    pub jobs_max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct DocumentSettings {
    /// How long a request waits for its render before deferring it.
    pub sync_deadline: Duration,
    pub public_base_url: Url,
    /// Route prefix for download links, always `/`-prefixed without a trailing slash.
    pub download_path: String,
    pub link_expiry_minutes: NonZeroU64,
    pub handoff_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub directory: PathBuf,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct JanitorSettings {
    pub schedule: Schedule,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub delivery_concurrency: NonZeroU32,
    pub max_attempts: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Without a webhook, notifications are only logged.
    pub webhook_url: Option<Url>,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl Settings {
    /// Combinations that are valid but probably not what the operator meant.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let link_expiry = Duration::from_secs(self.documents.link_expiry_minutes.get() * 60);
        if self.artifacts.ttl < link_expiry {
            warnings.push(format!(
                "artifacts.ttl_minutes ({}) is shorter than documents.link_expiry_minutes ({}); \
                 links will stop working before the advertised expiry",
                self.artifacts.ttl.as_secs() / 60,
                self.documents.link_expiry_minutes
            ));
        }
        warnings
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("DOCKET").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Sweep(args)) => raw.apply_sweep_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    documents: RawDocumentSettings,
    artifacts: RawArtifactSettings,
    janitor: RawJanitorSettings,
    jobs: RawJobsSettings,
    notifier: RawNotifierSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_http_max_connections {
            self.database.http_max_connections = Some(max);
        }
        if let Some(max) = overrides.database_jobs_max_connections {
            self.database.jobs_max_connections = Some(max);
        }
        if let Some(millis) = overrides.documents_sync_deadline_ms {
            self.documents.sync_deadline_ms = Some(millis);
        }
        if let Some(url) = overrides.documents_public_base_url.as_ref() {
            self.documents.public_base_url = Some(url.clone());
        }
        if let Some(minutes) = overrides.documents_link_expiry_minutes {
            self.documents.link_expiry_minutes = Some(minutes);
        }
        if let Some(directory) = overrides.artifacts_directory.as_ref() {
            self.artifacts.directory = Some(directory.clone());
        }
        if let Some(minutes) = overrides.artifacts_ttl_minutes {
            self.artifacts.ttl_minutes = Some(minutes);
        }
        if let Some(schedule) = overrides.janitor_schedule.as_ref() {
            self.janitor.schedule = Some(schedule.clone());
        }
        if let Some(value) = overrides.jobs_delivery_concurrency {
            self.jobs.delivery_concurrency = Some(value);
        }
        if let Some(url) = overrides.notifier_webhook_url.as_ref() {
            self.notifier.webhook_url = Some(url.clone());
        }
    }

    fn apply_sweep_overrides(&mut self, overrides: &SweepArgs) {
        if let Some(directory) = overrides.artifacts_directory.as_ref() {
            self.artifacts.directory = Some(directory.clone());
        }
        if let Some(minutes) = overrides.ttl_minutes {
            self.artifacts.ttl_minutes = Some(minutes);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            documents,
            artifacts,
            janitor,
            jobs,
            notifier,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            documents: build_document_settings(documents)?,
            artifacts: build_artifact_settings(artifacts)?,
            janitor: build_janitor_settings(janitor)?,
            jobs: build_jobs_settings(jobs)?,
            notifier: build_notifier_settings(notifier)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.host", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let http_value = database
        .http_max_connections
        .unwrap_or(DEFAULT_DB_HTTP_MAX_CONNECTIONS);
    let jobs_value = database
        .jobs_max_connections
        .unwrap_or(DEFAULT_DB_JOBS_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        http_max_connections: non_zero_u32(http_value.into(), "database.http_max_connections")?,
        jobs_max_connections: non_zero_u32(jobs_value.into(), "database.jobs_max_connections")?,
    })
}

fn build_document_settings(documents: RawDocumentSettings) -> Result<DocumentSettings, LoadError> {
    let deadline_ms = documents
        .sync_deadline_ms
        .unwrap_or(DEFAULT_SYNC_DEADLINE_MS);
    if deadline_ms == 0 {
        return Err(LoadError::invalid(
            "documents.sync_deadline_ms",
            "must be greater than zero",
        ));
    }

    let base_url = documents
        .public_base_url
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
    let public_base_url = Url::parse(base_url.trim())
        .map_err(|err| LoadError::invalid("documents.public_base_url", err.to_string()))?;
    if !matches!(public_base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "documents.public_base_url",
            "scheme must be http or https",
        ));
    }

    let download_path = normalize_route_prefix(
        documents
            .download_path
            .as_deref()
            .unwrap_or(DEFAULT_DOWNLOAD_PATH),
    )
    .map_err(|reason| LoadError::invalid("documents.download_path", reason))?;

    let link_expiry_minutes = NonZeroU64::new(
        documents
            .link_expiry_minutes
            .unwrap_or(DEFAULT_LINK_EXPIRY_MINUTES),
    )
    .ok_or_else(|| LoadError::invalid("documents.link_expiry_minutes", "must be greater than zero"))?;

    let handoff_grace = Duration::from_secs(
        documents
            .handoff_grace_seconds
            .unwrap_or(DEFAULT_HANDOFF_GRACE_SECS),
    );

    Ok(DocumentSettings {
        sync_deadline: Duration::from_millis(deadline_ms),
        public_base_url,
        download_path,
        link_expiry_minutes,
        handoff_grace,
    })
}

fn build_artifact_settings(artifacts: RawArtifactSettings) -> Result<ArtifactSettings, LoadError> {
    let directory = artifacts
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "artifacts.directory",
            "path must not be empty",
        ));
    }

    let ttl_minutes = artifacts
        .ttl_minutes
        .unwrap_or(DEFAULT_ARTIFACTS_TTL_MINUTES);
    if ttl_minutes == 0 {
        return Err(LoadError::invalid(
            "artifacts.ttl_minutes",
            "must be greater than zero",
        ));
    }
    let ttl_secs = ttl_minutes
        .checked_mul(60)
        .ok_or_else(|| LoadError::invalid("artifacts.ttl_minutes", "value is too large"))?;

    Ok(ArtifactSettings {
        directory,
        ttl: Duration::from_secs(ttl_secs),
    })
}

fn build_janitor_settings(janitor: RawJanitorSettings) -> Result<JanitorSettings, LoadError> {
    let expression = janitor
        .schedule
        .unwrap_or_else(|| DEFAULT_JANITOR_SCHEDULE.to_string());
    let schedule = Schedule::from_str(expression.trim())
        .map_err(|err| LoadError::invalid("janitor.schedule", err.to_string()))?;

    Ok(JanitorSettings { schedule })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let delivery = jobs
        .delivery_concurrency
        .unwrap_or(DEFAULT_JOB_DELIVERY_CONCURRENCY);
    let attempts = jobs.max_attempts.unwrap_or(DEFAULT_JOB_MAX_ATTEMPTS);

    let max_attempts = non_zero_u32(attempts.into(), "jobs.max_attempts")?;
    i32::try_from(max_attempts.get())
        .map_err(|_| LoadError::invalid("jobs.max_attempts", "value exceeds supported range"))?;

    Ok(JobsSettings {
        delivery_concurrency: non_zero_u32(delivery.into(), "jobs.delivery_concurrency")?,
        max_attempts,
    })
}

fn build_notifier_settings(notifier: RawNotifierSettings) -> Result<NotifierSettings, LoadError> {
    let webhook_url = match notifier.webhook_url {
        Some(value) if !value.trim().is_empty() => Some(
            Url::parse(value.trim())
                .map_err(|err| LoadError::invalid("notifier.webhook_url", err.to_string()))?,
        ),
        _ => None,
    };

    let timeout_secs = notifier
        .timeout_seconds
        .unwrap_or(DEFAULT_NOTIFIER_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "notifier.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(NotifierSettings {
        webhook_url,
        timeout: Duration::from_secs(timeout_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    http_max_connections: Option<u32>,
    jobs_max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDocumentSettings {
    sync_deadline_ms: Option<u64>,
    public_base_url: Option<String>,
    download_path: Option<String>,
    link_expiry_minutes: Option<u64>,
    handoff_grace_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    directory: Option<PathBuf>,
    ttl_minutes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJanitorSettings {
    schedule: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    delivery_concurrency: Option<u32>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNotifierSettings {
    webhook_url: Option<String>,
    timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// First path segments already taken by the public router.
const RESERVED_ROUTE_ROOTS: [&str; 2] = ["documents", "_health"];

fn normalize_route_prefix(value: &str) -> Result<String, String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("must not be the root path".to_string());
    }
    let Some(segments) = trimmed.strip_prefix('/') else {
        return Err("must start with `/`".to_string());
    };
    if trimmed.contains(['{', '}', '*', '?', '#']) {
        return Err("must be a literal path".to_string());
    }
    if segments.split('/').any(str::is_empty) {
        return Err("must not contain empty segments".to_string());
    }
    let root = segments.split('/').next().unwrap_or_default();
    if RESERVED_ROUTE_ROOTS.contains(&root) {
        return Err(format!("`/{root}` is reserved by the public router"));
    }
    Ok(trimmed.to_string())
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
