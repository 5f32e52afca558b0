use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the docket binary.
#[derive(Debug, Parser)]
#[command(
    name = "docket",
    version,
    about = "Bounded-wait document generation server"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "DOCKET_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service together with the delivery and janitor workers.
    Serve(Box<ServeArgs>),
    /// Run a single artifact sweep and exit.
    Sweep(SweepArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the HTTP database pool size.
    #[arg(long = "database-http-max-connections", value_name = "COUNT")]
    pub database_http_max_connections: Option<u32>,

    /// Override the jobs database pool size.
    #[arg(long = "database-jobs-max-connections", value_name = "COUNT")]
    pub database_jobs_max_connections: Option<u32>,

    /// Override how long a request waits for its document before deferring.
    #[arg(long = "documents-sync-deadline-ms", value_name = "MILLIS")]
    pub documents_sync_deadline_ms: Option<u64>,

    /// Override the base URL download links are built from.
    #[arg(long = "documents-public-base-url", value_name = "URL")]
    pub documents_public_base_url: Option<String>,

    /// Override the link expiry communicated to recipients.
    #[arg(long = "documents-link-expiry-minutes", value_name = "MINUTES")]
    pub documents_link_expiry_minutes: Option<u64>,

    /// Override the artifacts directory.
    #[arg(long = "artifacts-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub artifacts_directory: Option<PathBuf>,

    /// Override the age after which artifacts are swept.
    #[arg(long = "artifacts-ttl-minutes", value_name = "MINUTES")]
    pub artifacts_ttl_minutes: Option<u64>,

    /// Override the janitor cron schedule.
    #[arg(long = "janitor-schedule", value_name = "CRON")]
    pub janitor_schedule: Option<String>,

    /// Override the delivery worker concurrency.
    #[arg(long = "jobs-delivery-concurrency", value_name = "COUNT")]
    pub jobs_delivery_concurrency: Option<u32>,

    /// Override the notifier webhook endpoint.
    #[arg(long = "notifier-webhook-url", value_name = "URL")]
    pub notifier_webhook_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SweepArgs {
    /// Override the age after which artifacts are removed.
    #[arg(long = "ttl-minutes", value_name = "MINUTES")]
    pub ttl_minutes: Option<u64>,

    /// Override the artifacts directory to sweep.
    #[arg(long = "artifacts-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub artifacts_directory: Option<PathBuf>,
}
