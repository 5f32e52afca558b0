use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::Telemetry(err.to_string()))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "docket_render_fast_path_total",
            Unit::Count,
            "Total number of documents returned inline within the deadline."
        );
        describe_counter!(
            "docket_render_deferred_total",
            Unit::Count,
            "Total number of renders handed to a background delivery job."
        );
        describe_counter!(
            "docket_render_failed_total",
            Unit::Count,
            "Total number of renders that failed before the deadline."
        );
        describe_histogram!(
            "docket_render_wait_ms",
            Unit::Milliseconds,
            "Time a request spent waiting on its render in milliseconds."
        );
        describe_counter!(
            "docket_artifacts_saved_total",
            Unit::Count,
            "Total number of artifacts written by delivery jobs."
        );
        describe_counter!(
            "docket_downloads_served_total",
            Unit::Count,
            "Total number of artifacts handed out through a download link."
        );
        describe_counter!(
            "docket_downloads_gone_total",
            Unit::Count,
            "Total number of download attempts for used, expired or unknown links."
        );
        describe_counter!(
            "docket_janitor_reclaimed_total",
            Unit::Count,
            "Total number of expired artifacts deleted by the janitor."
        );
        describe_counter!(
            "docket_janitor_failures_total",
            Unit::Count,
            "Total number of artifacts the janitor failed to delete."
        );
    });
}
