use thiserror::Error;

/// Failures while bringing up the process: pools, listeners, the artifact
/// directory and the tracing subscriber.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("database {stage} failed: {source}")]
    Database {
        stage: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("tracing subscriber could not be installed: {0}")]
    Telemetry(String),
    #[error("misconfigured: {0}")]
    Configuration(String),
}

impl InfraError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn database(stage: &'static str, source: sqlx::Error) -> Self {
        Self::Database { stage, source }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
