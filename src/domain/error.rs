use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("malformed artifact token: {reason}")]
    MalformedToken { reason: &'static str },
}
