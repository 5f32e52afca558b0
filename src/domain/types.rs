//! Shared domain enumerations persisted alongside queued jobs.

use serde::{Deserialize, Serialize};

/// Job families pushed onto the apalis queue. The string form doubles as the
/// apalis namespace the matching worker listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DeliverDocument,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::DeliverDocument => "deliver_document",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_matches_serialized_form() {
        let serialized = serde_json::to_value(JobType::DeliverDocument).expect("serialize");
        assert_eq!(serialized, JobType::DeliverDocument.as_str());
    }
}
