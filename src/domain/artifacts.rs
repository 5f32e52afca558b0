//! Capability tokens naming stored artifacts.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

const TOKEN_LEN: usize = 32;

/// Opaque single-use credential for one stored artifact.
///
/// Always 32 lowercase hex characters (128 random bits). Tokens double as file
/// names inside the artifact store, so anything else is rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactToken(String);

impl ArtifactToken {
    /// Mint a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ArtifactToken {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let valid = value.len() == TOKEN_LEN
            && value
                .bytes()
                .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
        if !valid {
            return Err(DomainError::MalformedToken {
                reason: "expected 32 lowercase hex characters",
            });
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for ArtifactToken {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactToken> for String {
    fn from(token: ArtifactToken) -> Self {
        token.0
    }
}

impl fmt::Display for ArtifactToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_tokens_parse_back() {
        let token = ArtifactToken::generate();
        assert_eq!(token.as_str().len(), TOKEN_LEN);
        let parsed: ArtifactToken = token.as_str().parse().expect("valid token");
        assert_eq!(parsed, token);
    }

    #[test]
    fn generated_tokens_are_distinct() {
        let tokens: HashSet<_> = (0..512).map(|_| ArtifactToken::generate()).collect();
        assert_eq!(tokens.len(), 512);
    }

    #[test]
    fn rejects_paths_and_uppercase() {
        for candidate in [
            "",
            "../etc/passwd",
            "0123456789ABCDEF0123456789ABCDEF",
            "0123456789abcdef0123456789abcde",
            "0123456789abcdef0123456789abcdef.partial",
        ] {
            assert!(candidate.parse::<ArtifactToken>().is_err(), "{candidate}");
        }
    }

    #[test]
    fn malformed_tokens_report_the_expected_shape() {
        let err = "not-a-token".parse::<ArtifactToken>().expect_err("malformed");
        assert!(matches!(err, DomainError::MalformedToken { .. }));
        assert!(err.to_string().contains("32 lowercase hex"));
    }
}
