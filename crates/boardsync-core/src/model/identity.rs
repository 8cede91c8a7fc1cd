use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A normalized user identity (an email-like handle).
///
/// Identities are trimmed and lowercased once, at construction, so every
/// comparison downstream is a plain equality check.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

/// Error returned when a raw identity string is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identity '{got}': {reason}")]
pub struct ParseIdentityError {
    pub got: String,
    pub reason: &'static str,
}

impl Identity {
    /// Normalize and validate a raw identity.
    ///
    /// # Errors
    ///
    /// Returns [`ParseIdentityError`] when the input is blank, or contains
    /// whitespace after trimming or a `:` (the direct-thread separator).
    pub fn parse(raw: &str) -> Result<Self, ParseIdentityError> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Err(ParseIdentityError {
                got: raw.to_string(),
                reason: "identity must not be blank",
            });
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(ParseIdentityError {
                got: raw.to_string(),
                reason: "identity must not contain whitespace",
            });
        }
        if normalized.contains(':') {
            return Err(ParseIdentityError {
                got: raw.to_string(),
                reason: "identity must not contain ':'",
            });
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = ParseIdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = ParseIdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
