//! Identifier wrappers for Atelier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when parsing an identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_uuid_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(value)
                    .map_err(|e| IdParseError::new(format!("Invalid {}: {}", $label, e)))?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_uuid_id!(JobId, "job ID");
define_uuid_id!(RequestId, "request ID");

/// User-facing resource identifier (projects, characters, scenes).
///
/// Accepts only `[a-zA-Z0-9-]`, 1..=50 chars. Everything else - SQL
/// metacharacters, path separators, whitespace - is rejected at parse time,
/// so a `ResourceId` is safe to interpolate into paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn parse(value: &str) -> Result<Self, IdParseError> {
        if !Self::is_valid(value) {
            return Err(IdParseError::new(format!(
                "Invalid resource ID: {:?}",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn is_valid(value: &str) -> bool {
        !value.is_empty()
            && value.len() <= 50
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ResourceId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_roundtrip() {
        let id = JobId::new();
        let parsed: JobId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_resource_id_accepts_plain_ids() {
        assert!(ResourceId::parse("tower-anime").is_ok());
        assert!(ResourceId::parse("proj1").is_ok());
    }

    #[test]
    fn test_resource_id_rejects_hostile_input() {
        assert!(ResourceId::parse("slug'; DROP TABLE x").is_err());
        assert!(ResourceId::parse("../etc/passwd").is_err());
        assert!(ResourceId::parse("").is_err());
        assert!(ResourceId::parse(&"a".repeat(51)).is_err());
    }
}
