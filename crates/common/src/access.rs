//! Access class of repository files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access category of a file in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessClass {
    /// Publicly downloadable.
    Open,
    /// Access-restricted; requires an authorized token.
    Controlled,
}

impl AccessClass {
    /// Wire representation used by the index API.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessClass::Open => "open",
            AccessClass::Controlled => "controlled",
        }
    }
}

impl fmt::Display for AccessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown access class string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown access class: {0}")]
pub struct ParseAccessClassError(pub String);

impl FromStr for AccessClass {
    type Err = ParseAccessClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(AccessClass::Open),
            "controlled" => Ok(AccessClass::Controlled),
            other => Err(ParseAccessClassError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_access_class() {
        assert_eq!("open".parse::<AccessClass>(), Ok(AccessClass::Open));
        assert_eq!(" Controlled ".parse::<AccessClass>(), Ok(AccessClass::Controlled));
        assert!("public".parse::<AccessClass>().is_err());
    }

    #[test]
    fn test_access_class_serde_lowercase() {
        let json: String = serde_json::to_string(&AccessClass::Controlled).unwrap();
        assert_eq!(json, "\"controlled\"");
        let parsed: AccessClass = serde_json::from_str("\"open\"").unwrap();
        assert_eq!(parsed, AccessClass::Open);
    }
}
