//! Identifiers for graph documents and runs.
//!
//! Both wrap a ULID, so ids sort by creation time. They display with a short
//! type prefix (`doc_01H...`, `run_01H...`) and serialize as the bare ULID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when a string is not a valid id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The id type that was being parsed.
    pub id_type: &'static str,
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Parses `input` as a ULID, accepting an optional `{prefix}_` in front.
fn parse_prefixed(input: &str, prefix: &str, id_type: &'static str) -> Result<Ulid, ParseIdError> {
    let raw = input
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(input);
    Ulid::from_str(raw).map_err(|e| ParseIdError {
        id_type,
        reason: e.to_string(),
    })
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a fresh id.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            pub const PREFIX: &'static str = $prefix;
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_prefixed(s, Self::PREFIX, stringify!($name)).map(Self)
            }
        }
    };
}

define_id!(
    /// Identifies a stored graph document.
    DocumentId,
    "doc"
);

define_id!(
    /// Identifies one execution of a graph.
    RunId,
    "run"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_with_type_prefix() {
        assert!(DocumentId::new().to_string().starts_with("doc_"));
        assert!(RunId::new().to_string().starts_with("run_"));
    }

    #[test]
    fn parses_displayed_and_bare_forms() {
        let id = RunId::new();
        assert_eq!(id.to_string().parse::<RunId>(), Ok(id));

        let bare = id.to_string().trim_start_matches("run_").to_string();
        assert_eq!(bare.parse::<RunId>(), Ok(id));
    }

    #[test]
    fn rejects_foreign_prefix_and_garbage() {
        let document = DocumentId::new().to_string();
        let err = document.parse::<RunId>().expect_err("doc id is not a run id");
        assert_eq!(err.id_type, "RunId");

        assert!("run_not-a-ulid".parse::<RunId>().is_err());
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let id = DocumentId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert!(!json.contains("doc_"));
        assert_eq!(serde_json::from_str::<DocumentId>(&json).expect("deserialize"), id);
    }
}
