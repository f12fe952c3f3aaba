//! Strongly-typed identifier newtypes for domain concepts.
//!
//! All types serialize/deserialize as plain strings (or UUID strings) and
//! implement the usual conversions, so call sites never juggle raw strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate string wrapper newtypes with consistent implementations.
///
/// Each generated type:
/// - Trims whitespace from input values
/// - Implements `From<&str>`, `From<String>`, `Into<String>`
/// - Implements `Display` for string formatting
/// - Serializes/deserializes as a plain string
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into().trim().to_string())
            }

            /// Get the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Check if the identifier is empty (after trimming).
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self(String::new())
            }
        }
    };
}

/// Macro to generate UUID wrapper newtypes.
macro_rules! uuid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(value: Uuid) -> Self {
                Self(value)
            }

            /// Whether this identifier is the nil UUID (unset).
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(value.trim())?))
            }
        }
    };
}

uuid_id_type!(ResumeId, "Identifier of a resume generation job.");

string_id_type!(
    TemplateId,
    "Resume template identifier (e.g., \"classic\", \"modern\")."
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn resume_id_nil_check() {
        assert!(ResumeId::default().is_nil());
        assert!(!ResumeId::new(Uuid::new_v4()).is_nil());
    }

    #[test]
    fn resume_id_parses_and_displays() {
        let id = ResumeId::from_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(id.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn resume_id_serializes_as_plain_uuid_string() {
        let id = ResumeId::from_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"67e55044-10b1-426f-9247-bb680e5fe0c8\"");
    }

    #[test]
    fn template_id_trims_whitespace() {
        let id: TemplateId = "  modern  ".into();
        assert_eq!(id.as_str(), "modern");
        assert!(!id.is_empty());
    }
}
