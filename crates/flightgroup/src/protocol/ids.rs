//! Identifier newtypes shared by every message.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// The reserved "none" identifier.
            pub const NULL: Self = Self(String::new());

            /// Wrap a raw identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether this is the null sentinel.
            #[must_use]
            pub fn is_null(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                if self.is_null() {
                    f.write_str("<null>")
                } else {
                    f.write_str(&self.0)
                }
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Public identifier of a pilot.
    PilotId
);

string_id!(
    /// Identifier of a flight group.
    GroupId
);

string_id!(
    /// Identifier of a single waypoint inside a flight plan.
    WaypointId
);

/// Correlation id attached to outbound requests and echoed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sentinel() {
        assert!(GroupId::NULL.is_null());
        assert!(PilotId::default().is_null());
        assert!(!GroupId::new("g1").is_null());
        assert_eq!(GroupId::NULL.to_string(), "<null>");
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&PilotId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");

        let id: GroupId = serde_json::from_str("\"\"").unwrap();
        assert!(id.is_null());
    }

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId(7).to_string(), "#7");
    }
}
