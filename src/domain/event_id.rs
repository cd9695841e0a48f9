//! Opaque event identifier.
//!
//! [`EventId`] is generated from a UUID v4 but carried as an opaque string,
//! so events produced by other bridge implementations (whose ids need not
//! be UUIDs) still deserialize.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a captured [`super::BusEvent`].
///
/// Generated once by [`super::EventBus::emit`] and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random `EventId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
