//! Type-safe consultation room identifier.
//!
//! [`RoomId`] is a newtype wrapper around the server-assigned room string so
//! room identifiers cannot be confused with patient or doctor identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a consultation room.
///
/// Assigned by the server when a patient first joins and immutable
/// thereafter. Used as the key in [`super::RoomDirectory`] and as the target
/// of every room-scoped outbound event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wraps a server-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
