//! Basic type definitions for the relay
//!
//! Provides newtype wrappers for type safety:
//! - `ConnId`: UUID-based unique connection identifier
//! - `RoomId`: normalized, validated room identifier
//! - `StateBlob`: opaque application state payload

use uuid::Uuid;

/// Opaque application state associated with a room
///
/// The relay never inspects this value; it is stored and forwarded as-is.
pub type StateBlob = serde_json::Value;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe connection identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub Uuid);

impl ConnId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allowed room identifier length range, after trimming.
const ROOM_ID_LEN: std::ops::RangeInclusive<usize> = 3..=10;

/// Normalized room identifier
///
/// Room identifiers are short alphanumeric strings chosen by clients.
/// Parsing trims surrounding whitespace, uppercases, and rejects anything
/// outside the 3-10 character ASCII-alphanumeric alphabet. There is no
/// other way to construct a `RoomId`, so holding one implies validity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Parse and normalize a raw room identifier
    ///
    /// Returns `None` when the trimmed input falls outside the allowed
    /// alphabet or length range. Invalid identifiers are dropped silently
    /// by callers; no error reaches the client.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if !ROOM_ID_LEN.contains(&trimmed.len()) {
            return None;
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    /// The normalized identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conn_id_unique() {
        let id1 = ConnId::new();
        let id2 = ConnId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_room_id_normalizes() {
        let room = RoomId::parse("  abc123  ").unwrap();
        assert_eq!(room.as_str(), "ABC123");
    }

    #[test]
    fn test_room_id_length_bounds() {
        assert!(RoomId::parse("ab").is_none());
        assert!(RoomId::parse("abc").is_some());
        assert!(RoomId::parse("abcdefghij").is_some());
        assert!(RoomId::parse("abcdefghijk").is_none());
        assert!(RoomId::parse("").is_none());
        assert!(RoomId::parse("   ").is_none());
    }

    #[test]
    fn test_room_id_alphabet() {
        assert!(RoomId::parse("abc-123").is_none());
        assert!(RoomId::parse("abc 12").is_none());
        assert!(RoomId::parse("héllo1").is_none());
        assert!(RoomId::parse("A1b2C3").is_some());
    }

    #[test]
    fn test_room_id_case_folded_equality() {
        assert_eq!(RoomId::parse("abc123"), RoomId::parse("ABC123"));
    }

    #[test]
    fn test_room_id_serde_transparent() {
        let room = RoomId::parse("abc123").unwrap();
        assert_eq!(serde_json::to_string(&room).unwrap(), "\"ABC123\"");
    }
}
