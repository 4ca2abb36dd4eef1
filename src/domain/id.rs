//! Message ID generation
//!
//! All IDs use the format: `{prefix}-{uuid-v7-simple}`
//! Example: `msg-0192f1c4a7b07d3e9b1a2c3d4e5f6a7b`
//!
//! v7 UUIDs are time ordered, so IDs generated later in a session sort after
//! earlier ones.

/// Generate an ID with the given prefix
pub fn generate_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    format!("{}-{}", prefix, uuid.simple())
}

/// Chat message ID wrapper for type-safe ID handling
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh message ID
    pub fn new() -> Self {
        Self(generate_id("msg"))
    }

    /// Create from an existing ID string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the full ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for MessageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}
