//! Memory record types for Memoria.
//!
//! A memory record is a piece of conversational context (an analysis, a
//! fact, a summary) stored under a retention tier and scoped to an owner,
//! session, conversation, or topic so later searches can find it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Unique identifier for a memory record, wrapping a UUID v7 (time-sortable).
///
/// The string form sorts in creation order, which gives the backfill
/// reconciler a stable ascending cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new MemoryId using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a MemoryId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Logical retention class of a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryTier {
    /// Scratch context for the current exchange.
    Working,
    /// Context that should survive a session or two.
    ShortTerm,
    /// Durable knowledge about the owner.
    LongTerm,
}

impl MemoryTier {
    /// All tiers, in retention order.
    pub const ALL: [MemoryTier; 3] = [MemoryTier::Working, MemoryTier::ShortTerm, MemoryTier::LongTerm];

    /// Wire/storage name of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Working => "working",
            MemoryTier::ShortTerm => "short-term",
            MemoryTier::LongTerm => "long-term",
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "working" => Ok(MemoryTier::Working),
            "short-term" => Ok(MemoryTier::ShortTerm),
            "long-term" => Ok(MemoryTier::LongTerm),
            other => Err(format!(
                "invalid memory type: '{other}' (expected working, short-term or long-term)"
            )),
        }
    }
}

/// Optional scoping dimensions shared by records and queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
}

/// A persisted memory record.
///
/// Records are immutable once written, except for `embedding`, which moves
/// from `None` to `Some` at most once (at write time or during backfill).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub tier: MemoryTier,
    /// Free-form tag describing the content (e.g. "excel_analysis").
    pub content_type: String,
    pub content: String,
    /// Fixed-length embedding vector; absent until computed.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    #[serde(flatten)]
    pub scope: MemoryScope,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    /// Whether an embedding has been computed for this record.
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Text fed to the embedding provider.
    ///
    /// Content first, then scalar metadata entries as `key: value`, joined
    /// with ` | `. Nested metadata values are not embedded.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![self.content.clone()];
        for (key, value) in &self.metadata {
            match value {
                serde_json::Value::String(s) => parts.push(format!("{key}: {s}")),
                serde_json::Value::Number(n) => parts.push(format!("{key}: {n}")),
                serde_json::Value::Bool(b) => parts.push(format!("{key}: {b}")),
                _ => {}
            }
        }
        parts.join(" | ")
    }
}

/// Request to store a new memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub content: String,
    pub content_type: String,
    /// One of "working", "short-term", "long-term". Validated by the writer.
    pub memory_type: String,
    #[serde(flatten)]
    pub scope: MemoryScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Compute an embedding at write time (default true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_embedding: Option<bool>,
}

/// Response to a successful write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub id: MemoryId,
}

/// Filters for a newest-first listing of records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(flatten)]
    pub scope: MemoryScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}
