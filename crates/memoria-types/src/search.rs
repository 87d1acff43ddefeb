//! Search request and response types for hybrid memory retrieval.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{MemoryId, MemoryRecord, MemoryScope, MemoryTier};

/// Number of trailing conversation messages used to build a context query.
pub const CONTEXT_MESSAGE_WINDOW: usize = 3;

/// Inclusive creation-time window. Either bound may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl Timeframe {
    /// Whether `ts` falls inside the window.
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| *ts >= s) && self.end.is_none_or(|e| *ts <= e)
    }
}

/// A search request as received from callers.
///
/// Every knob is optional; the retrieval engine resolves defaults. The
/// request is echoed back verbatim in `SearchResponse::search_params`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_types: Option<Vec<String>>,
    #[serde(flatten)]
    pub scope: MemoryScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_relevance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_vector_search: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_search: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_weight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_weight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_metadata: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_knowledge_graph: Option<bool>,
}

impl SearchQuery {
    /// A query with only the text set.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Build a context query from the tail of a conversation.
    ///
    /// Joins the last three non-empty messages with spaces. Returns `None`
    /// when there is nothing to search for.
    pub fn from_recent_messages<S: AsRef<str>>(messages: &[S]) -> Option<Self> {
        let recent: Vec<&str> = messages
            .iter()
            .map(|m| m.as_ref().trim())
            .filter(|m| !m.is_empty())
            .collect();
        let start = recent.len().saturating_sub(CONTEXT_MESSAGE_WINDOW);
        let text = recent[start..].join(" ");
        if text.is_empty() {
            None
        } else {
            Some(Self::new(text))
        }
    }

    /// Build the search for a conversation context request: the recent
    /// message window as query text, narrowed by the conversation kind's
    /// profile. Returns `None` when the messages are all blank.
    pub fn for_conversation(request: &ContextRequest) -> Option<Self> {
        let mut query = Self::from_recent_messages(&request.messages)?;
        let kind = request.conversation_type;
        query.content_types = kind
            .content_types()
            .map(|types| types.iter().map(|t| t.to_string()).collect());
        query.max_results = Some(kind.max_results());
        query.scope = request.scope.clone();
        query.include_knowledge_graph = request.include_knowledge_graph;
        Some(query)
    }

    /// Threshold a result must reach: `minRelevance`, then
    /// `similarityThreshold`, then `fallback`.
    pub fn effective_threshold(&self, fallback: f32) -> f32 {
        self.min_relevance
            .or(self.similarity_threshold)
            .unwrap_or(fallback)
    }
}

/// Kind of conversation a context search serves.
///
/// Each kind carries a retrieval profile: the content types worth
/// recalling and how many results to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// Recalling past events, people, and places.
    Reminiscence,
    /// Grounding in daily routine and familiar people.
    Orientation,
    /// Structured cognitive stimulation session.
    CstSession,
    #[default]
    General,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Reminiscence => "reminiscence",
            ConversationKind::Orientation => "orientation",
            ConversationKind::CstSession => "cst_session",
            ConversationKind::General => "general",
        }
    }

    /// Content types to restrict to, or `None` for all.
    pub fn content_types(&self) -> Option<&'static [&'static str]> {
        match self {
            ConversationKind::Reminiscence => Some(&["event", "person", "place"]),
            ConversationKind::Orientation => Some(&["routine", "person"]),
            ConversationKind::CstSession | ConversationKind::General => None,
        }
    }

    pub fn max_results(&self) -> u32 {
        match self {
            ConversationKind::Reminiscence => 7,
            ConversationKind::Orientation => 3,
            ConversationKind::CstSession => 5,
            ConversationKind::General => 4,
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "reminiscence" => Ok(ConversationKind::Reminiscence),
            "orientation" => Ok(ConversationKind::Orientation),
            "cst_session" => Ok(ConversationKind::CstSession),
            "general" => Ok(ConversationKind::General),
            other => Err(format!(
                "invalid conversation type: '{other}' (expected reminiscence, orientation, cst_session or general)"
            )),
        }
    }
}

/// Request for memories relevant to an ongoing conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequest {
    /// Conversation messages, oldest first.
    pub messages: Vec<String>,
    #[serde(default)]
    pub conversation_type: ConversationKind,
    #[serde(flatten)]
    pub scope: MemoryScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_knowledge_graph: Option<bool>,
}

/// Which retrieval channel produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Vector,
    Text,
    /// Found by both channels.
    Hybrid,
}

/// Path the engine actually took to answer a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPath {
    Hybrid,
    /// Vector search disabled by the caller.
    TextOnly,
    /// Vector search requested but fell back to text only.
    Degraded,
}

impl SearchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchPath::Hybrid => "hybrid",
            SearchPath::TextOnly => "text_only",
            SearchPath::Degraded => "degraded",
        }
    }
}

/// A single ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: MemoryId,
    pub content: String,
    pub content_type: String,
    pub tier: MemoryTier,
    /// Combined weighted score. Not clamped to [0, 1].
    pub relevance: f32,
    pub timestamp: DateTime<Utc>,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// Related record ids attached by knowledge-graph enrichment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<MemoryId>,
}

impl SearchResult {
    pub fn from_record(
        record: &MemoryRecord,
        relevance: f32,
        source: ResultSource,
        include_metadata: bool,
    ) -> Self {
        Self {
            id: record.id,
            content: record.content.clone(),
            content_type: record.content_type.clone(),
            tier: record.tier,
            relevance,
            timestamp: record.created_at,
            source,
            metadata: include_metadata.then(|| record.metadata.clone()),
            related: Vec::new(),
        }
    }
}

/// Count breakdowns over the returned results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFacets {
    pub memory_types: BTreeMap<String, u32>,
    pub content_types: BTreeMap<String, u32>,
    /// Keyed by calendar month, `YYYY-MM`.
    pub time_distribution: BTreeMap<String, u32>,
}

/// Full answer to a search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// Number of merged candidates that passed the relevance threshold,
    /// counted before truncation to `maxResults`.
    pub total_count: u32,
    pub search_params: SearchQuery,
    pub execution_time_ms: u64,
    pub facets: SearchFacets,
    pub search_path: SearchPath,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_effective_threshold_precedence() {
        let mut q = SearchQuery::new("revenue");
        assert!((q.effective_threshold(0.6) - 0.6).abs() < 1e-6);

        q.similarity_threshold = Some(0.4);
        assert!((q.effective_threshold(0.6) - 0.4).abs() < 1e-6);

        q.min_relevance = Some(0.2);
        assert!((q.effective_threshold(0.6) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_from_recent_messages_uses_last_three() {
        let messages = ["hello", "show Q3 numbers", "", "and Q4", "compare them"];
        let q = SearchQuery::from_recent_messages(&messages).unwrap();
        assert_eq!(q.query, "show Q3 numbers and Q4 compare them");
    }

    #[test]
    fn test_from_recent_messages_empty() {
        let messages: [&str; 2] = ["", "   "];
        assert!(SearchQuery::from_recent_messages(&messages).is_none());
    }

    #[test]
    fn test_timeframe_contains_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let tf = Timeframe {
            start: Some(start),
            end: Some(end),
        };
        assert!(tf.contains(&start));
        assert!(tf.contains(&end));
        assert!(!tf.contains(&Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()));

        let open = Timeframe::default();
        assert!(open.contains(&start));
    }

    #[test]
    fn test_search_query_deserializes_wire_shape() {
        let json = r#"{
            "query": "quarterly revenue",
            "memoryTypes": ["long-term"],
            "ownerId": "user-1",
            "timeframe": {"start": "2024-01-01T00:00:00Z"},
            "maxResults": 5,
            "useVectorSearch": false,
            "includeKnowledgeGraph": true
        }"#;
        let q: SearchQuery = serde_json::from_str(json).unwrap();
        assert_eq!(q.query, "quarterly revenue");
        assert_eq!(q.memory_types.as_deref(), Some(&["long-term".to_string()][..]));
        assert_eq!(q.scope.owner_id.as_deref(), Some("user-1"));
        assert_eq!(q.max_results, Some(5));
        assert_eq!(q.use_vector_search, Some(false));
        assert!(q.timeframe.unwrap().end.is_none());
    }

    #[test]
    fn test_facets_serialize_camel_case() {
        let mut facets = SearchFacets::default();
        facets.memory_types.insert("long-term".to_string(), 2);
        facets.time_distribution.insert("2024-03".to_string(), 2);
        let json = serde_json::to_value(&facets).unwrap();
        assert_eq!(json["memoryTypes"]["long-term"], 2);
        assert_eq!(json["timeDistribution"]["2024-03"], 2);
        assert!(json["contentTypes"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_result_source_wire_names() {
        assert_eq!(serde_json::to_string(&ResultSource::Hybrid).unwrap(), "\"hybrid\"");
        assert_eq!(serde_json::to_string(&SearchPath::TextOnly).unwrap(), "\"text_only\"");
    }

    #[test]
    fn test_conversation_profiles() {
        assert_eq!(ConversationKind::Reminiscence.max_results(), 7);
        assert_eq!(ConversationKind::Orientation.max_results(), 3);
        assert_eq!(ConversationKind::CstSession.max_results(), 5);
        assert_eq!(ConversationKind::General.max_results(), 4);
        assert_eq!(
            ConversationKind::Orientation.content_types(),
            Some(&["routine", "person"][..])
        );
        assert!(ConversationKind::General.content_types().is_none());
    }

    #[test]
    fn test_conversation_kind_parse() {
        assert_eq!("cst-session".parse::<ConversationKind>().unwrap(), ConversationKind::CstSession);
        assert_eq!("Reminiscence".parse::<ConversationKind>().unwrap(), ConversationKind::Reminiscence);
        assert!("smalltalk".parse::<ConversationKind>().is_err());
    }

    #[test]
    fn test_for_conversation_applies_profile_and_scope() {
        let request: ContextRequest = serde_json::from_str(
            r#"{
                "messages": ["hi", "who came to the wedding?", "was it in June", "at the lake"],
                "conversationType": "reminiscence",
                "ownerId": "user-1"
            }"#,
        )
        .unwrap();

        let q = SearchQuery::for_conversation(&request).unwrap();
        assert_eq!(q.query, "who came to the wedding? was it in June at the lake");
        assert_eq!(q.max_results, Some(7));
        assert_eq!(
            q.content_types,
            Some(vec!["event".to_string(), "person".to_string(), "place".to_string()])
        );
        assert_eq!(q.scope.owner_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_for_conversation_defaults_to_general() {
        let request: ContextRequest = serde_json::from_str(r#"{"messages": ["budget"]}"#).unwrap();
        let q = SearchQuery::for_conversation(&request).unwrap();
        assert_eq!(q.max_results, Some(4));
        assert!(q.content_types.is_none());

        let blank = ContextRequest {
            messages: vec!["  ".to_string()],
            ..Default::default()
        };
        assert!(SearchQuery::for_conversation(&blank).is_none());
    }
}
