//! SQLite implementation of `MemoryStore`.
//!
//! Filters are compiled into a single parameterized statement with
//! `QueryBuilder`. The text path joins the FTS5 index and returns the
//! OR-match of the query terms ordered by `bm25`; the caller re-scores and
//! cuts that set. The vector path loads the filtered embedded rows (newest
//! first, up to the query's scan limit) and ranks them by cosine similarity
//! in process.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use memoria_core::memory::embedder::cosine_similarity;
use memoria_core::memory::scorer::tokenize;
use memoria_core::memory::store::{MemoryStore, RecordOrder, RecordQuery};
use memoria_types::error::RepositoryError;
use memoria_types::memory::{MemoryId, MemoryRecord, MemoryScope, MemoryTier};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MemoryStore`.
pub struct SqliteMemoryStore {
    pool: DatabasePool,
}

impl SqliteMemoryStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct MemoryRecordRow {
    id: String,
    tier: String,
    content_type: String,
    content: String,
    embedding: Option<Vec<u8>>,
    owner_id: Option<String>,
    session_id: Option<String>,
    conversation_id: Option<String>,
    topic_id: Option<String>,
    metadata: String,
    created_at: String,
    expires_at: Option<String>,
}

impl MemoryRecordRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tier: row.try_get("tier")?,
            content_type: row.try_get("content_type")?,
            content: row.try_get("content")?,
            embedding: row.try_get("embedding")?,
            owner_id: row.try_get("owner_id")?,
            session_id: row.try_get("session_id")?,
            conversation_id: row.try_get("conversation_id")?,
            topic_id: row.try_get("topic_id")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    fn into_record(self) -> Result<MemoryRecord, RepositoryError> {
        let id: MemoryId = self
            .id
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid memory id: {e}")))?;
        let tier: MemoryTier = self.tier.parse().map_err(RepositoryError::Query)?;
        let embedding = self.embedding.as_deref().map(bytes_to_vec).transpose()?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| RepositoryError::Query(format!("invalid metadata: {e}")))?;
        let expires_at = self.expires_at.as_deref().map(parse_datetime).transpose()?;

        Ok(MemoryRecord {
            id,
            tier,
            content_type: self.content_type,
            content: self.content,
            embedding,
            scope: MemoryScope {
                owner_id: self.owner_id,
                session_id: self.session_id,
                conversation_id: self.conversation_id,
                topic_id: self.topic_id,
            },
            metadata,
            created_at: parse_datetime(&self.created_at)?,
            expires_at,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so lexical order in SQL equals time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vec(bytes: &[u8]) -> Result<Vec<f32>, RepositoryError> {
    if bytes.len() % 4 != 0 {
        return Err(RepositoryError::Query(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// FTS5 expression matching any of the query terms.
///
/// Terms are alphanumeric after tokenization, so quoting each one is enough
/// to keep FTS5 operators out of the expression.
fn fts_match_expression(text: &str) -> Option<String> {
    let terms: BTreeSet<String> = tokenize(text).collect();
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

// ---------------------------------------------------------------------------
// Query compilation
// ---------------------------------------------------------------------------

/// Append the WHERE predicates shared by every ordering.
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &RecordQuery) {
    let filter = &query.filter;

    if !filter.tiers.is_empty() {
        qb.push(" AND r.tier IN (");
        let mut list = qb.separated(", ");
        for tier in &filter.tiers {
            list.push_bind(tier.as_str());
        }
        list.push_unseparated(")");
    }
    if !filter.content_types.is_empty() {
        qb.push(" AND r.content_type IN (");
        let mut list = qb.separated(", ");
        for content_type in &filter.content_types {
            list.push_bind(content_type.clone());
        }
        list.push_unseparated(")");
    }

    let scope = [
        ("r.owner_id", &filter.scope.owner_id),
        ("r.session_id", &filter.scope.session_id),
        ("r.conversation_id", &filter.scope.conversation_id),
        ("r.topic_id", &filter.scope.topic_id),
    ];
    for (column, value) in scope {
        if let Some(value) = value {
            qb.push(format!(" AND {column} = "));
            qb.push_bind(value.clone());
        }
    }

    if let Some(tf) = &filter.timeframe {
        if let Some(start) = &tf.start {
            qb.push(" AND r.created_at >= ");
            qb.push_bind(format_datetime(start));
        }
        if let Some(end) = &tf.end {
            qb.push(" AND r.created_at <= ");
            qb.push_bind(format_datetime(end));
        }
    }
    if let Some(now) = &filter.live_at {
        qb.push(" AND (r.expires_at IS NULL OR r.expires_at > ");
        qb.push_bind(format_datetime(now));
        qb.push(")");
    }

    let needs_embedding = matches!(query.order, RecordOrder::NearestTo(_));
    match query.has_embedding {
        Some(true) => {
            qb.push(" AND r.embedding IS NOT NULL");
        }
        Some(false) => {
            qb.push(" AND r.embedding IS NULL");
        }
        None if needs_embedding => {
            qb.push(" AND r.embedding IS NOT NULL");
        }
        None => {}
    }

    if let Some(after) = &query.after_id {
        qb.push(" AND r.id > ");
        qb.push_bind(after.to_string());
    }
}

impl SqliteMemoryStore {
    async fn fetch(&self, mut qb: QueryBuilder<'_, Sqlite>) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let rows = qb
            .build()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let record_row =
                MemoryRecordRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            records.push(record_row.into_record()?);
        }
        Ok(records)
    }

    /// Cosine ranking over the filtered embedded rows. With a `scan_limit`,
    /// only the newest `scan_limit` rows are decoded and compared.
    async fn nearest(&self, query: &RecordQuery, target: &[f32]) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let mut qb = QueryBuilder::new("SELECT r.* FROM memory_records r WHERE 1 = 1");
        push_filters(&mut qb, query);
        if let Some(scan) = query.scan_limit {
            qb.push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ");
            qb.push_bind(i64::from(scan));
        }
        let records = self.fetch(qb).await?;

        let mut scored: Vec<(f32, MemoryRecord)> = records
            .into_iter()
            .map(|r| {
                let score = r
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(target, e))
                    .unwrap_or(0.0);
                (score, r)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(query.limit as usize);
        Ok(scored.into_iter().map(|(_, r)| r).collect())
    }
}

impl MemoryStore for SqliteMemoryStore {
    async fn query(&self, query: &RecordQuery) -> Result<Vec<MemoryRecord>, RepositoryError> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut qb = match &query.order {
            RecordOrder::NearestTo(target) => return self.nearest(query, target).await,
            RecordOrder::TextRelevance(text) => {
                let Some(expression) = fts_match_expression(text) else {
                    return Ok(Vec::new());
                };
                let mut qb = QueryBuilder::new(
                    "SELECT r.* FROM memory_records r \
                     JOIN memory_records_fts ON memory_records_fts.rowid = r.rowid \
                     WHERE memory_records_fts MATCH ",
                );
                qb.push_bind(expression);
                qb
            }
            RecordOrder::IdAsc | RecordOrder::CreatedDesc => {
                QueryBuilder::new("SELECT r.* FROM memory_records r WHERE 1 = 1")
            }
        };

        push_filters(&mut qb, query);

        qb.push(match query.order {
            RecordOrder::TextRelevance(_) => " ORDER BY bm25(memory_records_fts) ASC, r.id ASC",
            RecordOrder::CreatedDesc => " ORDER BY r.created_at DESC, r.id DESC",
            _ => " ORDER BY r.id ASC",
        });
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(query.limit));

        self.fetch(qb).await
    }

    async fn insert(&self, record: &MemoryRecord) -> Result<MemoryId, RepositoryError> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            r#"INSERT INTO memory_records (id, tier, content_type, content, embedding, owner_id, session_id, conversation_id, topic_id, metadata, created_at, expires_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.tier.as_str())
        .bind(&record.content_type)
        .bind(&record.content)
        .bind(record.embedding.as_deref().map(vec_to_bytes))
        .bind(record.scope.owner_id.as_deref())
        .bind(record.scope.session_id.as_deref())
        .bind(record.scope.conversation_id.as_deref())
        .bind(record.scope.topic_id.as_deref())
        .bind(metadata)
        .bind(format_datetime(&record.created_at))
        .bind(record.expires_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(record.id),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => Err(
                RepositoryError::Conflict(format!("memory '{}' already exists", record.id)),
            ),
            Err(e) => Err(RepositoryError::Query(e.to_string())),
        }
    }

    async fn update_embedding(&self, id: &MemoryId, embedding: &[f32]) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE memory_records SET embedding = ? WHERE id = ? AND embedding IS NULL",
        )
        .bind(vec_to_bytes(embedding))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
