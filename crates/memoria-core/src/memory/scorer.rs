//! Lexical relevance scoring.
//!
//! The text channel of hybrid search. The store narrows candidates to records
//! sharing at least one term with the query; the scorer then assigns each a
//! normalized relevance in [0, 1].

use std::collections::{BTreeSet, HashMap};

use memoria_types::memory::MemoryRecord;

/// Computes a lexical match score between a query and a record.
pub trait TextScorer: Send + Sync {
    /// Score in [0, 1]. Higher means a better match; 0 means no overlap.
    fn score(&self, query: &str, record: &MemoryRecord) -> f32;
}

/// Split text into lowercase alphanumeric terms.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Term-coverage scorer with saturating term frequency.
///
/// Each distinct query term contributes `tf / (tf + k)` where `tf` is its
/// count in the record content; the score is the mean over query terms.
/// Adding matching terms or occurrences never lowers the score.
#[derive(Debug, Clone)]
pub struct LexicalScorer {
    saturation: f32,
}

impl LexicalScorer {
    pub fn new(saturation: f32) -> Self {
        Self {
            saturation: saturation.max(f32::EPSILON),
        }
    }
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl TextScorer for LexicalScorer {
    fn score(&self, query: &str, record: &MemoryRecord) -> f32 {
        let terms: BTreeSet<String> = tokenize(query).collect();
        if terms.is_empty() {
            return 0.0;
        }

        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in tokenize(&record.content) {
            *counts.entry(token).or_default() += 1;
        }

        let total: f32 = terms
            .iter()
            .map(|t| {
                let tf = counts.get(t).copied().unwrap_or(0) as f32;
                tf / (tf + self.saturation)
            })
            .sum();
        (total / terms.len() as f32).clamp(0.0, 1.0)
    }
}
