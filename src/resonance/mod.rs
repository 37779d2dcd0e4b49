use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::anchors::{AnchorCollection, AnchorStore};
use crate::config::ResonanceConfig;
use crate::error::ResonanceError;
use crate::provider::EmbeddingProvider;

/// One anchor the live input resonated with. Transient per-turn data, copied
/// into the session logs when a turn records it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedToken {
    pub label: String,
    pub score: f32,
}

/// A moral or pattern match that carries its anchor metadata forward into
/// prompt assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResonantAnchor {
    pub label: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// A psychological-pattern match with its weight normalized among the
/// returned top-k.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub label: String,
    pub score: f32,
    pub percent: f32,
    pub metadata: serde_json::Value,
}

/// Top-resonant moral anchors for one input, split by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoralResonance {
    pub values: Vec<ResonantAnchor>,
    pub fragments: Vec<ResonantAnchor>,
}

/// Cosine similarity between two equal-length vectors.
///
/// Returns 0.0 when either vector has zero norm. Length disagreement is
/// checked on every call; it indicates corrupt anchor data.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, ResonanceError> {
    if a.len() != b.len() {
        return Err(ResonanceError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Brute-force similarity search over the in-memory anchor collections.
///
/// All retrieval is a linear scan: the anchor sets are small and fixed, so
/// nothing fancier is warranted.
pub struct ResonanceEngine {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ResonanceEngine {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// Embed `text` once for reuse across several collection scans within a
    /// turn. Provider failures propagate: a failed embedding must not look
    /// like "no matches".
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ResonanceError> {
        Ok(self.embedder.embed(text).await?)
    }

    /// Score `text` against one collection: embed, scan, filter to
    /// `score >= threshold`, sort descending, truncate to `top_k`.
    pub async fn resonate(
        &self,
        text: &str,
        collection: &AnchorCollection,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<MatchedToken>, ResonanceError> {
        if collection.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embed(text).await?;
        score_collection(&query, collection, top_k, threshold)
    }

    /// Moral resonance for an already-embedded input: values and fragments
    /// are scored with their own thresholds (both overridden upward in light
    /// mode).
    pub fn moral_resonance(
        &self,
        query: &[f32],
        store: &AnchorStore,
        cfg: &ResonanceConfig,
        light: bool,
    ) -> Result<MoralResonance, ResonanceError> {
        let (value_threshold, fragment_threshold) = if light {
            (cfg.light_threshold, cfg.light_threshold)
        } else {
            (cfg.value_threshold, cfg.fragment_threshold)
        };

        let values = score_with_metadata(query, &store.moral_values, cfg.top_values, value_threshold)?;
        let fragments = score_with_metadata(
            query,
            &store.moral_fragments,
            cfg.top_fragments,
            fragment_threshold,
        )?;

        Ok(MoralResonance { values, fragments })
    }

    /// Psychological-pattern matching for an already-embedded input, with
    /// weights normalized to percentages among the returned matches.
    pub fn match_patterns(
        &self,
        query: &[f32],
        collection: &AnchorCollection,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<PatternMatch>, ResonanceError> {
        let matched = score_with_metadata(query, collection, top_k, threshold)?;
        let total: f32 = matched.iter().map(|m| m.score).sum();

        Ok(matched
            .into_iter()
            .map(|m| {
                let percent = if total > 0.0 {
                    m.score / total * 100.0
                } else {
                    0.0
                };
                PatternMatch {
                    label: m.label,
                    score: m.score,
                    percent,
                    metadata: m.metadata,
                }
            })
            .collect())
    }
}

/// Scan one collection against a pre-computed query vector.
pub fn score_collection(
    query: &[f32],
    collection: &AnchorCollection,
    top_k: usize,
    threshold: f32,
) -> Result<Vec<MatchedToken>, ResonanceError> {
    let mut matched = Vec::new();
    for entry in collection.entries() {
        let score = cosine_similarity(query, &entry.embedding)?;
        if score >= threshold {
            matched.push(MatchedToken {
                label: entry.label.clone(),
                score,
            });
        }
    }
    matched.sort_by(|a, b| b.score.total_cmp(&a.score));
    matched.truncate(top_k);
    Ok(matched)
}

fn score_with_metadata(
    query: &[f32],
    collection: &AnchorCollection,
    top_k: usize,
    threshold: f32,
) -> Result<Vec<ResonantAnchor>, ResonanceError> {
    let matched = score_collection(query, collection, top_k, threshold)?;
    Ok(matched
        .into_iter()
        .map(|m| {
            let metadata = collection
                .get(&m.label)
                .map(|e| e.metadata.clone())
                .unwrap_or(serde_json::Value::Null);
            ResonantAnchor {
                label: m.label,
                score: m.score,
                metadata,
            }
        })
        .collect())
}
