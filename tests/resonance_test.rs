use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use anima::anchors::{AnchorCollection, AnchorEntry};
use anima::error::{ProviderError, ResonanceError};
use anima::provider::EmbeddingProvider;
use anima::resonance::{ResonanceEngine, cosine_similarity, score_collection};

fn entry(label: &str, embedding: Vec<f32>) -> AnchorEntry {
    AnchorEntry {
        label: label.to_string(),
        embedding,
        metadata: serde_json::Value::Null,
    }
}

/// Embedder that maps known texts to fixed vectors and fails on anything
/// else, as an unreachable provider would.
struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| ProviderError::MalformedResponse(format!("no vector for '{text}'")))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::new();
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

// =============================================================
// Cosine Similarity
// =============================================================

#[test]
fn cosine_self_similarity_is_one() {
    let v = vec![0.3f32, -0.7, 0.2, 0.9];
    let score = cosine_similarity(&v, &v).unwrap();
    assert!((score - 1.0).abs() < 1e-6);
}

#[test]
fn cosine_stays_in_bounds() {
    let vectors = [
        vec![1.0f32, 0.0, 0.0],
        vec![-1.0, 0.0, 0.0],
        vec![0.5, -0.5, 0.7],
        vec![-0.2, 0.9, -0.4],
        vec![3.0, 4.0, 0.0],
    ];
    for a in &vectors {
        for b in &vectors {
            let score = cosine_similarity(a, b).unwrap();
            assert!(
                (-1.0 - 1e-6..=1.0 + 1e-6).contains(&score),
                "cosine({a:?}, {b:?}) = {score} out of bounds"
            );
        }
    }
}

#[test]
fn cosine_opposite_vectors_score_minus_one() {
    let a = vec![1.0f32, 2.0, 3.0];
    let b = vec![-1.0f32, -2.0, -3.0];
    let score = cosine_similarity(&a, &b).unwrap();
    assert!((score + 1.0).abs() < 1e-6);
}

#[test]
fn cosine_zero_vector_scores_zero() {
    let a = vec![0.0f32, 0.0, 0.0];
    let b = vec![1.0f32, 2.0, 3.0];
    assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
}

#[test]
fn cosine_dimension_mismatch_is_an_error() {
    let a = vec![1.0f32, 0.0];
    let b = vec![1.0f32, 0.0, 0.0];
    let result = cosine_similarity(&a, &b);
    assert!(matches!(
        result,
        Err(ResonanceError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
}

// =============================================================
// Collection Scanning
// =============================================================

#[test]
fn top_match_wins_at_top_1() {
    // User text embedding nearly identical to the joy anchor
    let collection = AnchorCollection::new(
        "emotion_tokens",
        vec![
            entry("joy:bright", vec![1.0, 0.0, 0.0]),
            entry("grief:quiet", vec![0.0, 1.0, 0.0]),
        ],
    )
    .unwrap();

    let query = vec![0.999, 0.001, 0.0];
    let matched = score_collection(&query, &collection, 1, 0.5).unwrap();

    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].label, "joy:bright");
    assert!(matched[0].score > 0.99);
}

#[test]
fn results_sorted_descending_and_truncated() {
    let collection = AnchorCollection::new(
        "test",
        vec![
            entry("a", vec![1.0, 0.0]),
            entry("b", vec![0.9, 0.1]),
            entry("c", vec![0.5, 0.5]),
            entry("d", vec![0.0, 1.0]),
        ],
    )
    .unwrap();

    let query = vec![1.0, 0.0];
    let matched = score_collection(&query, &collection, 3, 0.0).unwrap();

    assert_eq!(matched.len(), 3);
    assert!(matched[0].score >= matched[1].score);
    assert!(matched[1].score >= matched[2].score);
    assert_eq!(matched[0].label, "a");
}

#[test]
fn threshold_filters_weak_matches() {
    let collection = AnchorCollection::new(
        "test",
        vec![entry("near", vec![1.0, 0.0]), entry("far", vec![0.0, 1.0])],
    )
    .unwrap();

    let query = vec![1.0, 0.0];
    let matched = score_collection(&query, &collection, 10, 0.5).unwrap();

    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].label, "near");
}

#[test]
fn empty_collection_returns_empty() {
    let collection = AnchorCollection::empty("empty");
    let query = vec![1.0f32, 0.0];
    let matched = score_collection(&query, &collection, 5, 0.0).unwrap();
    assert!(matched.is_empty());
}

// =============================================================
// Engine (embed + scan)
// =============================================================

#[tokio::test]
async fn resonate_embeds_once_and_scans() {
    let mut vectors = HashMap::new();
    vectors.insert("it finally feels light again".to_string(), vec![0.98, 0.02]);
    let engine = ResonanceEngine::new(Arc::new(FixedEmbedder { vectors }));

    let collection = AnchorCollection::new(
        "emotion_tokens",
        vec![
            entry("joy:bright", vec![1.0, 0.0]),
            entry("grief:quiet", vec![0.0, 1.0]),
        ],
    )
    .unwrap();

    let matched = engine
        .resonate("it finally feels light again", &collection, 1, 0.5)
        .await
        .unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].label, "joy:bright");
}

#[tokio::test]
async fn resonate_surfaces_provider_failures() {
    let engine = ResonanceEngine::new(Arc::new(FixedEmbedder {
        vectors: HashMap::new(),
    }));
    let collection =
        AnchorCollection::new("emotion_tokens", vec![entry("joy:bright", vec![1.0, 0.0])]).unwrap();

    // A failed embedding must not masquerade as "no matches"
    let result = engine.resonate("anything", &collection, 3, 0.0).await;
    assert!(matches!(result, Err(ResonanceError::Provider(_))));
}
