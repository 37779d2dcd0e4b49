pub mod interpret;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::anchors::AnchorStore;
use crate::config::RoutingConfig;
use crate::error::ResonanceError;
use crate::provider::structured::parse_token_scores;
use crate::provider::{ChatMessage, ChatProvider};
use crate::resonance::{MatchedToken, score_collection};

/// How a turn's emotion classification should proceed, decided from the
/// strength of the best cosine match. Cheap vector matching is preferred
/// whenever the signal is strong enough to trust; weak signal hands off to
/// the model, which can weigh recent conversation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmotionRoute {
    /// Strong similarity: keep the top 3 cosine matches.
    FullCosine,
    /// Moderate similarity: keep the top 2.
    LooseCosine,
    /// Weak similarity: keep only the single strongest token.
    MinimalCosine,
    /// No usable signal: delegate to the model-based classifier.
    ModelFallback,
}

impl EmotionRoute {
    /// How many cosine matches this route consumes. Zero means the cosine
    /// results are discarded in favor of the fallback classifier.
    pub fn token_count(self) -> usize {
        match self {
            EmotionRoute::FullCosine => 3,
            EmotionRoute::LooseCosine => 2,
            EmotionRoute::MinimalCosine => 1,
            EmotionRoute::ModelFallback => 0,
        }
    }
}

/// Tiered routing on the top cosine score. Boundaries are inclusive to the
/// higher tier: 0.35 routes Full, 0.30 routes Loose, 0.25 routes Minimal.
pub fn route(top_score: f32, cfg: &RoutingConfig) -> EmotionRoute {
    if top_score >= cfg.full {
        EmotionRoute::FullCosine
    } else if top_score >= cfg.loose {
        EmotionRoute::LooseCosine
    } else if top_score >= cfg.minimal {
        EmotionRoute::MinimalCosine
    } else {
        EmotionRoute::ModelFallback
    }
}

/// Maximum tokens the fallback classifier may return.
const FALLBACK_TOKEN_CAP: usize = 3;

/// The dominant high-level emotional theme of an input, with the reaction
/// metadata its anchor carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionContext {
    pub name: String,
    pub inner_emotion: String,
    pub trait_expression: String,
    pub memory_anchor: String,
    pub similarity: f32,
}

/// Outcome of token detection: which route was taken and what it yielded.
#[derive(Debug, Clone)]
pub struct DetectedTokens {
    pub route: EmotionRoute,
    pub tokens: Vec<MatchedToken>,
}

/// Detect fine-grained emotion tokens for an already-embedded input.
///
/// Cosine routes truncate the scan results per tier. The fallback route asks
/// the chat model, grounding it in the recent conversation; any provider or
/// parse failure there degrades to an empty list, since silence is preferable
/// to hallucinated emotional state.
pub async fn detect_tokens(
    query: &[f32],
    store: &AnchorStore,
    routing: &RoutingConfig,
    chat: &dyn ChatProvider,
    recent: &[ChatMessage],
    user_input: &str,
) -> Result<DetectedTokens, ResonanceError> {
    let scanned = score_collection(
        query,
        &store.emotion_tokens,
        EmotionRoute::FullCosine.token_count(),
        0.0,
    )?;
    let top_score = scanned.first().map(|t| t.score).unwrap_or(0.0);
    let route = route(top_score, routing);
    debug!(?route, top_score, "emotion routing decision");

    let tokens = match route {
        EmotionRoute::ModelFallback => {
            model_fallback(chat, store, recent, user_input).await
        }
        cosine => {
            let mut tokens = scanned;
            tokens.truncate(cosine.token_count());
            tokens
        }
    };

    Ok(DetectedTokens { route, tokens })
}

/// Model-based token classification for low-signal inputs.
///
/// The model sees the token vocabulary and the last few conversation
/// messages, and must answer with a strict JSON array of (token, confidence)
/// pairs, or an empty array when no clear emotion is present.
async fn model_fallback(
    chat: &dyn ChatProvider,
    store: &AnchorStore,
    recent: &[ChatMessage],
    user_input: &str,
) -> Vec<MatchedToken> {
    let vocabulary = store.token_vocabulary().join(", ");
    let system = format!(
        "You classify the emotional undertone of a user message.\n\
         Choose at most {FALLBACK_TOKEN_CAP} tokens from this vocabulary:\n{vocabulary}\n\n\
         Consider the recent conversation for context. Be conservative: if no \
         clear emotion is present, answer with an empty array.\n\
         Answer with ONLY a JSON array of [token, confidence] pairs, \
         confidence between 0 and 1. No prose."
    );

    let mut messages: Vec<ChatMessage> = recent.to_vec();
    messages.push(ChatMessage::new("user", user_input));

    let raw = match chat.complete(&system, &messages, 0.2, Some(256)).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "emotion fallback call failed, returning no tokens");
            return Vec::new();
        }
    };

    match parse_token_scores("emotion fallback", &raw, FALLBACK_TOKEN_CAP) {
        Ok(pairs) => pairs
            .into_iter()
            .map(|(label, score)| MatchedToken { label, score })
            .collect(),
        Err(e) => {
            warn!(error = %e, "emotion fallback output unparseable, returning no tokens");
            Vec::new()
        }
    }
}

/// Identify the dominant high-level emotional theme: the single best match
/// over the major-emotion anchors, or none below the threshold.
pub fn major_emotion_context(
    query: &[f32],
    store: &AnchorStore,
    threshold: f32,
) -> Result<Option<EmotionContext>, ResonanceError> {
    let top = score_collection(query, &store.major_emotions, 1, threshold)?;
    let Some(best) = top.into_iter().next() else {
        return Ok(None);
    };

    let metadata = store
        .major_emotions
        .get(&best.label)
        .map(|e| e.metadata.clone())
        .unwrap_or(serde_json::Value::Null);
    let field = |name: &str| {
        metadata
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Ok(Some(EmotionContext {
        name: best.label,
        inner_emotion: field("inner_emotion"),
        trait_expression: field("trait_expression"),
        memory_anchor: field("memory_anchor"),
        similarity: best.score,
    }))
}
