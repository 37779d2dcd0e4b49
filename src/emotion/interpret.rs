use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

use crate::anchors::TokenEffect;
use crate::provider::structured::parse_structured;
use crate::provider::ChatProvider;
use crate::resonance::MatchedToken;

/// The agent's consolidated read of a turn's emotional signal.
///
/// `emotional_shift` is a weighted distribution (weights sum to 1.0 when
/// non-empty); the tendency and effect fields are categorical tags with no
/// weighting. All fields are empty when nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    #[serde(default)]
    pub emotional_shift: BTreeMap<String, f32>,
    #[serde(default)]
    pub behavior_tendencies: BTreeSet<String>,
    #[serde(default)]
    pub internal_effect: BTreeSet<String>,
}

impl EmotionalState {
    pub fn is_empty(&self) -> bool {
        self.emotional_shift.is_empty()
            && self.behavior_tendencies.is_empty()
            && self.internal_effect.is_empty()
    }

    /// The heaviest-weighted shift category, if any.
    pub fn dominant_shift(&self) -> Option<&str> {
        self.emotional_shift
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, _)| name.as_str())
    }
}

/// Interpret matched tokens through the effect map.
///
/// Each token adds its resonance score to every shift category its entry
/// declares (contributions accumulate additively, not averaged), and its
/// tendency/effect tags are unioned in. Shift weights are then normalized to
/// sum to 1.0. Tokens absent from the map are ignored here; the caller
/// decides whether to hand them to the model fallback.
pub fn interpret(
    matched: &[MatchedToken],
    effect_map: &HashMap<String, TokenEffect>,
) -> EmotionalState {
    let mut state = EmotionalState::default();

    for token in matched {
        let Some(effect) = effect_map.get(&token.label) else {
            continue;
        };
        for category in &effect.emotional_shift {
            *state.emotional_shift.entry(category.clone()).or_insert(0.0) += token.score;
        }
        state
            .behavior_tendencies
            .extend(effect.behavior_tendencies.iter().cloned());
        state
            .internal_effect
            .extend(effect.internal_effect.iter().cloned());
    }

    normalize(&mut state.emotional_shift);
    state
}

/// Two-stage interpretation: structured table lookup first, generative
/// fallback second.
///
/// If every matched token is missing from the effect map and a fallback
/// model is provided, the raw labels are handed to the model, which must
/// produce the same three-field shape; any failure there degrades to the
/// all-empty state. With no fallback, unmapped tokens yield the all-empty
/// state directly. This split lets the anchor taxonomy grow without breaking
/// on tokens the map has not caught up with.
pub async fn interpret_with_fallback(
    matched: &[MatchedToken],
    effect_map: &HashMap<String, TokenEffect>,
    fallback: Option<&dyn ChatProvider>,
) -> EmotionalState {
    let state = interpret(matched, effect_map);
    if !state.emotional_shift.is_empty() || matched.is_empty() {
        return state;
    }

    let unmapped: Vec<&str> = matched
        .iter()
        .filter(|t| !effect_map.contains_key(&t.label))
        .map(|t| t.label.as_str())
        .collect();
    // The fallback only fires when nothing at all was mapped; a partially
    // mapped result (tags without shift categories) stands as-is.
    if unmapped.len() != matched.len() {
        return state;
    }

    match fallback {
        Some(chat) => model_interpretation(chat, &unmapped).await,
        None => EmotionalState::default(),
    }
}

/// Ask the model to interpret tokens the effect map does not cover.
/// Conservative by design: any provider or parse failure returns the safe
/// empty state.
async fn model_interpretation(chat: &dyn ChatProvider, tokens: &[&str]) -> EmotionalState {
    let system = "You interpret emotional tokens into a structured state.\n\
                  Answer with ONLY a JSON object of this exact shape:\n\
                  {\"emotional_shift\": {\"<emotion>\": <weight>}, \
                  \"behavior_tendencies\": [\"<tag>\"], \
                  \"internal_effect\": [\"<tag>\"]}\n\
                  Weights must be positive and should reflect relative strength. No prose.";
    let prompt = format!("Interpret these emotional tokens: {}", tokens.join(", "));
    let messages = [crate::provider::ChatMessage::new("user", prompt)];

    let raw = match chat.complete(system, &messages, 0.3, Some(256)).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "interpretation fallback call failed, returning empty state");
            return EmotionalState::default();
        }
    };

    match parse_structured::<EmotionalState>("emotion interpretation", &raw) {
        Ok(mut state) => {
            state.emotional_shift.retain(|_, w| *w > 0.0);
            normalize(&mut state.emotional_shift);
            state
        }
        Err(e) => {
            warn!(error = %e, "interpretation fallback output unparseable, returning empty state");
            EmotionalState::default()
        }
    }
}

fn normalize(shift: &mut BTreeMap<String, f32>) {
    let total: f32 = shift.values().sum();
    if total > 0.0 {
        for weight in shift.values_mut() {
            *weight /= total;
        }
    }
}
