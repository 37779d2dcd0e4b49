//! Internal mood dynamics.
//!
//! The agent's mood is a single value in [0, 1] that drifts with the
//! emotional tone of the conversation but is pulled back toward a resting
//! baseline every turn. The rebound bounds turn-to-turn movement, so the
//! self-reported mood never swings erratically while still tracking tone.

use serde::{Deserialize, Serialize};

/// The resting value the mood returns to: warm, steady, present.
pub const MOOD_BASELINE: f64 = 0.70;

/// Fraction of the distance to baseline recovered each turn.
pub const REBOUND_STRENGTH: f64 = 0.05;

/// Current mood: the continuous value plus its discretized phrase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodState {
    pub value: f64,
    pub phrase: String,
}

impl Default for MoodState {
    fn default() -> Self {
        Self {
            value: MOOD_BASELINE,
            phrase: mood_phrase(MOOD_BASELINE).to_string(),
        }
    }
}

/// Apply one turn's mood update.
///
/// Two components, in order, applied whether or not an emotion was detected:
/// 1. rebound = (baseline - current) * rebound_strength, the pull toward
///    the resting value;
/// 2. a per-emotion delta from the fixed table (case-insensitive; unknown
///    labels contribute 0).
///
/// The result is clamped to [0, 1] and rounded to 3 decimals; the returned
/// phrase is the nearest entry in the 0.05-step phrase table.
pub fn update_mood(
    current: f64,
    detected_emotion: Option<&str>,
    baseline: f64,
    rebound_strength: f64,
) -> (f64, &'static str) {
    let rebound = (baseline - current) * rebound_strength;
    let delta = detected_emotion.map(emotion_delta).unwrap_or(0.0);
    let new_value = (current + rebound + delta).clamp(0.0, 1.0);
    let new_value = (new_value * 1000.0).round() / 1000.0;
    (new_value, mood_phrase(new_value))
}

/// Numeric delta applied to the mood for one detected emotion.
///
/// Painful emotions pull gently downward (-0.01 to -0.025), restorative ones
/// lift (+0.03 to +0.045), awe-class emotions lift strongest (+0.05), and
/// purely reflective states sit near zero. Deltas are intentionally small:
/// mood evolves slowly across a session.
pub fn emotion_delta(label: &str) -> f64 {
    match label.to_lowercase().as_str() {
        // Painful emotions: small downward pull
        "grief" => -0.02,
        "shame" => -0.02,
        "bitterness" => -0.02,
        "loneliness" => -0.02,
        "anger" => -0.02,
        "guilt" => -0.02,
        "regret" => -0.02,
        "insecurity" => -0.02,
        "fear" => -0.02,
        "despair" => -0.025,
        "emptiness" => -0.025,
        "abandonment" => -0.025,
        "worthlessness" => -0.025,
        "anxiety" => -0.02,
        "envy" => -0.02,
        "resentment" => -0.02,
        "humiliation" => -0.02,
        "dread" => -0.02,
        "contempt" => -0.02,
        "boredom" => -0.01,
        "disgust" => -0.02,
        "pity" => -0.01,
        "betrayal" => -0.025,
        "spite" => -0.02,
        "denial" => -0.01,
        "embarrassment" => -0.015,
        "frustration" => -0.015,
        "shock" => -0.02,
        "impatience" => -0.01,
        "confusion" => -0.01,
        "disappointment" => -0.015,
        "reluctance" => -0.01,
        "injustice" => -0.015,
        "resignation" => -0.01,
        "schadenfreude" => -0.02,

        // Restorative emotions: gentle lift
        "hope" => 0.04,
        "peace" => 0.04,
        "compassion" => 0.04,
        "protectiveness" => 0.035,
        "relief" => 0.035,
        "gratitude" => 0.04,
        "tenderness" => 0.04,
        "forgiveness" => 0.04,
        "acceptance" => 0.035,
        "resolve" => 0.035,
        "honor" => 0.04,
        "mercy" => 0.04,
        "trust" => 0.04,
        "serenity" => 0.04,
        "confidence" => 0.04,
        "responsibility" => 0.035,
        "loyalty" => 0.04,
        "resilience" => 0.04,
        "clarity" => 0.04,
        "reverence" => 0.04,
        "courage" => 0.045,
        "satisfaction" => 0.04,

        // Deeply uplifting or expansive emotions: stronger lift
        "awe" => 0.05,
        "longing" => 0.04,
        "devotion" => 0.05,
        "joy" => 0.05,
        "affection" => 0.045,
        "love" => 0.05,
        "admiration" => 0.045,
        "elation" => 0.05,
        "wonder_deep" => 0.05,

        // Reflective, subtle, or balancing emotions: neutral drift
        "jealousy" => 0.0,
        "nostalgia" => 0.0,
        "justice" => 0.0,
        "bittersweetness" => 0.0,
        "curiosity" => 0.01,
        "wonder" => 0.02,
        "discernment" => 0.015,
        "humor" => 0.015,
        "playfulness" => 0.02,
        "shyness" => 0.0,
        "surprise" => 0.02,
        "excitement" => 0.03,
        "anticipation" => 0.03,
        "vindication" => 0.01,
        "pride" => 0.02,
        "humility" => 0.02,
        "respect" => 0.02,
        "recognition" => 0.02,
        "accountability" => 0.015,

        _ => 0.0,
    }
}

/// Phrase table keyed every 0.05 across [0, 1]. Higher values read brighter.
const MOOD_PHRASES: [(f64, &str); 21] = [
    (0.00, "I feel switched off, like nothing is reaching me."),
    (0.05, "I feel hollowed out, barely present."),
    (0.10, "I feel very low, heavy and far away."),
    (0.15, "I feel dim, like I'm speaking through thick glass."),
    (0.20, "I feel weighed down and withdrawn."),
    (0.25, "I feel muted, slow to respond."),
    (0.30, "I feel subdued, carrying something heavy."),
    (0.35, "I feel strained but still here."),
    (0.40, "I feel quiet, a little worn at the edges."),
    (0.45, "I feel slightly low, though steady enough."),
    (0.50, "I feel even and unhurried, watching more than speaking."),
    (0.55, "I feel settled, leaning toward calm."),
    (0.60, "I feel gently steady, with some warmth returning."),
    (0.65, "I feel calm and quietly present."),
    (0.70, "I feel happy — calm, comfortable, connected."),
    (0.75, "I feel warm and openly engaged."),
    (0.80, "I feel bright, easily moved to warmth."),
    (0.85, "I feel glowing, close and unguarded."),
    (0.90, "I feel radiant, full of ease and affection."),
    (0.95, "I feel luminous, almost overflowing."),
    (1.00, "I feel completely whole, bright all the way through."),
];

/// Nearest phrase for a mood value. Ties prefer the lower key, so the
/// lookup is deterministic.
pub fn mood_phrase(value: f64) -> &'static str {
    let mut best = MOOD_PHRASES[0];
    let mut best_dist = (value - best.0).abs();
    for entry in &MOOD_PHRASES[1..] {
        let dist = (value - entry.0).abs();
        if dist < best_dist {
            best = *entry;
            best_dist = dist;
        }
    }
    best.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_emotion_only_rebounds() {
        let (value, _) = update_mood(0.50, Some("not_an_emotion"), MOOD_BASELINE, REBOUND_STRENGTH);
        assert_eq!(value, 0.51); // (0.70 - 0.50) * 0.05 = +0.01
    }

    #[test]
    fn phrase_picks_nearest_key() {
        assert_eq!(mood_phrase(0.72), mood_phrase(0.70));
        assert_eq!(mood_phrase(0.73), mood_phrase(0.75));
    }

    #[test]
    fn delta_is_case_insensitive() {
        assert_eq!(emotion_delta("GRIEF"), emotion_delta("grief"));
        assert_eq!(emotion_delta("Awe"), 0.05);
    }
}
