use std::collections::BTreeMap;

use anima::memory::session::{SessionMemory, TraceEntry};
use anima::mood::mood_phrase;
use anima::resonance::{PatternMatch, ResonantAnchor};

fn emotions(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn fresh_session_starts_at_mood_baseline() {
    let session = SessionMemory::new("You are a steady companion.");
    assert_eq!(session.mood().value, 0.70);
    assert_eq!(session.mood().phrase, mood_phrase(0.70));
    assert_eq!(session.message_count(), 0);
    assert!(session.personality_trace().is_empty());
}

#[test]
fn prompt_carries_system_and_recent_window() {
    let mut session = SessionMemory::new("persona text");
    for i in 0..8 {
        session.add_user_message(&format!("user {i}"));
        session.add_agent_message(&format!("reply {i}"));
    }

    let (system, messages) = session.build_prompt(6);
    assert_eq!(system, "persona text");
    assert_eq!(messages.len(), 6);
    // Window keeps the most recent messages in order
    assert_eq!(messages[0].content, "user 5");
    assert_eq!(messages[5].content, "reply 7");
}

#[test]
fn window_smaller_than_history_returns_everything() {
    let mut session = SessionMemory::new("persona");
    session.add_user_message("hello");

    let recent = session.recent_messages(10);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].role, "user");
}

#[test]
fn last_messages_track_both_sides() {
    let mut session = SessionMemory::new("persona");
    session.add_user_message("how are you?");
    session.add_agent_message("steady, thank you");

    assert_eq!(session.last_user_message(), Some("how are you?"));
    assert_eq!(session.last_reply(), Some("steady, thank you"));
}

#[test]
fn emotion_log_keeps_a_rolling_window() {
    let mut session = SessionMemory::new("persona");
    for i in 0..5 {
        session.store_user_emotions(emotions(&[("grief", 0.2 + i as f32 * 0.1)]));
    }

    let recent = session.recent_user_emotions(3);
    assert_eq!(recent.len(), 3);
    assert!((recent[0].emotions["grief"] - 0.4).abs() < 1e-6);
    assert!((recent[2].emotions["grief"] - 0.6).abs() < 1e-6);
}

#[test]
fn empty_emotion_maps_are_not_logged() {
    let mut session = SessionMemory::new("persona");
    session.store_user_emotions(BTreeMap::new());
    assert!(session.recent_user_emotions(3).is_empty());
}

#[test]
fn resonance_logs_accumulate_in_order() {
    let mut session = SessionMemory::new("persona");
    session.store_value_resonance(&[ResonantAnchor {
        label: "honesty before comfort".to_string(),
        score: 0.62,
        metadata: serde_json::Value::Null,
    }]);
    session.store_pattern_matches(&[PatternMatch {
        label: "quiet perfectionism".to_string(),
        score: 0.44,
        percent: 100.0,
        metadata: serde_json::Value::Null,
    }]);

    assert_eq!(session.value_resonance().len(), 1);
    assert_eq!(session.pattern_log().len(), 1);
    assert!(session.fragment_resonance().is_empty());
}

#[test]
fn summary_describes_recent_emotional_flow() {
    let mut session = SessionMemory::new("persona");
    session.store_user_emotions(emotions(&[("grief", 0.7), ("hope", 0.3)]));
    session.store_agent_emotion("tenderness", 0.8);
    session.push_summary("They spoke about their brother.".to_string());

    let summary = session.build_summary(3);
    assert!(summary.contains("grief"));
    assert!(summary.contains("tenderness"));
    assert!(summary.contains("their brother"));
}

#[test]
fn summary_is_empty_for_a_fresh_session() {
    let session = SessionMemory::new("persona");
    assert!(session.build_summary(3).is_empty());
}

#[test]
fn mood_updates_replace_state() {
    let mut session = SessionMemory::new("persona");
    session.set_mood(0.55, mood_phrase(0.55));
    assert_eq!(session.mood().value, 0.55);
    assert_eq!(session.mood().phrase, mood_phrase(0.55));
}

#[test]
fn trace_entries_accumulate_per_turn() {
    let mut session = SessionMemory::new("persona");
    for i in 0..3 {
        session.push_trace(TraceEntry {
            timestamp: chrono::Utc::now(),
            user_input: format!("input {i}"),
            reply: format!("reply {i}"),
            value_resonances: vec![],
            fragment_resonances: vec![],
            pattern_resonances: vec![],
            user_emotions: vec![],
            internal_effects: vec![],
        });
    }
    assert_eq!(session.personality_trace().len(), 3);
    assert_eq!(session.personality_trace()[2].user_input, "input 2");
}
