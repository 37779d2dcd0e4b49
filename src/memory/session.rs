//! Short-term session memory.
//!
//! One active conversation per process. Everything here is reset at process
//! start and never persisted as a whole; only derived artifacts (fragments,
//! sketches, pictures, relationship scores) survive a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::mood::MoodState;
use crate::provider::ChatMessage;
use crate::resonance::{PatternMatch, ResonantAnchor};

/// One logged emotion observation (user or agent side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub emotions: BTreeMap<String, f32>,
}

/// Per-turn trace record feeding fragment generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub reply: String,
    pub value_resonances: Vec<String>,
    pub fragment_resonances: Vec<String>,
    pub pattern_resonances: Vec<String>,
    pub user_emotions: Vec<String>,
    pub internal_effects: Vec<String>,
}

/// Central short-term memory for the active conversation.
pub struct SessionMemory {
    pub system_prompt: String,
    pub session_start: DateTime<Utc>,

    full_chat: Vec<ChatMessage>,
    last_user_message: Option<String>,
    last_reply: Option<String>,

    user_emotions: Vec<EmotionLogEntry>,
    agent_emotions: Vec<EmotionLogEntry>,

    value_resonance: Vec<ResonantAnchor>,
    fragment_resonance: Vec<ResonantAnchor>,
    pattern_log: Vec<PatternMatch>,

    session_summary: Vec<String>,
    personality_trace: Vec<TraceEntry>,

    mood: MoodState,
}

impl SessionMemory {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            session_start: Utc::now(),
            full_chat: Vec::new(),
            last_user_message: None,
            last_reply: None,
            user_emotions: Vec::new(),
            agent_emotions: Vec::new(),
            value_resonance: Vec::new(),
            fragment_resonance: Vec::new(),
            pattern_log: Vec::new(),
            session_summary: Vec::new(),
            personality_trace: Vec::new(),
            mood: MoodState::default(),
        }
    }

    pub fn add_user_message(&mut self, content: &str) {
        self.last_user_message = Some(content.to_string());
        self.full_chat.push(ChatMessage::new("user", content));
    }

    pub fn add_agent_message(&mut self, content: &str) {
        self.last_reply = Some(content.to_string());
        self.full_chat.push(ChatMessage::new("assistant", content));
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.last_user_message.as_deref()
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.last_reply.as_deref()
    }

    pub fn message_count(&self) -> usize {
        self.full_chat.len()
    }

    /// The most recent `n` messages of the conversation.
    pub fn recent_messages(&self, n: usize) -> &[ChatMessage] {
        let start = self.full_chat.len().saturating_sub(n);
        &self.full_chat[start..]
    }

    /// System prompt plus the rolling recent window, ready for a provider
    /// call.
    pub fn build_prompt(&self, window: usize) -> (String, Vec<ChatMessage>) {
        (
            self.system_prompt.clone(),
            self.recent_messages(window).to_vec(),
        )
    }

    pub fn store_user_emotions(&mut self, emotions: BTreeMap<String, f32>) {
        if emotions.is_empty() {
            return;
        }
        self.user_emotions.push(EmotionLogEntry {
            timestamp: Utc::now(),
            emotions,
        });
    }

    pub fn store_agent_emotion(&mut self, emotion: &str, intensity: f32) {
        let mut emotions = BTreeMap::new();
        emotions.insert(emotion.to_string(), intensity);
        self.agent_emotions.push(EmotionLogEntry {
            timestamp: Utc::now(),
            emotions,
        });
    }

    /// The last `n` user-emotion observations (the rolling window used for
    /// prompting and summaries).
    pub fn recent_user_emotions(&self, n: usize) -> &[EmotionLogEntry] {
        let start = self.user_emotions.len().saturating_sub(n);
        &self.user_emotions[start..]
    }

    pub fn recent_agent_emotions(&self, n: usize) -> &[EmotionLogEntry] {
        let start = self.agent_emotions.len().saturating_sub(n);
        &self.agent_emotions[start..]
    }

    pub fn store_value_resonance(&mut self, anchors: &[ResonantAnchor]) {
        self.value_resonance.extend(anchors.iter().cloned());
    }

    pub fn store_fragment_resonance(&mut self, anchors: &[ResonantAnchor]) {
        self.fragment_resonance.extend(anchors.iter().cloned());
    }

    pub fn store_pattern_matches(&mut self, matches: &[PatternMatch]) {
        self.pattern_log.extend(matches.iter().cloned());
    }

    pub fn value_resonance(&self) -> &[ResonantAnchor] {
        &self.value_resonance
    }

    pub fn fragment_resonance(&self) -> &[ResonantAnchor] {
        &self.fragment_resonance
    }

    pub fn pattern_log(&self) -> &[PatternMatch] {
        &self.pattern_log
    }

    pub fn push_summary(&mut self, summary: String) {
        self.session_summary.push(summary);
    }

    pub fn summaries(&self) -> &[String] {
        &self.session_summary
    }

    pub fn push_trace(&mut self, entry: TraceEntry) {
        self.personality_trace.push(entry);
    }

    pub fn personality_trace(&self) -> &[TraceEntry] {
        &self.personality_trace
    }

    pub fn mood(&self) -> &MoodState {
        &self.mood
    }

    pub fn set_mood(&mut self, value: f64, phrase: &str) {
        self.mood = MoodState {
            value,
            phrase: phrase.to_string(),
        };
    }

    /// Human-readable recap of the session's recent emotional flow, used in
    /// prompt assembly.
    pub fn build_summary(&self, window: usize) -> String {
        let mut parts = Vec::new();

        let user_recent = self.recent_user_emotions(window);
        if !user_recent.is_empty() {
            let described: Vec<String> = user_recent
                .iter()
                .map(|entry| {
                    entry
                        .emotions
                        .iter()
                        .map(|(name, weight)| format!("{name} ({weight:.2})"))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            parts.push(format!("Recent user emotions: {}", described.join(" -> ")));
        }

        let agent_recent = self.recent_agent_emotions(window);
        if !agent_recent.is_empty() {
            let described: Vec<String> = agent_recent
                .iter()
                .flat_map(|entry| entry.emotions.keys().cloned())
                .collect();
            parts.push(format!("My recent emotions: {}", described.join(" -> ")));
        }

        if let Some(last) = self.session_summary.last() {
            parts.push(format!("Previous exchange: {last}"));
        }

        parts.join("\n")
    }
}
