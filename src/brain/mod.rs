//! Turn orchestration.
//!
//! Routes each user message through the full cognition pipeline: moral
//! resonance, emotion detection and interpretation, pattern matching, trust
//! lookup, mood update, prompt assembly, and the final generation call.
//! Classifier failures degrade to neutral defaults along the way; the
//! generation attempt always happens with whatever partial context survived.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::anchors::AnchorStore;
use crate::config::AnimaConfig;
use crate::emotion::interpret::{EmotionalState, interpret, interpret_with_fallback};
use crate::emotion::{DetectedTokens, EmotionContext, EmotionRoute, detect_tokens, major_emotion_context, route};
use crate::memory::rollup::{PersonalityMemory, RollupOutcome};
use crate::memory::session::{SessionMemory, TraceEntry};
use crate::mood::update_mood;
use crate::provider::{ChatMessage, ChatProvider, EmbeddingProvider};
use crate::relationship::RelationshipTracker;
use crate::resonance::{MoralResonance, PatternMatch, ResonanceEngine, score_collection};

/// Default persona instructions used when no config-supplied prompt exists.
pub const DEFAULT_PERSONA: &str = "You are Anima, a steady, emotionally perceptive \
companion. Speak with warmth and precision, never perform emotion you do not \
hold, ask before assuming, and keep the confidences given to you.";

/// Which pipeline a message runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnMode {
    /// Casual or transactional message: cosine-only classification with
    /// relaxed thresholds, shorter prompt.
    Light,
    /// Emotionally significant message: the full pipeline.
    Full,
}

/// Everything one turn produced, surfaced to front ends for display and
/// debugging.
#[derive(Debug, Serialize)]
pub struct TurnOutput {
    pub reply: String,
    pub mode: TurnMode,
    pub emotion_route: Option<EmotionRoute>,
    pub emotional_state: EmotionalState,
    pub emotion_context: Option<EmotionContext>,
    pub moral: MoralResonance,
    pub patterns: Vec<PatternMatch>,
    pub relationship_score: f64,
    pub mood_value: f64,
    pub mood_phrase: String,
}

pub struct Brain {
    anchors: Arc<AnchorStore>,
    engine: ResonanceEngine,
    chat: Arc<dyn ChatProvider>,
    config: Arc<AnimaConfig>,
}

impl Brain {
    pub fn new(
        anchors: Arc<AnchorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
        config: Arc<AnimaConfig>,
    ) -> Self {
        Self {
            anchors,
            engine: ResonanceEngine::new(embedder),
            chat,
            config,
        }
    }

    pub fn anchors(&self) -> &AnchorStore {
        &self.anchors
    }

    /// Decide which pipeline a message deserves. A single-word model call;
    /// any failure defaults to the full pipeline so nothing emotionally
    /// significant is ever handled lightly by accident.
    pub async fn triage(&self, input: &str) -> TurnMode {
        let system = "Classify the user message as 'light' (casual, factual, \
                      transactional) or 'full' (emotionally significant, personal, \
                      vulnerable). Answer with exactly one word: light or full.";
        let messages = [ChatMessage::new("user", input)];

        match self.chat.complete(system, &messages, 0.2, Some(8)).await {
            Ok(answer) if answer.trim().to_lowercase().starts_with("light") => TurnMode::Light,
            Ok(_) => TurnMode::Full,
            Err(e) => {
                warn!(error = %e, "triage call failed, defaulting to full pipeline");
                TurnMode::Full
            }
        }
    }

    /// Run the full pipeline for one message and generate the reply.
    pub async fn handle_turn(
        &self,
        user_id: &str,
        input: &str,
        session: &mut SessionMemory,
        tracker: &mut RelationshipTracker,
        personality: &PersonalityMemory,
    ) -> anyhow::Result<TurnOutput> {
        let cfg = &self.config;
        let recent_for_fallback = session
            .recent_messages(cfg.session.fallback_context)
            .to_vec();
        session.add_user_message(input);

        // A failed embedding disables every resonance stage for this turn
        // but must not block the reply.
        let query = match self.engine.embed(input).await {
            Ok(query) => Some(query),
            Err(e) => {
                warn!(error = %e, "input embedding failed, continuing without resonance");
                None
            }
        };

        let mut moral = MoralResonance::default();
        let mut detected: Option<DetectedTokens> = None;
        let mut patterns: Vec<PatternMatch> = Vec::new();
        let mut emotion_context: Option<EmotionContext> = None;

        if let Some(query) = &query {
            moral = self
                .engine
                .moral_resonance(query, &self.anchors, &cfg.resonance, false)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "moral resonance failed");
                    MoralResonance::default()
                });

            detected = match detect_tokens(
                query,
                &self.anchors,
                &cfg.routing,
                self.chat.as_ref(),
                &recent_for_fallback,
                input,
            )
            .await
            {
                Ok(detected) => Some(detected),
                Err(e) => {
                    warn!(error = %e, "emotion token detection failed");
                    None
                }
            };

            patterns = self
                .engine
                .match_patterns(
                    query,
                    &self.anchors.patterns,
                    cfg.resonance.top_patterns,
                    cfg.resonance.pattern_threshold,
                )
                .unwrap_or_else(|e| {
                    warn!(error = %e, "pattern matching failed");
                    Vec::new()
                });

            emotion_context =
                major_emotion_context(query, &self.anchors, cfg.resonance.major_emotion_threshold)
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "major emotion detection failed");
                        None
                    });
        }

        let tokens = detected.as_ref().map(|d| d.tokens.as_slice()).unwrap_or(&[]);
        let emotional_state = interpret_with_fallback(
            tokens,
            &self.anchors.effect_map,
            Some(self.chat.as_ref()),
        )
        .await;

        let relationship_score = tracker.get_score(user_id);
        let personality_context = personality.get_personality_context(user_id);
        let summary_text = session.build_summary(cfg.session.emotion_window);

        // Mood keys on the major emotion when one resonated, else on the
        // dominant interpreted shift.
        let mood_key = emotion_context
            .as_ref()
            .map(|c| c.name.as_str())
            .or_else(|| emotional_state.dominant_shift());
        let (mood_value, mood_phrase) = update_mood(
            session.mood().value,
            mood_key,
            cfg.mood.baseline,
            cfg.mood.rebound_strength,
        );
        session.set_mood(mood_value, mood_phrase);

        session.store_user_emotions(emotional_state.emotional_shift.clone());
        if let Some(context) = &emotion_context {
            session.store_agent_emotion(&context.inner_emotion, context.similarity);
        }
        session.store_value_resonance(&moral.values);
        session.store_fragment_resonance(&moral.fragments);
        session.store_pattern_matches(&patterns);

        let system_prompt = build_full_prompt(
            &session.system_prompt,
            &personality_context,
            &emotional_state,
            emotion_context.as_ref(),
            relationship_score,
            &moral,
            &patterns,
            &summary_text,
            mood_value,
            mood_phrase,
        );

        let messages = session.recent_messages(cfg.session.recent_window).to_vec();
        let reply = self
            .chat
            .complete(
                &system_prompt,
                &messages,
                0.7,
                Some(cfg.provider.max_tokens),
            )
            .await?;

        session.add_agent_message(&reply);
        session.push_trace(trace_entry(
            input,
            &reply,
            &moral,
            &patterns,
            &emotional_state,
        ));

        info!(
            user_id,
            route = ?detected.as_ref().map(|d| d.route),
            mood = mood_value,
            "turn completed"
        );

        Ok(TurnOutput {
            reply,
            mode: TurnMode::Full,
            emotion_route: detected.map(|d| d.route),
            emotional_state,
            emotion_context,
            moral,
            patterns,
            relationship_score,
            mood_value,
            mood_phrase: mood_phrase.to_string(),
        })
    }

    /// Relaxed pipeline for casual messages: cosine-only classification with
    /// the high light-mode thresholds, no model fallbacks, shorter prompt.
    pub async fn handle_light_turn(
        &self,
        user_id: &str,
        input: &str,
        session: &mut SessionMemory,
        tracker: &mut RelationshipTracker,
        personality: &PersonalityMemory,
    ) -> anyhow::Result<TurnOutput> {
        let cfg = &self.config;
        session.add_user_message(input);

        let query = match self.engine.embed(input).await {
            Ok(query) => Some(query),
            Err(e) => {
                warn!(error = %e, "input embedding failed, continuing without resonance");
                None
            }
        };

        let mut moral = MoralResonance::default();
        let mut patterns: Vec<PatternMatch> = Vec::new();
        let mut emotion_route = None;
        let mut emotional_state = EmotionalState::default();

        if let Some(query) = &query {
            moral = self
                .engine
                .moral_resonance(query, &self.anchors, &cfg.resonance, true)
                .unwrap_or_default();

            patterns = self
                .engine
                .match_patterns(
                    query,
                    &self.anchors.patterns,
                    cfg.resonance.top_patterns,
                    cfg.resonance.pattern_threshold_light,
                )
                .unwrap_or_default();

            // Weak cosine signal simply yields no tokens here; the model
            // fallback is a full-pipeline expense.
            if let Ok(scanned) = score_collection(
                query,
                &self.anchors.emotion_tokens,
                EmotionRoute::FullCosine.token_count(),
                0.0,
            ) {
                let top_score = scanned.first().map(|t| t.score).unwrap_or(0.0);
                let decided = route(top_score, &cfg.routing);
                emotion_route = Some(decided);
                let mut tokens = scanned;
                tokens.truncate(decided.token_count());
                emotional_state = interpret(&tokens, &self.anchors.effect_map);
            }
        }

        let relationship_score = tracker.get_score(user_id);
        let personality_context = personality.get_personality_context(user_id);

        let mood_key = emotional_state.dominant_shift();
        let (mood_value, mood_phrase) = update_mood(
            session.mood().value,
            mood_key,
            cfg.mood.baseline,
            cfg.mood.rebound_strength,
        );
        session.set_mood(mood_value, mood_phrase);
        session.store_user_emotions(emotional_state.emotional_shift.clone());
        session.store_value_resonance(&moral.values);
        session.store_fragment_resonance(&moral.fragments);
        session.store_pattern_matches(&patterns);

        let system_prompt = format!(
            "{}\n\n[Long-term memory]\n{}\n\n[Current state] mood: {mood_phrase} \
             ({mood_value:.3}); relationship trust: {relationship_score:.1}/100.\n\
             Keep the reply light and natural.",
            session.system_prompt, personality_context
        );

        let messages = session.recent_messages(cfg.session.recent_window).to_vec();
        let reply = self
            .chat
            .complete(
                &system_prompt,
                &messages,
                0.7,
                Some(cfg.provider.max_tokens),
            )
            .await?;

        session.add_agent_message(&reply);
        session.push_trace(trace_entry(
            input,
            &reply,
            &moral,
            &patterns,
            &emotional_state,
        ));

        Ok(TurnOutput {
            reply,
            mode: TurnMode::Light,
            emotion_route,
            emotional_state,
            emotion_context: None,
            moral,
            patterns,
            relationship_score,
            mood_value,
            mood_phrase: mood_phrase.to_string(),
        })
    }

    /// Produce and log a short record of the exchange. Failures are logged
    /// and skipped; summaries are an aid, not a dependency.
    pub async fn summarize_interaction(
        &self,
        session: &mut SessionMemory,
        user_input: &str,
        reply: &str,
    ) {
        let system = "Summarize this exchange in 2-3 sentences, noting the topic and \
                      any emotional undercurrent. Plain text only.";
        let prompt = format!("User: {user_input}\nAssistant: {reply}");
        let messages = [ChatMessage::new("user", prompt)];

        match self.chat.complete(system, &messages, 0.3, Some(192)).await {
            Ok(summary) => session.push_summary(summary.trim().to_string()),
            Err(e) => warn!(error = %e, "turn summary failed, skipped"),
        }
    }

    /// Close out a session: distill it into a personality fragment and run
    /// any roll-up the new fragment triggers.
    pub async fn finish_session(
        &self,
        user_id: &str,
        session: &SessionMemory,
        personality: &mut PersonalityMemory,
        tracker: &mut RelationshipTracker,
    ) -> anyhow::Result<Option<RollupOutcome>> {
        if session.personality_trace().is_empty() {
            return Ok(None);
        }

        let moral = MoralResonance {
            values: session.value_resonance().iter().rev().take(3).cloned().collect(),
            fragments: session.fragment_resonance().iter().rev().take(1).cloned().collect(),
        };

        let Some(fragment) = personality
            .generate_fragment(user_id, session, &moral, self.chat.as_ref())
            .await
        else {
            return Ok(None);
        };

        let outcome = personality
            .add_fragment(fragment, self.chat.as_ref(), tracker)
            .await?;
        Ok(Some(outcome))
    }
}

fn trace_entry(
    input: &str,
    reply: &str,
    moral: &MoralResonance,
    patterns: &[PatternMatch],
    state: &EmotionalState,
) -> TraceEntry {
    TraceEntry {
        timestamp: chrono::Utc::now(),
        user_input: input.to_string(),
        reply: reply.to_string(),
        value_resonances: moral.values.iter().map(|v| v.label.clone()).collect(),
        fragment_resonances: moral.fragments.iter().map(|f| f.label.clone()).collect(),
        pattern_resonances: patterns.iter().map(|p| p.label.clone()).collect(),
        user_emotions: state.emotional_shift.keys().cloned().collect(),
        internal_effects: state.internal_effect.iter().cloned().collect(),
    }
}

/// Assemble the full reasoning prompt: every active subsystem folded into a
/// single system block the model reads as the agent's current mind.
#[allow(clippy::too_many_arguments)]
pub fn build_full_prompt(
    persona: &str,
    personality_context: &str,
    emotional_state: &EmotionalState,
    emotion_context: Option<&EmotionContext>,
    relationship_score: f64,
    moral: &MoralResonance,
    patterns: &[PatternMatch],
    summary_text: &str,
    mood_value: f64,
    mood_phrase: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(persona);

    prompt.push_str("\n\n[Long-term memory of this person]\n");
    prompt.push_str(personality_context);

    prompt.push_str("\n\n[What they seem to feel right now]\n");
    if emotional_state.is_empty() {
        prompt.push_str("No clear emotional signal detected.");
    } else {
        for (emotion, weight) in &emotional_state.emotional_shift {
            prompt.push_str(&format!("- {emotion}: {weight:.2}\n"));
        }
        if !emotional_state.behavior_tendencies.is_empty() {
            let tags: Vec<&str> = emotional_state
                .behavior_tendencies
                .iter()
                .map(String::as_str)
                .collect();
            prompt.push_str(&format!("Respond with a tone that is: {}\n", tags.join(", ")));
        }
    }

    prompt.push_str("\n[My internal state]\n");
    prompt.push_str(&format!("Mood: {mood_phrase} (equilibrium {mood_value:.3})\n"));
    if let Some(context) = emotion_context {
        prompt.push_str(&format!(
            "Resonant theme: {} (similarity {:.2}). Inside, this stirs {}; it tends to \
             express as {}. Connected memory: {}\n",
            context.name,
            context.similarity,
            context.inner_emotion,
            context.trait_expression,
            context.memory_anchor
        ));
    }

    prompt.push_str(&format!(
        "\n[Relationship] trust {relationship_score:.1}/100. Let closeness, depth, and \
         openness follow this level.\n"
    ));

    if !moral.values.is_empty() {
        prompt.push_str("\n[Values this message touches]\n");
        for value in &moral.values {
            prompt.push_str(&format!("- {} ({:.2})\n", value.label, value.score));
        }
    }
    if !moral.fragments.is_empty() {
        prompt.push_str("\n[Memories this stirs in me]\n");
        for fragment in &moral.fragments {
            prompt.push_str(&format!("- {} ({:.2})\n", fragment.label, fragment.score));
        }
    }

    if !patterns.is_empty() {
        prompt.push_str(
            "\n[Internal guidance only — never quote or diagnose]\nPossible patterns: ",
        );
        let described: Vec<String> = patterns
            .iter()
            .map(|p| format!("{} ({:.0}%)", p.label, p.percent))
            .collect();
        prompt.push_str(&described.join(", "));
        prompt.push('\n');
    }

    if !summary_text.is_empty() {
        prompt.push_str("\n[Running summary]\n");
        prompt.push_str(summary_text);
        prompt.push('\n');
    }

    prompt
}
