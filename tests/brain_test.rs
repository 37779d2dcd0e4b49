use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anima::anchors::{AnchorCollection, AnchorEntry, AnchorStore, TokenEffect};
use anima::brain::{Brain, TurnMode};
use anima::config::{AnimaConfig, RelationshipConfig, RollupConfig};
use anima::error::ProviderError;
use anima::memory::rollup::PersonalityMemory;
use anima::memory::session::SessionMemory;
use anima::provider::{ChatMessage, ChatProvider, EmbeddingProvider};
use anima::relationship::RelationshipTracker;

struct ScriptedChat {
    responses: Mutex<Vec<String>>,
}

impl ScriptedChat {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().rev().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<String, ProviderError> {
        self.responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ProviderError::MalformedResponse("script exhausted".into()))
    }
}

/// Embeds every text to the same fixed vector.
struct ConstantEmbedder {
    vector: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for ConstantEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.vector.clone())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

/// Always fails, as an unreachable embedding service would.
struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::MalformedResponse("service down".into()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::MalformedResponse("service down".into()))
    }
}

fn entry(label: &str, embedding: Vec<f32>) -> AnchorEntry {
    AnchorEntry {
        label: label.to_string(),
        embedding,
        metadata: serde_json::Value::Null,
    }
}

fn test_store() -> AnchorStore {
    let tokens = AnchorCollection::new(
        "emotion_tokens",
        vec![
            entry("joy:bright", vec![1.0, 0.0, 0.0]),
            entry("grief:quiet", vec![0.0, 1.0, 0.0]),
        ],
    )
    .unwrap();

    let mut effect_map = HashMap::new();
    effect_map.insert(
        "joy:bright".to_string(),
        TokenEffect {
            emotional_shift: vec!["joy".to_string()],
            behavior_tendencies: vec!["playful".to_string()],
            internal_effect: vec!["light".to_string()],
        },
    );

    AnchorStore::from_parts(
        tokens,
        AnchorCollection::empty("major_emotions"),
        AnchorCollection::empty("patterns"),
        AnchorCollection::new(
            "moral_values",
            vec![entry("honesty before comfort", vec![1.0, 0.0, 0.0])],
        )
        .unwrap(),
        AnchorCollection::empty("moral_fragments"),
        effect_map,
    )
}

struct Fixture {
    brain: Brain,
    session: SessionMemory,
    tracker: RelationshipTracker,
    personality: PersonalityMemory,
}

fn fixture(name: &str, embedder: Arc<dyn EmbeddingProvider>, chat: Arc<dyn ChatProvider>) -> Fixture {
    let dir: PathBuf = std::env::temp_dir().join(format!("anima_brain_{name}"));
    let _ = std::fs::remove_dir_all(&dir);

    let brain = Brain::new(
        Arc::new(test_store()),
        embedder,
        chat,
        Arc::new(AnimaConfig::default()),
    );
    let session = SessionMemory::new("You are a steady companion.");
    let tracker = RelationshipTracker::open(
        dir.join("relationships.json"),
        RelationshipConfig::default(),
    )
    .unwrap();
    let personality = PersonalityMemory::open(
        dir.join("fragments.json"),
        dir.join("sketches.json"),
        dir.join("pictures.json"),
        RollupConfig::default(),
    )
    .unwrap();

    Fixture {
        brain,
        session,
        tracker,
        personality,
    }
}

#[tokio::test]
async fn full_turn_classifies_generates_and_logs() {
    let chat = Arc::new(ScriptedChat::new(vec!["That sounds like a bright day."]));
    let embedder = Arc::new(ConstantEmbedder {
        vector: vec![1.0, 0.0, 0.0],
    });
    let mut fx = fixture("full_turn", embedder, chat);

    let output = fx
        .brain
        .handle_turn(
            "alice",
            "today was wonderful",
            &mut fx.session,
            &mut fx.tracker,
            &fx.personality,
        )
        .await
        .unwrap();

    assert_eq!(output.reply, "That sounds like a bright day.");
    assert_eq!(output.mode, TurnMode::Full);
    // Perfect alignment with the joy anchor: full cosine route, joy state
    assert!((output.emotional_state.emotional_shift["joy"] - 1.0).abs() < 1e-6);
    assert!(output.emotional_state.behavior_tendencies.contains("playful"));
    // Dominant shift keys the mood: rebound 0 at baseline, joy +0.05
    assert_eq!(output.mood_value, 0.75);
    // The moral value aligned too
    assert_eq!(output.moral.values.len(), 1);

    // Session state advanced
    assert_eq!(fx.session.message_count(), 2);
    assert_eq!(fx.session.personality_trace().len(), 1);
    assert_eq!(fx.session.mood().value, 0.75);
    assert_eq!(fx.session.value_resonance().len(), 1);
}

#[tokio::test]
async fn embedding_failure_still_produces_a_reply() {
    let chat = Arc::new(ScriptedChat::new(vec!["I'm here."]));
    let mut fx = fixture("broken_embed", Arc::new(BrokenEmbedder), chat);

    let output = fx
        .brain
        .handle_turn(
            "alice",
            "hello?",
            &mut fx.session,
            &mut fx.tracker,
            &fx.personality,
        )
        .await
        .unwrap();

    // Every resonance stage degraded to neutral, the reply still happened
    assert_eq!(output.reply, "I'm here.");
    assert!(output.emotional_state.is_empty());
    assert!(output.emotion_route.is_none());
    assert!(output.moral.values.is_empty());
}

#[tokio::test]
async fn generation_failure_surfaces_as_an_error() {
    let chat = Arc::new(ScriptedChat::new(vec![]));
    let embedder = Arc::new(ConstantEmbedder {
        vector: vec![1.0, 0.0, 0.0],
    });
    let mut fx = fixture("gen_fail", embedder, chat);

    let result = fx
        .brain
        .handle_turn(
            "alice",
            "hello",
            &mut fx.session,
            &mut fx.tracker,
            &fx.personality,
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn triage_parses_single_word_answers() {
    let embedder = Arc::new(ConstantEmbedder {
        vector: vec![1.0, 0.0, 0.0],
    });

    let chat = Arc::new(ScriptedChat::new(vec!["light"]));
    let fx = fixture("triage_light", embedder.clone(), chat);
    assert_eq!(fx.brain.triage("what time is it").await, TurnMode::Light);

    let chat = Arc::new(ScriptedChat::new(vec!["Full"]));
    let fx = fixture("triage_full", embedder.clone(), chat);
    assert_eq!(fx.brain.triage("I lost my father").await, TurnMode::Full);

    // Any failure defaults to the full pipeline
    let chat = Arc::new(ScriptedChat::new(vec![]));
    let fx = fixture("triage_err", embedder, chat);
    assert_eq!(fx.brain.triage("hello").await, TurnMode::Full);
}

#[tokio::test]
async fn light_turn_skips_model_classifiers() {
    // Script holds only the reply: a fallback call would exhaust it and fail
    let chat = Arc::new(ScriptedChat::new(vec!["Noted."]));
    // Orthogonal to every token anchor: cosine yields nothing in light mode
    let embedder = Arc::new(ConstantEmbedder {
        vector: vec![0.0, 0.0, 1.0],
    });
    let mut fx = fixture("light_turn", embedder, chat);

    let output = fx
        .brain
        .handle_light_turn(
            "alice",
            "remind me tomorrow",
            &mut fx.session,
            &mut fx.tracker,
            &fx.personality,
        )
        .await
        .unwrap();

    assert_eq!(output.mode, TurnMode::Light);
    assert_eq!(output.reply, "Noted.");
    assert!(output.emotional_state.is_empty());
    assert!(output.emotion_context.is_none());
}

#[tokio::test]
async fn summaries_accumulate_per_exchange() {
    let chat = Arc::new(ScriptedChat::new(vec!["They shared good news; tone was bright."]));
    let embedder = Arc::new(ConstantEmbedder {
        vector: vec![1.0, 0.0, 0.0],
    });
    let mut fx = fixture("summary", embedder, chat);

    fx.brain
        .summarize_interaction(&mut fx.session, "today was wonderful", "I'm glad.")
        .await;
    assert_eq!(fx.session.summaries().len(), 1);
    assert!(fx.session.summaries()[0].contains("good news"));
}

#[tokio::test]
async fn finish_session_banks_a_fragment() {
    let embedder = Arc::new(ConstantEmbedder {
        vector: vec![1.0, 0.0, 0.0],
    });
    // One reply, then the fragment draft for session close
    let chat = Arc::new(ScriptedChat::new(vec![
        "A good talk.",
        r#"{"personality_snapshot": "open-hearted", "emotional_understanding": "joy shared freely", "session_story": "a bright check-in", "relationship_delta": 2.0, "reason_for_score": "warmth"}"#,
    ]));
    let mut fx = fixture("finish", embedder, chat);

    fx.brain
        .handle_turn(
            "alice",
            "today was wonderful",
            &mut fx.session,
            &mut fx.tracker,
            &fx.personality,
        )
        .await
        .unwrap();

    let outcome = fx
        .brain
        .finish_session("alice", &fx.session, &mut fx.personality, &mut fx.tracker)
        .await
        .unwrap();

    assert!(outcome.is_some());
    assert_eq!(fx.personality.fragments("alice").len(), 1);
    // The fragment's delta reached the tracker through the raw path
    assert_eq!(fx.tracker.get_score("alice"), 2.0);
}

#[tokio::test]
async fn finish_session_with_no_turns_is_a_no_op() {
    let embedder = Arc::new(ConstantEmbedder {
        vector: vec![1.0, 0.0, 0.0],
    });
    let chat = Arc::new(ScriptedChat::new(vec![]));
    let mut fx = fixture("finish_empty", embedder, chat);

    let outcome = fx
        .brain
        .finish_session("alice", &fx.session, &mut fx.personality, &mut fx.tracker)
        .await
        .unwrap();
    assert!(outcome.is_none());
}
