//! Long-term memory roll-up.
//!
//! A three-level exponential summarization hierarchy per user: per-session
//! personality fragments compress into soul sketches (every 5 fragments),
//! and sketches compress into a single soul picture (every 5 sketches).
//! Each level is a synchronous model call made inside the triggering turn,
//! so the fragment list can never race with itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::RollupConfig;
use crate::error::StructuredOutputError;
use crate::memory::session::SessionMemory;
use crate::provider::structured::parse_structured;
use crate::provider::{ChatMessage, ChatProvider};
use crate::relationship::RelationshipTracker;
use crate::resonance::MoralResonance;
use crate::store::{load_json, save_json};

/// Shown in prompts when a user has no long-term memory at all.
pub const NO_CONTEXT_SENTINEL: &str = "No long-term impressions recorded yet.";

/// Level 1: one per session, the evolving per-conversation memory unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalityFragment {
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub personality_snapshot: String,
    pub emotional_understanding: String,
    pub session_story: String,
    /// Applied through the relationship tracker's raw-delta path.
    pub relationship_delta: f64,
    pub reason_for_score: String,
}

/// Level 2: a chapter marker synthesized from five fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoulSketch {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub soul_sketch: String,
    pub user_story_summary: String,
}

/// Level 3: the single long-horizon identity portrait. Overwritten on
/// regeneration, never accumulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoulPicture {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub soul_picture: String,
    pub user_story_summary: String,
    pub final_reflection: String,
}

/// What a fragment addition triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupOutcome {
    FragmentStored,
    SketchGenerated,
    PictureGenerated,
}

#[derive(Debug, Deserialize)]
struct FragmentDraft {
    personality_snapshot: String,
    emotional_understanding: String,
    session_story: String,
    relationship_delta: f64,
    reason_for_score: String,
}

#[derive(Debug, Deserialize)]
struct SketchDraft {
    soul_sketch: String,
    user_story_summary: String,
}

#[derive(Debug, Deserialize)]
struct PictureDraft {
    soul_picture: String,
    user_story_summary: String,
    final_reflection: String,
}

/// Per-user long-term memory engine with its three JSON-backed stores.
pub struct PersonalityMemory {
    fragments_path: PathBuf,
    sketches_path: PathBuf,
    pictures_path: PathBuf,
    fragments: HashMap<String, Vec<PersonalityFragment>>,
    sketches: HashMap<String, Vec<SoulSketch>>,
    pictures: HashMap<String, SoulPicture>,
    rollup: RollupConfig,
}

impl PersonalityMemory {
    pub fn open(
        fragments_path: PathBuf,
        sketches_path: PathBuf,
        pictures_path: PathBuf,
        rollup: RollupConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            fragments: load_json(&fragments_path)?,
            sketches: load_json(&sketches_path)?,
            pictures: load_json(&pictures_path)?,
            fragments_path,
            sketches_path,
            pictures_path,
            rollup,
        })
    }

    pub fn fragments(&self, user_id: &str) -> &[PersonalityFragment] {
        self.fragments.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sketches(&self, user_id: &str) -> &[SoulSketch] {
        self.sketches.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn picture(&self, user_id: &str) -> Option<&SoulPicture> {
        self.pictures.get(user_id)
    }

    /// Bank a fragment and run any roll-up it triggers.
    ///
    /// The fragment's relationship delta is applied immediately through the
    /// tracker's raw path. Sketch and picture generation happen synchronously
    /// here; on a generation failure the triggering list is left intact (the
    /// `>=` check retries at the next accumulation) so a transient failure
    /// cannot lose memory.
    pub async fn add_fragment(
        &mut self,
        fragment: PersonalityFragment,
        chat: &dyn ChatProvider,
        tracker: &mut RelationshipTracker,
    ) -> anyhow::Result<RollupOutcome> {
        let user_id = fragment.user_id.clone();

        if fragment.relationship_delta != 0.0 {
            tracker.apply_score_delta(&user_id, fragment.relationship_delta)?;
        }

        self.fragments
            .entry(user_id.clone())
            .or_default()
            .push(fragment);
        self.persist()?;

        let mut outcome = RollupOutcome::FragmentStored;

        if self.fragments(&user_id).len() >= self.rollup.fragments_per_sketch {
            match self.generate_sketch(&user_id, chat).await {
                Ok(sketch) => {
                    self.sketches.entry(user_id.clone()).or_default().push(sketch);
                    self.fragments.insert(user_id.clone(), Vec::new());
                    self.persist()?;
                    info!(%user_id, "soul sketch generated, fragments cleared");
                    outcome = RollupOutcome::SketchGenerated;
                }
                Err(e) => {
                    warn!(%user_id, error = %e, "sketch generation failed, roll-up skipped");
                    return Ok(outcome);
                }
            }
        }

        if self.sketches(&user_id).len() >= self.rollup.sketches_per_picture {
            match self.generate_picture(&user_id, chat).await {
                Ok(picture) => {
                    self.pictures.insert(user_id.clone(), picture);
                    // Sketches are cleared once compressed, mirroring the
                    // fragment cycle; the picture itself is overwritten on
                    // each regeneration.
                    self.sketches.insert(user_id.clone(), Vec::new());
                    self.persist()?;
                    info!(%user_id, "soul picture generated, sketches cleared");
                    outcome = RollupOutcome::PictureGenerated;
                }
                Err(e) => {
                    warn!(%user_id, error = %e, "picture generation failed, roll-up skipped");
                }
            }
        }

        Ok(outcome)
    }

    /// Generate the per-session fragment from the session's personality
    /// trace. Returns `None` if the model output cannot be parsed; a missing
    /// fragment is preferable to a malformed one entering long-term memory.
    pub async fn generate_fragment(
        &self,
        user_id: &str,
        session: &SessionMemory,
        moral: &MoralResonance,
        chat: &dyn ChatProvider,
    ) -> Option<PersonalityFragment> {
        let last_fragment = self.fragments(user_id).last();

        let trace = serde_json::to_string(session.personality_trace()).unwrap_or_default();
        let previous = last_fragment
            .map(|f| f.personality_snapshot.clone())
            .unwrap_or_else(|| "none yet".to_string());
        let values: Vec<&str> = moral.values.iter().map(|v| v.label.as_str()).collect();

        let system = "You distill one conversation session into a personality memory \
                      fragment for long-term storage.\n\
                      Answer with ONLY a JSON object of this exact shape:\n\
                      {\"personality_snapshot\": \"...\", \
                      \"emotional_understanding\": \"...\", \
                      \"session_story\": \"...\", \
                      \"relationship_delta\": <number between -10 and 10>, \
                      \"reason_for_score\": \"...\"}\n\
                      Ground every field in the trace. No prose outside the JSON.";
        let prompt = format!(
            "Previous personality snapshot: {previous}\n\
             Values that resonated this session: {}\n\
             Session trace (JSON):\n{trace}",
            values.join(", ")
        );
        let messages = [ChatMessage::new("user", prompt)];

        let raw = match chat.complete(system, &messages, 0.6, Some(1024)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user_id, error = %e, "fragment generation call failed");
                return None;
            }
        };

        match parse_structured::<FragmentDraft>("personality fragment", &raw) {
            Ok(draft) => Some(PersonalityFragment {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                timestamp: Utc::now(),
                personality_snapshot: draft.personality_snapshot,
                emotional_understanding: draft.emotional_understanding,
                session_story: draft.session_story,
                relationship_delta: draft.relationship_delta.clamp(-10.0, 10.0),
                reason_for_score: draft.reason_for_score,
            }),
            Err(e) => {
                warn!(user_id, error = %e, "fragment output unparseable, skipped");
                None
            }
        }
    }

    /// Long-term context for prompt assembly, in priority order: picture,
    /// then latest sketch, then latest fragment. Whenever a higher layer is
    /// present, the most recent fragment (if any) is still appended for
    /// continuity with the current cycle.
    pub fn get_personality_context(&self, user_id: &str) -> String {
        let trailing_fragment = self.fragments(user_id).last().map(|f| {
            format!(
                "Most recent impression: {}\nWhat I understood: {}",
                f.personality_snapshot, f.emotional_understanding
            )
        });

        if let Some(picture) = self.picture(user_id) {
            let mut context = format!(
                "Who they are, over the long arc: {}\nTheir story: {}\nMy reflection: {}",
                picture.soul_picture, picture.user_story_summary, picture.final_reflection
            );
            if let Some(fragment) = trailing_fragment {
                context.push('\n');
                context.push_str(&fragment);
            }
            return context;
        }

        if let Some(sketch) = self.sketches(user_id).last() {
            let mut context = format!(
                "Who they are becoming: {}\nTheir story so far: {}",
                sketch.soul_sketch, sketch.user_story_summary
            );
            if let Some(fragment) = trailing_fragment {
                context.push('\n');
                context.push_str(&fragment);
            }
            return context;
        }

        trailing_fragment.unwrap_or_else(|| NO_CONTEXT_SENTINEL.to_string())
    }

    async fn generate_sketch(
        &self,
        user_id: &str,
        chat: &dyn ChatProvider,
    ) -> Result<SoulSketch, StructuredOutputError> {
        let fragments = self.fragments(user_id);
        let formatted: Vec<String> = fragments
            .iter()
            .enumerate()
            .map(|(i, f)| {
                format!(
                    "Fragment {}:\nSnapshot: {}\nUnderstanding: {}\nStory: {}",
                    i + 1,
                    f.personality_snapshot,
                    f.emotional_understanding,
                    f.session_story
                )
            })
            .collect();

        let system = "You synthesize five session fragments into a soul sketch: a \
                      4-6 line portrait of who this person is, plus a 4-6 line \
                      emotionally truthful summary of their story so far.\n\
                      Answer with ONLY a JSON object:\n\
                      {\"soul_sketch\": \"...\", \"user_story_summary\": \"...\"}";
        let messages = [ChatMessage::new("user", formatted.join("\n\n"))];

        let raw = chat
            .complete(system, &messages, 0.6, Some(1024))
            .await
            .map_err(|e| StructuredOutputError::new("soul sketch", e.to_string()))?;

        let draft: SketchDraft = parse_structured("soul sketch", &raw)?;
        Ok(SoulSketch {
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            soul_sketch: draft.soul_sketch,
            user_story_summary: draft.user_story_summary,
        })
    }

    async fn generate_picture(
        &self,
        user_id: &str,
        chat: &dyn ChatProvider,
    ) -> Result<SoulPicture, StructuredOutputError> {
        let sketches = self.sketches(user_id);
        let latest = &sketches[sketches.len().saturating_sub(self.rollup.sketches_per_picture)..];
        let formatted: Vec<String> = latest
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "Sketch {} ({}):\n{}\nStory: {}",
                    i + 1,
                    s.timestamp.format("%Y-%m-%d"),
                    s.soul_sketch,
                    s.user_story_summary
                )
            })
            .collect();

        let system = "You compress five soul sketches into a soul picture: a 5-7 line \
                      lifespan-level character portrait, a 10-12 line factual and \
                      emotionally truthful story summary, and your own final \
                      reflection on this person.\n\
                      Answer with ONLY a JSON object:\n\
                      {\"soul_picture\": \"...\", \"user_story_summary\": \"...\", \
                      \"final_reflection\": \"...\"}";
        let messages = [ChatMessage::new("user", formatted.join("\n\n"))];

        let raw = chat
            .complete(system, &messages, 0.7, Some(1536))
            .await
            .map_err(|e| StructuredOutputError::new("soul picture", e.to_string()))?;

        let draft: PictureDraft = parse_structured("soul picture", &raw)?;
        Ok(SoulPicture {
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            soul_picture: draft.soul_picture,
            user_story_summary: draft.user_story_summary,
            final_reflection: draft.final_reflection,
        })
    }

    fn persist(&self) -> anyhow::Result<()> {
        save_json(&self.fragments_path, &self.fragments)?;
        save_json(&self.sketches_path, &self.sketches)?;
        save_json(&self.pictures_path, &self.pictures)
    }
}
