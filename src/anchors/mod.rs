pub mod build;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::config::DataConfig;
use crate::error::AnchorError;

/// A pre-embedded reference concept: an emotion token, a major emotion, a
/// psychological pattern, or a moral anchor. Loaded once at startup and held
/// immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorEntry {
    pub label: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A named, immutable set of anchors with a uniform embedding dimension.
#[derive(Debug, Clone)]
pub struct AnchorCollection {
    name: String,
    entries: Vec<AnchorEntry>,
    dimension: usize,
}

impl AnchorCollection {
    /// Build a collection, validating that every entry shares one embedding
    /// dimension. A mismatch is an anchor-data integrity bug and is fatal.
    pub fn new(name: &str, entries: Vec<AnchorEntry>) -> Result<Self, AnchorError> {
        let dimension = entries.first().map(|e| e.embedding.len()).unwrap_or(0);
        for entry in &entries {
            if entry.embedding.len() != dimension {
                return Err(AnchorError::DimensionMismatch {
                    collection: name.to_string(),
                    expected: dimension,
                    actual: entry.embedding.len(),
                });
            }
        }
        Ok(Self {
            name: name.to_string(),
            entries,
            dimension,
        })
    }

    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
            dimension: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[AnchorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn get(&self, label: &str) -> Option<&AnchorEntry> {
        self.entries.iter().find(|e| e.label == label)
    }
}

/// Declared effects of one emotion token, consulted by the interpreter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenEffect {
    #[serde(default)]
    pub emotional_shift: Vec<String>,
    #[serde(default)]
    pub behavior_tendencies: Vec<String>,
    #[serde(default)]
    pub internal_effect: Vec<String>,
}

/// On-disk shape of one moral anchor entry.
#[derive(Debug, Clone, Deserialize)]
struct MoralAnchorRecord {
    #[serde(rename = "type")]
    kind: String,
    text: String,
    embedding: Vec<f32>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// The full static anchor bundle. Constructed once at startup and passed by
/// reference into every component that scores against it.
pub struct AnchorStore {
    /// Fine-grained emotion tokens, labels flattened to `category:subtoken`.
    pub emotion_tokens: AnchorCollection,
    /// High-level emotional themes with reaction/trait/memory metadata.
    pub major_emotions: AnchorCollection,
    /// Psychological patterns with description/root-cause/remedy metadata.
    pub patterns: AnchorCollection,
    /// Moral anchors, kind "value".
    pub moral_values: AnchorCollection,
    /// Moral anchors, kind "fragment".
    pub moral_fragments: AnchorCollection,
    /// Token label → declared effects.
    pub effect_map: HashMap<String, TokenEffect>,
}

impl AnchorStore {
    /// Load every anchor collection from the configured data files.
    ///
    /// Missing files, malformed JSON, and dimension mismatches are fatal
    /// here: silent degradation of the foundational data would corrupt the
    /// reasoning pipeline invisibly. Missing token→effect mappings are a
    /// warning only; the interpreter handles them per-turn via its fallback.
    pub fn load(data: &DataConfig) -> Result<Self, AnchorError> {
        let emotion_tokens = load_collection("emotion_tokens", &data.resolve(&data.emotion_tokens))?;
        let major_emotions = load_collection("major_emotions", &data.resolve(&data.major_emotions))?;
        let patterns = load_collection("patterns", &data.resolve(&data.patterns))?;
        let (moral_values, moral_fragments) = load_moral(&data.resolve(&data.moral))?;
        let effect_map = load_effect_map(&data.resolve(&data.effect_map))?;

        let store = Self {
            emotion_tokens,
            major_emotions,
            patterns,
            moral_values,
            moral_fragments,
            effect_map,
        };
        store.log_diagnostics();
        Ok(store)
    }

    /// Assemble a store from in-memory collections (synthetic anchor sets in
    /// tests, or programmatic construction).
    pub fn from_parts(
        emotion_tokens: AnchorCollection,
        major_emotions: AnchorCollection,
        patterns: AnchorCollection,
        moral_values: AnchorCollection,
        moral_fragments: AnchorCollection,
        effect_map: HashMap<String, TokenEffect>,
    ) -> Self {
        Self {
            emotion_tokens,
            major_emotions,
            patterns,
            moral_values,
            moral_fragments,
            effect_map,
        }
    }

    /// Token vocabulary handed to the fallback classifier.
    pub fn token_vocabulary(&self) -> Vec<&str> {
        self.emotion_tokens
            .entries()
            .iter()
            .map(|e| e.label.as_str())
            .collect()
    }

    fn log_diagnostics(&self) {
        info!(
            emotion_tokens = self.emotion_tokens.len(),
            major_emotions = self.major_emotions.len(),
            patterns = self.patterns.len(),
            moral_values = self.moral_values.len(),
            moral_fragments = self.moral_fragments.len(),
            effects = self.effect_map.len(),
            "anchor store loaded"
        );
        for entry in self.emotion_tokens.entries() {
            if !self.effect_map.contains_key(&entry.label) {
                warn!(token = %entry.label, "emotion token has no effect mapping");
            }
        }
    }
}

fn read_file(path: &Path) -> Result<String, AnchorError> {
    std::fs::read_to_string(path).map_err(|e| AnchorError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn load_collection(name: &str, path: &Path) -> Result<AnchorCollection, AnchorError> {
    let content = read_file(path)?;
    let entries: Vec<AnchorEntry> =
        serde_json::from_str(&content).map_err(|e| AnchorError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
    if entries.is_empty() {
        return Err(AnchorError::Empty {
            collection: name.to_string(),
        });
    }
    AnchorCollection::new(name, entries)
}

fn load_moral(path: &Path) -> Result<(AnchorCollection, AnchorCollection), AnchorError> {
    let content = read_file(path)?;
    let records: Vec<MoralAnchorRecord> =
        serde_json::from_str(&content).map_err(|e| AnchorError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;

    let mut values = Vec::new();
    let mut fragments = Vec::new();
    for record in records {
        let entry = AnchorEntry {
            label: record.text,
            embedding: record.embedding,
            metadata: record.metadata,
        };
        match record.kind.as_str() {
            "value" => values.push(entry),
            "fragment" => fragments.push(entry),
            other => {
                warn!(kind = %other, label = %entry.label, "unknown moral anchor kind, skipped");
            }
        }
    }

    Ok((
        AnchorCollection::new("moral_values", values)?,
        AnchorCollection::new("moral_fragments", fragments)?,
    ))
}

fn load_effect_map(path: &Path) -> Result<HashMap<String, TokenEffect>, AnchorError> {
    let content = read_file(path)?;
    serde_json::from_str(&content).map_err(|e| AnchorError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Flatten a two-level `category → subtoken → description` structure into
/// `(category:subtoken, description)` pairs, the label form every runtime
/// collection uses.
pub fn flatten_emotion_tokens(
    nested: &HashMap<String, HashMap<String, String>>,
) -> Vec<(String, String)> {
    let mut flat: Vec<(String, String)> = nested
        .iter()
        .flat_map(|(category, subtokens)| {
            subtokens
                .iter()
                .map(move |(subtoken, description)| {
                    (format!("{category}:{subtoken}"), description.clone())
                })
        })
        .collect();
    flat.sort_by(|a, b| a.0.cmp(&b.0));
    flat
}
