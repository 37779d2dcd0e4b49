//! Offline builders for the embedded anchor files.
//!
//! Each builder reads a raw, human-edited JSON source, embeds the relevant
//! text field in batches, and writes the embedded artifact the runtime loads
//! at startup. Invoked through `anima embed`.

use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::{AnchorEntry, flatten_emotion_tokens};
use crate::provider::EmbeddingProvider;

const EMBED_BATCH: usize = 100;

/// Embed a raw nested emotion-token file (`category → subtoken →
/// description`) into a flat anchor collection with `category:subtoken`
/// labels.
pub async fn build_emotion_tokens(
    embedder: &dyn EmbeddingProvider,
    input: &Path,
    output: &Path,
) -> anyhow::Result<usize> {
    let nested: HashMap<String, HashMap<String, String>> = read_input(input)?;
    let flat = flatten_emotion_tokens(&nested);

    let texts: Vec<String> = flat.iter().map(|(_, d)| d.clone()).collect();
    let embeddings = embed_all(embedder, &texts).await?;

    let entries: Vec<AnchorEntry> = flat
        .into_iter()
        .zip(embeddings)
        .map(|((label, description), embedding)| {
            let (category, subtoken) = label.split_once(':').unwrap_or((label.as_str(), ""));
            let metadata = json!({
                "category": category,
                "subtoken": subtoken,
                "description": description,
            });
            AnchorEntry {
                label: label.clone(),
                embedding,
                metadata,
            }
        })
        .collect();

    write_output(output, &entries)?;
    info!(count = entries.len(), output = %output.display(), "built emotion token anchors");
    Ok(entries.len())
}

/// Embed a major-emotion file: a JSON object keyed by emotion name, each
/// value carrying a `prompt_cue` (the text that gets embedded) plus the
/// reaction metadata the runtime surfaces on a match.
pub async fn build_major_emotions(
    embedder: &dyn EmbeddingProvider,
    input: &Path,
    output: &Path,
) -> anyhow::Result<usize> {
    let raw: HashMap<String, serde_json::Value> = read_input(input)?;
    let mut labels: Vec<String> = raw.keys().cloned().collect();
    labels.sort();

    let texts: Vec<String> = labels
        .iter()
        .map(|label| text_field(&raw[label], "prompt_cue", label))
        .collect::<anyhow::Result<_>>()?;
    let embeddings = embed_all(embedder, &texts).await?;

    let entries: Vec<AnchorEntry> = labels
        .into_iter()
        .zip(embeddings)
        .map(|(label, embedding)| {
            let source = &raw[&label];
            let metadata = json!({
                "name": label,
                "prompt_cue": source.get("prompt_cue").cloned().unwrap_or_default(),
                "inner_emotion": source.get("inner_emotion").cloned().unwrap_or_default(),
                "trait_expression": source.get("trait_expression").cloned().unwrap_or_default(),
                "memory_anchor": source.get("memory_anchor").cloned().unwrap_or_default(),
            });
            AnchorEntry {
                label,
                embedding,
                metadata,
            }
        })
        .collect();

    write_output(output, &entries)?;
    info!(count = entries.len(), output = %output.display(), "built major emotion anchors");
    Ok(entries.len())
}

/// Embed a psychological-pattern file: a JSON object keyed by pattern name,
/// each value carrying `description` (embedded) plus root-cause/remedy
/// metadata.
pub async fn build_patterns(
    embedder: &dyn EmbeddingProvider,
    input: &Path,
    output: &Path,
) -> anyhow::Result<usize> {
    let raw: HashMap<String, serde_json::Value> = read_input(input)?;
    let mut labels: Vec<String> = raw.keys().cloned().collect();
    labels.sort();

    let texts: Vec<String> = labels
        .iter()
        .map(|label| text_field(&raw[label], "description", label))
        .collect::<anyhow::Result<_>>()?;
    let embeddings = embed_all(embedder, &texts).await?;

    let entries: Vec<AnchorEntry> = labels
        .into_iter()
        .zip(embeddings)
        .map(|(label, embedding)| {
            let source = &raw[&label];
            let metadata = json!({
                "description": source.get("description").cloned().unwrap_or_default(),
                "root_cause": source.get("root_cause").cloned().unwrap_or_default(),
                "remedy": source.get("remedy").cloned().unwrap_or_default(),
                "assistance": source.get("assistance").cloned().unwrap_or_default(),
            });
            AnchorEntry {
                label,
                embedding,
                metadata,
            }
        })
        .collect();

    write_output(output, &entries)?;
    info!(count = entries.len(), output = %output.display(), "built pattern anchors");
    Ok(entries.len())
}

/// Embed a moral-memory file: `{"values": [...], "fragments": [...]}` where
/// values embed their `anchor` text and fragments their `summary`. The
/// output keeps the `type` tag the loader splits on.
pub async fn build_moral(
    embedder: &dyn EmbeddingProvider,
    input: &Path,
    output: &Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct MoralSource {
        #[serde(default)]
        values: Vec<serde_json::Value>,
        #[serde(default)]
        fragments: Vec<serde_json::Value>,
    }

    let source: MoralSource = read_input(input)?;

    let mut items: Vec<(&'static str, String, serde_json::Value)> = Vec::new();
    for value in source.values {
        let text = text_field(&value, "anchor", "moral value")?;
        items.push(("value", text, value));
    }
    for fragment in source.fragments {
        let text = text_field(&fragment, "summary", "moral fragment")?;
        items.push(("fragment", text, fragment));
    }

    let texts: Vec<String> = items.iter().map(|(_, t, _)| t.clone()).collect();
    let embeddings = embed_all(embedder, &texts).await?;

    let records: Vec<serde_json::Value> = items
        .into_iter()
        .zip(embeddings)
        .map(|((kind, text, metadata), embedding)| {
            json!({
                "type": kind,
                "text": text,
                "embedding": embedding,
                "metadata": metadata,
            })
        })
        .collect();

    write_output(output, &records)?;
    info!(count = records.len(), output = %output.display(), "built moral anchors");
    Ok(records.len())
}

async fn embed_all(
    embedder: &dyn EmbeddingProvider,
    texts: &[String],
) -> anyhow::Result<Vec<Vec<f32>>> {
    let batches = texts.chunks(EMBED_BATCH).map(|chunk| embedder.embed_batch(chunk));
    let results = futures::future::try_join_all(batches).await?;
    Ok(results.into_iter().flatten().collect())
}

fn text_field(value: &serde_json::Value, field: &str, context: &str) -> anyhow::Result<String> {
    value
        .get(field)
        .and_then(|t| t.as_str())
        .map(|t| t.to_string())
        .ok_or_else(|| anyhow::anyhow!("{context}: missing '{field}' text field"))
}

fn read_input<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("invalid JSON in {}: {e}", path.display()))
}

fn write_output<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    crate::store::save_json(path, value)
}
