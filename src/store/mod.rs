use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Best-effort JSON file persistence for the long-term stores.
///
/// Single-writer, last-writer-wins, whole-file overwrite. The process serves
/// one active conversation at a time, so no locking protocol is needed.

/// Load a JSON file into `T`, returning `T::default()` if the file does not
/// exist yet. Malformed content is an error: a corrupt store should surface,
/// not silently reset.
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> anyhow::Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("invalid JSON in {}: {e}", path.display()))
}

/// Write `value` to `path` as pretty-printed JSON, creating parent
/// directories as needed.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))
}
