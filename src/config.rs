use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnimaConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub data: DataConfig,
    pub routing: RoutingConfig,
    pub resonance: ResonanceConfig,
    pub mood: MoodConfig,
    pub relationship: RelationshipConfig,
    pub rollup: RollupConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    7400
}
fn default_bind() -> String {
    "127.0.0.1".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            embed_model: default_embed_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".into()
}
fn default_max_tokens() -> u32 {
    2048
}

/// Locations of the static anchor files and the mutable long-term stores.
/// Relative names resolve against `dir`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub dir: Option<PathBuf>,
    #[serde(default = "default_emotion_tokens_file")]
    pub emotion_tokens: String,
    #[serde(default = "default_major_emotions_file")]
    pub major_emotions: String,
    #[serde(default = "default_patterns_file")]
    pub patterns: String,
    #[serde(default = "default_moral_file")]
    pub moral: String,
    #[serde(default = "default_effect_map_file")]
    pub effect_map: String,
    #[serde(default = "default_relationships_file")]
    pub relationships: String,
    #[serde(default = "default_fragments_file")]
    pub fragments: String,
    #[serde(default = "default_sketches_file")]
    pub sketches: String,
    #[serde(default = "default_pictures_file")]
    pub pictures: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: None,
            emotion_tokens: default_emotion_tokens_file(),
            major_emotions: default_major_emotions_file(),
            patterns: default_patterns_file(),
            moral: default_moral_file(),
            effect_map: default_effect_map_file(),
            relationships: default_relationships_file(),
            fragments: default_fragments_file(),
            sketches: default_sketches_file(),
            pictures: default_pictures_file(),
        }
    }
}

fn default_emotion_tokens_file() -> String {
    "embedded_emotion_tokens.json".into()
}
fn default_major_emotions_file() -> String {
    "embedded_major_emotions.json".into()
}
fn default_patterns_file() -> String {
    "embedded_patterns.json".into()
}
fn default_moral_file() -> String {
    "embedded_moral_anchors.json".into()
}
fn default_effect_map_file() -> String {
    "emotion_effect_map.json".into()
}
fn default_relationships_file() -> String {
    "relationships.json".into()
}
fn default_fragments_file() -> String {
    "personality_fragments.json".into()
}
fn default_sketches_file() -> String {
    "soul_sketches.json".into()
}
fn default_pictures_file() -> String {
    "soul_pictures.json".into()
}

impl DataConfig {
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".anima")
    }

    pub fn resolve(&self, name: &str) -> PathBuf {
        let path = PathBuf::from(name);
        if path.is_absolute() {
            path
        } else {
            self.data_dir().join(path)
        }
    }
}

/// Tiered thresholds for the emotion-classification router.
/// Boundaries are inclusive to the higher tier.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_full_threshold")]
    pub full: f32,
    #[serde(default = "default_loose_threshold")]
    pub loose: f32,
    #[serde(default = "default_minimal_threshold")]
    pub minimal: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            full: default_full_threshold(),
            loose: default_loose_threshold(),
            minimal: default_minimal_threshold(),
        }
    }
}

fn default_full_threshold() -> f32 {
    0.35
}
fn default_loose_threshold() -> f32 {
    0.30
}
fn default_minimal_threshold() -> f32 {
    0.25
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResonanceConfig {
    #[serde(default = "default_value_threshold")]
    pub value_threshold: f32,
    #[serde(default = "default_fragment_threshold")]
    pub fragment_threshold: f32,
    /// Relaxed-pipeline override applied to both moral kinds.
    #[serde(default = "default_light_threshold")]
    pub light_threshold: f32,
    #[serde(default = "default_major_emotion_threshold")]
    pub major_emotion_threshold: f32,
    #[serde(default = "default_pattern_threshold")]
    pub pattern_threshold: f32,
    #[serde(default = "default_pattern_threshold_light")]
    pub pattern_threshold_light: f32,
    #[serde(default = "default_top_values")]
    pub top_values: usize,
    #[serde(default = "default_top_fragments")]
    pub top_fragments: usize,
    #[serde(default = "default_top_patterns")]
    pub top_patterns: usize,
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self {
            value_threshold: default_value_threshold(),
            fragment_threshold: default_fragment_threshold(),
            light_threshold: default_light_threshold(),
            major_emotion_threshold: default_major_emotion_threshold(),
            pattern_threshold: default_pattern_threshold(),
            pattern_threshold_light: default_pattern_threshold_light(),
            top_values: default_top_values(),
            top_fragments: default_top_fragments(),
            top_patterns: default_top_patterns(),
        }
    }
}

fn default_value_threshold() -> f32 {
    0.4
}
fn default_fragment_threshold() -> f32 {
    0.5
}
fn default_light_threshold() -> f32 {
    0.9
}
fn default_major_emotion_threshold() -> f32 {
    0.3
}
fn default_pattern_threshold() -> f32 {
    0.35
}
fn default_pattern_threshold_light() -> f32 {
    0.6
}
fn default_top_values() -> usize {
    2
}
fn default_top_fragments() -> usize {
    1
}
fn default_top_patterns() -> usize {
    2
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MoodConfig {
    #[serde(default = "default_baseline")]
    pub baseline: f64,
    #[serde(default = "default_rebound_strength")]
    pub rebound_strength: f64,
}

impl Default for MoodConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            rebound_strength: default_rebound_strength(),
        }
    }
}

fn default_baseline() -> f64 {
    0.70
}
fn default_rebound_strength() -> f64 {
    0.05
}

/// One step of the trust-multiplier table: deltas for scores strictly below
/// `below` are scaled by `multiplier`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustBand {
    pub below: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipConfig {
    #[serde(default = "default_decay_after_days")]
    pub decay_after_days: i64,
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    /// Deliberately non-monotonic: change velocity is damped at both the
    /// cautious low-trust end and the stable high-trust end. A policy table,
    /// not a law.
    #[serde(default = "default_trust_bands")]
    pub bands: Vec<TrustBand>,
    #[serde(default = "default_top_multiplier")]
    pub top_multiplier: f64,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            decay_after_days: default_decay_after_days(),
            decay_factor: default_decay_factor(),
            bands: default_trust_bands(),
            top_multiplier: default_top_multiplier(),
        }
    }
}

fn default_decay_after_days() -> i64 {
    3
}
fn default_decay_factor() -> f64 {
    0.98
}
fn default_trust_bands() -> Vec<TrustBand> {
    vec![
        TrustBand { below: 10.0, multiplier: 0.8 },
        TrustBand { below: 20.0, multiplier: 0.6 },
        TrustBand { below: 40.0, multiplier: 0.5 },
        TrustBand { below: 60.0, multiplier: 0.6 },
        TrustBand { below: 80.0, multiplier: 0.75 },
        TrustBand { below: 90.0, multiplier: 0.4 },
    ]
}
fn default_top_multiplier() -> f64 {
    0.25
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RollupConfig {
    #[serde(default = "default_fragments_per_sketch")]
    pub fragments_per_sketch: usize,
    #[serde(default = "default_sketches_per_picture")]
    pub sketches_per_picture: usize,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            fragments_per_sketch: default_fragments_per_sketch(),
            sketches_per_picture: default_sketches_per_picture(),
        }
    }
}

fn default_fragments_per_sketch() -> usize {
    5
}
fn default_sketches_per_picture() -> usize {
    5
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SessionConfig {
    /// Messages kept in the rolling prompt window.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    /// Emotion entries kept per side (user / agent).
    #[serde(default = "default_emotion_window")]
    pub emotion_window: usize,
    /// Conversation messages handed to the fallback classifier for context.
    #[serde(default = "default_fallback_context")]
    pub fallback_context: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recent_window: default_recent_window(),
            emotion_window: default_emotion_window(),
            fallback_context: default_fallback_context(),
        }
    }
}

fn default_recent_window() -> usize {
    10
}
fn default_emotion_window() -> usize {
    3
}
fn default_fallback_context() -> usize {
    3
}

/// Load configuration from file or use defaults.
///
/// Search order:
/// 1. `ANIMA_CONFIG` env var
/// 2. `~/.anima/config.toml`
/// 3. Zero-config defaults (no file needed)
pub fn load() -> anyhow::Result<AnimaConfig> {
    let path = config_path();

    if path.exists() {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let mut config: AnimaConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;

        resolve_api_key(&mut config);
        validate(&config)?;

        info!("loaded config from {}", path.display());
        Ok(config)
    } else {
        info!("no config file found, using zero-config defaults");
        let mut config = AnimaConfig::default();
        resolve_api_key(&mut config);
        Ok(config)
    }
}

fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ANIMA_CONFIG") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".anima").join("config.toml")
}

/// Resolve API key from environment variables if not set in config.
fn resolve_api_key(config: &mut AnimaConfig) {
    if config.provider.api_key.is_none() {
        config.provider.api_key = match config.provider.provider.as_str() {
            "openai" => std::env::var("OPENAI_API_KEY").ok(),
            "anthropic" => std::env::var("ANTHROPIC_API_KEY").ok(),
            _ => None,
        };
    }
}

/// Validate the config and return clear error messages.
pub fn validate(config: &AnimaConfig) -> anyhow::Result<()> {
    let valid_providers = ["openai", "anthropic"];
    if !valid_providers.contains(&config.provider.provider.as_str()) {
        anyhow::bail!(
            "invalid provider '{}': must be one of {:?}",
            config.provider.provider,
            valid_providers
        );
    }

    if config.provider.max_tokens == 0 {
        anyhow::bail!("provider.max_tokens must be > 0");
    }

    if config.routing.full < config.routing.loose || config.routing.loose < config.routing.minimal {
        anyhow::bail!(
            "routing thresholds must be ordered: full >= loose >= minimal (got {} / {} / {})",
            config.routing.full,
            config.routing.loose,
            config.routing.minimal
        );
    }

    if config.rollup.fragments_per_sketch == 0 || config.rollup.sketches_per_picture == 0 {
        anyhow::bail!("rollup thresholds must be > 0");
    }

    let mut last = 0.0;
    for band in &config.relationship.bands {
        if band.below <= last {
            anyhow::bail!("relationship.bands must have strictly increasing 'below' edges");
        }
        last = band.below;
    }

    Ok(())
}
