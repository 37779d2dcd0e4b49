use thiserror::Error;

/// Failures talking to an external model service (embeddings or chat).
///
/// These are primary-path errors: a failed embedding call must surface to the
/// caller rather than be folded into "no matches".
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// A generative call's response could not be parsed into the expected shape.
///
/// Callers at fallback/classification/roll-up sites catch this locally and
/// degrade to their documented safe default (empty match list, empty emotional
/// state, skipped roll-up). It never crosses a turn boundary.
#[derive(Debug, Error)]
#[error("structured output parse failed for {context}: {reason}")]
pub struct StructuredOutputError {
    pub context: &'static str,
    pub reason: String,
}

impl StructuredOutputError {
    pub fn new(context: &'static str, reason: impl Into<String>) -> Self {
        Self {
            context,
            reason: reason.into(),
        }
    }
}

/// Errors from similarity scoring and resonance retrieval.
#[derive(Debug, Error)]
pub enum ResonanceError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Vector-length disagreement. Indicates corrupt anchor data; checked on
    /// every comparison rather than assumed away.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Load-time anchor integrity failures. These are fatal at startup: the
/// reasoning pipeline must not run on broken foundational data.
#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("failed to read anchor file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid anchor JSON in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("anchor collection '{collection}' has mixed embedding dimensions: {expected} vs {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("anchor collection '{collection}' is empty")]
    Empty { collection: String },
}
