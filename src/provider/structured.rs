use serde::de::DeserializeOwned;

use crate::error::StructuredOutputError;

/// Confidence assigned when the fallback classifier returns a bare token
/// label instead of a (label, score) pair.
pub const DEFAULT_FALLBACK_SCORE: f32 = 0.5;

/// Parse a model response into `T`, tolerating the usual decoration:
/// markdown code fences, prose before/after the JSON body.
///
/// This is the single boundary at which generative output becomes typed
/// data. Everything past it works with `T`, never with raw strings.
pub fn parse_structured<T: DeserializeOwned>(
    context: &'static str,
    raw: &str,
) -> Result<T, StructuredOutputError> {
    let candidate = extract_json(raw)
        .ok_or_else(|| StructuredOutputError::new(context, "no JSON value found in response"))?;
    serde_json::from_str(candidate).map_err(|e| StructuredOutputError::new(context, e.to_string()))
}

/// Parse the fallback classifier's token list.
///
/// The contract is a JSON array whose elements are either `["label", score]`
/// pairs or bare `"label"` strings; bare labels get `DEFAULT_FALLBACK_SCORE`.
/// Anything else is a structured-output error. The result is capped at `cap`.
pub fn parse_token_scores(
    context: &'static str,
    raw: &str,
    cap: usize,
) -> Result<Vec<(String, f32)>, StructuredOutputError> {
    let value: serde_json::Value = parse_structured(context, raw)?;
    let items = value
        .as_array()
        .ok_or_else(|| StructuredOutputError::new(context, "expected a JSON array"))?;

    let mut tokens = Vec::new();
    for item in items {
        match item {
            serde_json::Value::String(label) => {
                tokens.push((label.clone(), DEFAULT_FALLBACK_SCORE));
            }
            serde_json::Value::Array(pair) => {
                let label = pair.first().and_then(|l| l.as_str()).ok_or_else(|| {
                    StructuredOutputError::new(context, "pair missing string label")
                })?;
                let score = pair
                    .get(1)
                    .and_then(|s| s.as_f64())
                    .map(|s| s as f32)
                    .unwrap_or(DEFAULT_FALLBACK_SCORE);
                tokens.push((label.to_string(), score.clamp(0.0, 1.0)));
            }
            other => {
                return Err(StructuredOutputError::new(
                    context,
                    format!("unexpected array element: {other}"),
                ));
            }
        }
        if tokens.len() == cap {
            break;
        }
    }
    Ok(tokens)
}

/// Slice out the first JSON value (object or array) in `raw`, stripping
/// markdown fences first.
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = strip_fences(raw.trim());

    let start = trimmed.find(['{', '['])?;
    let open = trimmed.as_bytes()[start];
    let close = if open == b'{' { b'}' } else { b']' };
    let end = trimmed.bytes().rposition(|b| b == close)?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

fn strip_fences(raw: &str) -> &str {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("```") {
        // Drop an optional language tag on the fence line
        let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
        return body.strip_suffix("```").unwrap_or(body).trim();
    }
    raw
}
