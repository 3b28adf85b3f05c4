//! Tolerant JSON extraction for provider answers.
//!
//! Providers are asked for strict JSON but may wrap it in prose or Markdown
//! fences. The brace scan takes the span from the first `{` to the last `}`,
//! so an unrelated brace pair before the real payload will misparse.

use serde_json::Value;

use super::AnalysisError;

/// How a provider's textual answer is turned into JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Slice from the first `{` to the last `}` and parse that.
    #[default]
    BraceScan,
    /// Parse the whole (trimmed) text and nothing else. For providers running
    /// in a structured-output mode, where surrounding prose means a bad answer.
    Strict,
}

/// Resolve a provider answer into a JSON object.
///
/// Returns `Ok(None)` when there is no candidate at all (null, empty string,
/// non-string scalars, or a scan that produced an empty object). Objects pass
/// through untouched.
pub fn resolve_json(value: &Value, mode: ResolveMode) -> Result<Option<Value>, AnalysisError> {
    match value {
        Value::Object(_) => Ok(Some(value.clone())),
        Value::String(text) if text.is_empty() => Ok(None),
        Value::String(text) => resolve_text(text, mode),
        _ => Ok(None),
    }
}

/// Resolve raw answer text (see [`resolve_json`]).
pub fn resolve_text(text: &str, mode: ResolveMode) -> Result<Option<Value>, AnalysisError> {
    if text.is_empty() {
        return Ok(None);
    }

    let candidate = match mode {
        ResolveMode::BraceScan => brace_span(text)?,
        ResolveMode::Strict => text.trim(),
    };
    let parsed: Value = serde_json::from_str(candidate)
        .map_err(|e| AnalysisError::MalformedResponse(format!("invalid JSON: {e}")))?;
    if !parsed.is_object() {
        return Err(AnalysisError::MalformedResponse(
            "answer is not a JSON object".into(),
        ));
    }
    Ok(non_empty(parsed))
}

/// The first-`{`-to-last-`}` slice of `text`, inclusive.
fn brace_span(text: &str) -> Result<&str, AnalysisError> {
    let start = text
        .find('{')
        .ok_or_else(|| AnalysisError::MalformedResponse("no JSON object found".into()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| AnalysisError::MalformedResponse("no JSON object found".into()))?;
    if end < start {
        return Err(AnalysisError::MalformedResponse(
            "unbalanced JSON object delimiters".into(),
        ));
    }
    Ok(&text[start..=end])
}

fn non_empty(value: Value) -> Option<Value> {
    match &value {
        Value::Object(map) if map.is_empty() => None,
        _ => Some(value),
    }
}
