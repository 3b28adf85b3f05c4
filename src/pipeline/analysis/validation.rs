// Structural contracts for stage outputs produced by a provider.
// Checked right after resolution and before the output is stored or emitted.
// Caller-supplied prior outputs are trusted and never pass through here.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::{AudienceFit, Engagement, Segmentation, Stage, Synthesis, Trends};
use super::AnalysisError;

/// Validate a resolved provider answer against the stage's contract.
///
/// Required fields must be present with the right types (arrays may be empty,
/// except the segment list), enumerations must use their fixed values, and
/// ids must be integers. Unknown extra fields are tolerated.
pub fn validate_stage_output(stage: Stage, value: &Value) -> Result<(), AnalysisError> {
    if !value.is_object() {
        return Err(violation(stage, "expected a JSON object"));
    }

    match stage {
        Stage::A => validate_segmentation(value),
        Stage::B => decode::<Engagement>(stage, value).map(|_| ()),
        Stage::C => decode::<AudienceFit>(stage, value).map(|_| ()),
        Stage::D => decode::<Trends>(stage, value).map(|_| ()),
        Stage::E => decode::<Synthesis>(stage, value).map(|_| ()),
    }
}

fn validate_segmentation(value: &Value) -> Result<(), AnalysisError> {
    let parsed: Segmentation = decode(Stage::A, value)?;

    if parsed.segments.is_empty() {
        return Err(violation(Stage::A, "segments must not be empty"));
    }

    let mut seen = HashSet::with_capacity(parsed.segments.len());
    for segment in &parsed.segments {
        if !seen.insert(segment.id) {
            return Err(violation(
                Stage::A,
                &format!("duplicate segment id {}", segment.id),
            ));
        }
    }

    Ok(())
}

fn decode<T: DeserializeOwned>(stage: Stage, value: &Value) -> Result<T, AnalysisError> {
    T::deserialize(value).map_err(|e| violation(stage, &e.to_string()))
}

fn violation(stage: Stage, detail: &str) -> AnalysisError {
    AnalysisError::SchemaViolation {
        stage,
        detail: detail.to_string(),
    }
}

/// Canned, contract-satisfying outputs shared by the pipeline tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::Stage;
    use serde_json::{json, Value};

    pub(crate) fn valid_output(stage: Stage) -> Value {
        match stage {
            Stage::A => json!({
                "segments": [
                    {"id": 1, "text": "Hook: X.", "purpose": "hook"},
                    {"id": 4, "text": "Value: Y.", "purpose": "value"},
                    {"id": 7, "text": "CTA: Z.", "purpose": "cta"}
                ]
            }),
            Stage::B => json!({
                "drop_off_risks": [{"id": 4, "reason": "slow middle", "severity": "medium"}],
                "engagement_issues": [{"id": 1, "issue": "hook is generic"}]
            }),
            Stage::C => json!({
                "audience_mismatch": ["assumes expert viewers"],
                "clarity_issues": [{"id": 4, "problem": "jargon"}],
                "tone_problems": []
            }),
            Stage::D => json!({
                "current_trends": ["before/after reveals"],
                "saturation_signals": ["listicle fatigue"],
                "similar_formats": ["3-step tutorials"]
            }),
            Stage::E => json!({
                "overall_potential": "high",
                "highest_impact_fixes": ["open on the result"],
                "rewrite_priorities": [
                    {"id": 1, "change": "lead with the payoff", "expected_impact": "retention"}
                ],
                "positioning_advice": ["frame as a shortcut"]
            }),
        }
    }
}
