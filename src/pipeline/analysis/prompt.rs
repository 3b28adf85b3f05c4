use serde_json::{json, Value};

use super::types::{Stage, StageOutputs, StageRequest};

/// Number of words kept when inferring the topic for the trends stage.
pub const TOPIC_MAX_WORDS: usize = 12;

/// System prompt for the trends provider.
pub const TRENDS_SYSTEM_PROMPT: &str = r#"
You are a short-form content trends analyst. You research what is currently
working for creators on the given topic.

RULES:
1. Answer ONLY with a single JSON object. No prose, no Markdown fences.
2. Every field is a list of short strings. Use an empty list when unsure.
3. Never invent statistics or cite specific accounts.
"#;

const SEGMENTATION_INSTRUCTION: &str = "Split the content into its consecutive segments. \
Give each segment a unique integer id, its exact text, and one purpose from: \
hook, context, story, value, cta, other. Respond with strict JSON only.";

const ENGAGEMENT_INSTRUCTION: &str = "For the given segments, identify where viewers are \
likely to drop off (with a reason and a severity of low, medium or high) and any \
engagement issues. Refer to segments by their id. Respond with strict JSON only.";

const AUDIENCE_INSTRUCTION: &str = "For the given segments, list audience mismatches, \
clarity problems (by segment id) and tone problems. Respond with strict JSON only.";

const TRENDS_INSTRUCTION: &str = "List current trends, saturation signals and similar \
popular formats for content on this topic.";

const SYNTHESIS_INSTRUCTION: &str = "Combine the segmentation, engagement, audience and \
trends analyses into an overall potential rating (low, medium or high), the highest \
impact fixes, rewrite priorities by segment id (change and expected impact) and \
positioning advice. Respond with strict JSON only.";

/// Natural-language instruction sent with a stage request.
pub fn stage_instruction(stage: Stage) -> &'static str {
    match stage {
        Stage::A => SEGMENTATION_INSTRUCTION,
        Stage::B => ENGAGEMENT_INSTRUCTION,
        Stage::C => AUDIENCE_INSTRUCTION,
        Stage::D => TRENDS_INSTRUCTION,
        Stage::E => SYNTHESIS_INSTRUCTION,
    }
}

/// Illustrative shape of the answer expected for a stage.
pub fn stage_shape(stage: Stage) -> Value {
    match stage {
        Stage::A => json!({
            "segments": [
                {"id": 1, "text": "segment text", "purpose": "hook | context | story | value | cta | other"}
            ]
        }),
        Stage::B => json!({
            "drop_off_risks": [{"id": 1, "reason": "why viewers leave", "severity": "low | medium | high"}],
            "engagement_issues": [{"id": 1, "issue": "what weakens engagement"}]
        }),
        Stage::C => json!({
            "audience_mismatch": ["note"],
            "clarity_issues": [{"id": 1, "problem": "what is unclear"}],
            "tone_problems": ["note"]
        }),
        Stage::D => json!({
            "current_trends": ["trend"],
            "saturation_signals": ["signal"],
            "similar_formats": ["format"]
        }),
        Stage::E => json!({
            "overall_potential": "low | medium | high",
            "highest_impact_fixes": ["fix"],
            "rewrite_priorities": [{"id": 1, "change": "recommended change", "expected_impact": "impact"}],
            "positioning_advice": ["advice"]
        }),
    }
}

/// Build the request for `stage` from the sanitized content and the outputs
/// known so far. Callers guarantee every predecessor output is present.
pub fn build_stage_request(stage: Stage, content: &str, known: &StageOutputs) -> StageRequest {
    let input = match stage {
        Stage::A => json!({ "content": content }),
        Stage::B | Stage::C => json!({ "segments": segments_of(known) }),
        Stage::D => json!({ "topic": infer_topic(content) }),
        Stage::E => {
            let mut prior = serde_json::Map::new();
            for earlier in stage.predecessors() {
                let value = known.get(earlier).cloned().unwrap_or(Value::Null);
                prior.insert(earlier.payload_key().to_string(), value);
            }
            Value::Object(prior)
        }
    };

    StageRequest {
        stage,
        instruction: stage_instruction(stage).to_string(),
        input,
        shape: stage_shape(stage),
    }
}

/// Build the user message for the trends provider.
pub fn build_trends_prompt(request: &StageRequest) -> String {
    let topic = request
        .input
        .get("topic")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let shape = serde_json::to_string_pretty(&request.shape).unwrap_or_default();

    format!(
        "{instruction}\n\nTopic: {topic}\n\nRespond with JSON in exactly this shape:\n{shape}",
        instruction = request.instruction,
    )
}

fn segments_of(known: &StageOutputs) -> Value {
    known
        .get(&Stage::A)
        .and_then(|a| a.get("segments"))
        .cloned()
        .unwrap_or_else(|| json!([]))
}

/// Crude topic guess: the first sentence-like fragment, cut to its first
/// [`TOPIC_MAX_WORDS`] words. Stage D's input depends on this exact behaviour.
pub fn infer_topic(content: &str) -> String {
    content
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .find(|fragment| !fragment.is_empty())
        .map(|fragment| {
            fragment
                .split_whitespace()
                .take(TOPIC_MAX_WORDS)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}
