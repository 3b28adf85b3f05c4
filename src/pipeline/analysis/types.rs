use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::AnalysisError;

// ═══════════════════════════════════════════════════════════
// Stages
// ═══════════════════════════════════════════════════════════

static ORDER: [Stage; 5] = [Stage::A, Stage::B, Stage::C, Stage::D, Stage::E];

/// One of the five analysis stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    A,
    B,
    C,
    D,
    E,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 5] = [Stage::A, Stage::B, Stage::C, Stage::D, Stage::E];

    /// Human-readable stage name.
    pub fn name(self) -> &'static str {
        match self {
            Stage::A => "Segmentation",
            Stage::B => "Engagement",
            Stage::C => "Audience Fit",
            Stage::D => "Trends",
            Stage::E => "Synthesis",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stages that run strictly before this one.
    pub fn predecessors(self) -> &'static [Stage] {
        &ORDER[..self.index()]
    }

    /// This stage and every stage after it.
    pub fn remaining(self) -> &'static [Stage] {
        &ORDER[self.index()..]
    }

    /// Key used for this stage in request/response payloads (`stageA` …).
    pub fn payload_key(self) -> &'static str {
        match self {
            Stage::A => "stageA",
            Stage::B => "stageB",
            Stage::C => "stageC",
            Stage::D => "stageD",
            Stage::E => "stageE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Stage::A => "A",
            Stage::B => "B",
            Stage::C => "C",
            Stage::D => "D",
            Stage::E => "E",
        };
        f.write_str(letter)
    }
}

// ═══════════════════════════════════════════════════════════
// Stage output shapes
// ═══════════════════════════════════════════════════════════

/// Role a segment plays in the piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentPurpose {
    Hook,
    Context,
    Story,
    Value,
    Cta,
    Other,
}

/// Three-level rating used for drop-off severity and overall potential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: i64,
    pub text: String,
    pub purpose: SegmentPurpose,
}

/// Stage A.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropOffRisk {
    pub id: i64,
    pub reason: String,
    pub severity: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementIssue {
    pub id: i64,
    pub issue: String,
}

/// Stage B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    pub drop_off_risks: Vec<DropOffRisk>,
    pub engagement_issues: Vec<EngagementIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarityIssue {
    pub id: i64,
    pub problem: String,
}

/// Stage C.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceFit {
    pub audience_mismatch: Vec<String>,
    pub clarity_issues: Vec<ClarityIssue>,
    pub tone_problems: Vec<String>,
}

/// Stage D. Independent of segment ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trends {
    pub current_trends: Vec<String>,
    pub saturation_signals: Vec<String>,
    pub similar_formats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewritePriority {
    pub id: i64,
    pub change: String,
    pub expected_impact: String,
}

/// Stage E.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub overall_potential: Level,
    pub highest_impact_fixes: Vec<String>,
    pub rewrite_priorities: Vec<RewritePriority>,
    pub positioning_advice: Vec<String>,
}

// ═══════════════════════════════════════════════════════════
// Run state
// ═══════════════════════════════════════════════════════════

/// Outputs known for a run, keyed by stage. Payloads are stored exactly as
/// the provider (or the caller) produced them.
pub type StageOutputs = BTreeMap<Stage, serde_json::Value>;

/// Previously computed outputs supplied by a caller resuming a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_a: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_b: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_c: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_d: Option<serde_json::Value>,
}

impl PriorOutputs {
    pub fn get(&self, stage: Stage) -> Option<&serde_json::Value> {
        match stage {
            Stage::A => self.stage_a.as_ref(),
            Stage::B => self.stage_b.as_ref(),
            Stage::C => self.stage_c.as_ref(),
            Stage::D => self.stage_d.as_ref(),
            Stage::E => None,
        }
    }

    pub fn set(&mut self, stage: Stage, value: serde_json::Value) {
        match stage {
            Stage::A => self.stage_a = Some(value),
            Stage::B => self.stage_b = Some(value),
            Stage::C => self.stage_c = Some(value),
            Stage::D => self.stage_d = Some(value),
            Stage::E => {}
        }
    }

    /// Null entries count as absent.
    pub fn into_outputs(self) -> StageOutputs {
        [
            (Stage::A, self.stage_a),
            (Stage::B, self.stage_b),
            (Stage::C, self.stage_c),
            (Stage::D, self.stage_d),
        ]
        .into_iter()
        .filter_map(|(stage, value)| match value {
            Some(v) if !v.is_null() => Some((stage, v)),
            _ => None,
        })
        .collect()
    }
}

// ═══════════════════════════════════════════════════════════
// Inference boundary
// ═══════════════════════════════════════════════════════════

/// Everything a provider needs to produce one stage's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRequest {
    pub stage: Stage,
    /// Natural-language instruction for the model.
    pub instruction: String,
    /// Stage input built from content and earlier outputs.
    pub input: serde_json::Value,
    /// Illustrative JSON shape of the expected answer.
    pub shape: serde_json::Value,
}

/// Inference provider abstraction (allows mocking).
///
/// One call per invocation; no retries. Implementations return the resolved
/// JSON answer or a provider-level error.
pub trait InferenceClient: Send + Sync {
    fn infer(&self, request: &StageRequest) -> Result<serde_json::Value, AnalysisError>;
}

/// The pair of clients one pipeline run talks to.
pub struct ProviderSet {
    /// Segmentation, engagement, audience and synthesis stages.
    pub analysis: Box<dyn InferenceClient>,
    /// Trends stage.
    pub trends: Box<dyn InferenceClient>,
}

impl ProviderSet {
    pub fn for_stage(&self, stage: Stage) -> &dyn InferenceClient {
        match stage {
            Stage::D => self.trends.as_ref(),
            _ => self.analysis.as_ref(),
        }
    }
}

/// Builds the clients for one run. Called on the worker thread that runs the
/// pipeline, so blocking HTTP clients are created outside the async runtime.
pub trait ProviderFactory: Send + Sync {
    fn connect(&self) -> ProviderSet;
}
