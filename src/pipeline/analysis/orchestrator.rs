use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use super::events::{EventSink, PipelineEvent};
use super::prompt::build_stage_request;
use super::sanitize::sanitize_content;
use super::types::{PriorOutputs, ProviderFactory, ProviderSet, Stage, StageOutputs};
use super::validation::validate_stage_output;
use super::AnalysisError;

/// Message of the closing `log` event of a successful run.
pub const COMPLETION_MESSAGE: &str = "Analysis complete";

/// State of one pipeline run, valid by construction: the content is
/// non-empty and every stage before the start stage has a known output.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    run_id: Uuid,
    content: String,
    from_stage: Stage,
    known: StageOutputs,
}

impl PipelineRun {
    /// Sanitize the content and check resume prerequisites.
    ///
    /// Fails with `EmptyContent` or with `MissingResumeDependency` naming the
    /// first stage before `from_stage` without a (non-null) prior output.
    /// Prior outputs for `from_stage` and later are dropped; those stages are
    /// recomputed.
    pub fn new(
        raw_content: &str,
        from_stage: Option<Stage>,
        prior: PriorOutputs,
    ) -> Result<Self, AnalysisError> {
        let content = sanitize_content(raw_content);
        if content.is_empty() {
            return Err(AnalysisError::EmptyContent);
        }

        let from_stage = from_stage.unwrap_or(Stage::A);
        let mut known = prior.into_outputs();
        if let Some(missing) = from_stage
            .predecessors()
            .iter()
            .find(|stage| !known.contains_key(*stage))
        {
            return Err(AnalysisError::MissingResumeDependency(*missing));
        }
        known.retain(|stage, _| *stage < from_stage);

        Ok(Self {
            run_id: Uuid::new_v4(),
            content,
            from_stage,
            known,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Sanitized content.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn from_stage(&self) -> Stage {
        self.from_stage
    }

    /// Stages this run will execute, in order.
    pub fn pending(&self) -> &'static [Stage] {
        self.from_stage.remaining()
    }
}

/// How a run ended. The event stream already told the caller; this is for
/// in-process callers and logs.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every stage succeeded. Holds all five outputs.
    Completed { outputs: StageOutputs },
    /// A stage failed and an `error` event was emitted for it.
    Failed { stage: Stage, message: String },
    /// The event sink closed while `stage` was pending or running.
    Cancelled { stage: Stage },
}

/// Runs the five stages in order against one set of providers, streaming
/// events into a sink.
pub struct PipelineOrchestrator {
    providers: ProviderSet,
}

impl PipelineOrchestrator {
    pub fn new(providers: ProviderSet) -> Self {
        Self { providers }
    }

    /// Execute the pending stages of `run`.
    ///
    /// Per stage: `stage_start`, provider call, validation, then `result` and
    /// `stage_complete`. The first failure emits one `error` event and ends
    /// the run. A closed sink stops the run before the next provider call;
    /// an output whose `result` could not be delivered is discarded.
    pub fn run(&self, run: PipelineRun, sink: &mut dyn EventSink) -> RunOutcome {
        let span = tracing::info_span!(
            "analysis_run",
            run_id = %run.run_id,
            from_stage = %run.from_stage
        );
        let _guard = span.enter();

        let PipelineRun {
            content,
            from_stage,
            mut known,
            ..
        } = run;
        let run_start = Instant::now();
        tracing::info!(
            content_chars = content.chars().count(),
            reused_outputs = known.len(),
            "Pipeline run started"
        );

        for &stage in from_stage.remaining() {
            if sink.emit(PipelineEvent::StageStart { stage }).is_err() {
                return cancelled(stage);
            }

            let output = match self.execute_stage(stage, &content, &known) {
                Ok(output) => output,
                Err(e) => {
                    let message = format!("{} failed: {e}", stage.name());
                    tracing::warn!(stage = %stage, error = %e, "Stage failed, ending run");
                    if sink
                        .emit(PipelineEvent::Error {
                            stage: Some(stage),
                            message: message.clone(),
                        })
                        .is_err()
                    {
                        tracing::debug!(stage = %stage, "Error event not delivered");
                    }
                    return RunOutcome::Failed { stage, message };
                }
            };

            known.insert(stage, output.clone());
            if sink
                .emit(PipelineEvent::Result {
                    stage,
                    payload: output,
                })
                .is_err()
            {
                return cancelled(stage);
            }
            if sink.emit(PipelineEvent::StageComplete { stage }).is_err() {
                return cancelled(stage);
            }
        }

        if sink
            .emit(PipelineEvent::Log {
                message: COMPLETION_MESSAGE.to_string(),
            })
            .is_err()
        {
            tracing::debug!("Completion log not delivered");
        }

        tracing::info!(
            elapsed_ms = run_start.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );
        RunOutcome::Completed { outputs: known }
    }

    fn execute_stage(
        &self,
        stage: Stage,
        content: &str,
        known: &StageOutputs,
    ) -> Result<Value, AnalysisError> {
        let request = build_stage_request(stage, content, known);
        let start = Instant::now();

        let output = self.providers.for_stage(stage).infer(&request)?;
        validate_stage_output(stage, &output)?;

        tracing::info!(
            stage = %stage,
            name = stage.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Stage complete"
        );
        Ok(output)
    }
}

fn cancelled(stage: Stage) -> RunOutcome {
    tracing::info!(stage = %stage, "Event stream closed, stopping run");
    RunOutcome::Cancelled { stage }
}

/// Check preconditions, connect the providers and run to completion.
///
/// Must be called off the async runtime: providers block.
pub fn run_analysis(
    factory: &dyn ProviderFactory,
    raw_content: &str,
    from_stage: Option<Stage>,
    prior: PriorOutputs,
    sink: &mut dyn EventSink,
) -> Result<RunOutcome, AnalysisError> {
    let run = PipelineRun::new(raw_content, from_stage, prior)?;
    let orchestrator = PipelineOrchestrator::new(factory.connect());
    Ok(orchestrator.run(run, sink))
}
