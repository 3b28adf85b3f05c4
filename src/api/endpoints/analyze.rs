//! `POST /api/analyze`: run the pipeline and stream its events.
//!
//! Preconditions are checked before the response starts, so they can still
//! be reported as HTTP 400. Once streaming begins the status is 200 and the
//! outcome travels as the last event.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::analysis::{
    ChannelSink, PipelineEvent, PipelineOrchestrator, PipelineRun, PriorOutputs, RunOutcome,
    Stage, EVENT_CHANNEL_CAPACITY, NDJSON_CONTENT_TYPE,
};

/// Message of the stage-less `error` event sent when the worker dies.
pub const WORKER_FAILURE_MESSAGE: &str = "Analysis aborted by an internal error";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub from_stage: Option<Stage>,
    /// `null` and absent both mean a fresh run.
    #[serde(default)]
    pub previous: Option<PriorOutputs>,
}

pub async fn analyze(
    State(ctx): State<ApiContext>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let run = PipelineRun::new(
        &request.content,
        request.from_stage,
        request.previous.unwrap_or_default(),
    )?;
    let run_id = run.run_id();

    let (tx, rx) = mpsc::channel::<String>(EVENT_CHANNEL_CAPACITY);
    let factory = ctx.factory.clone();
    let abort_tx = tx.clone();

    // Providers block; the run lives on the blocking pool and hands lines
    // to the response body through the channel.
    let worker = tokio::task::spawn_blocking(move || {
        let orchestrator = PipelineOrchestrator::new(factory.connect());
        let mut sink = ChannelSink::new(tx);
        match orchestrator.run(run, &mut sink) {
            RunOutcome::Completed { .. } => {
                tracing::debug!(%run_id, "Analysis stream finished");
            }
            RunOutcome::Failed { stage, .. } => {
                tracing::debug!(%run_id, %stage, "Analysis stream ended with error");
            }
            RunOutcome::Cancelled { stage } => {
                tracing::info!(%run_id, %stage, "Client disconnected during analysis");
            }
        }
    });

    // A worker that dies mid-run still owes the client a terminal event.
    tokio::spawn(async move {
        if let Err(e) = worker.await {
            tracing::error!(%run_id, "Analysis worker failed: {e}");
            let event = PipelineEvent::Error {
                stage: None,
                message: WORKER_FAILURE_MESSAGE.to_string(),
            };
            if abort_tx.send(event.to_line()).await.is_err() {
                tracing::debug!(%run_id, "Client gone before worker failure was reported");
            }
        }
    });

    let lines = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|line| (Ok::<_, Infallible>(line), rx))
    });

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}
