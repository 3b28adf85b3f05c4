use std::io::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use super::types::Stage;

/// Media type of the streamed event body.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Bounded capacity of the channel between a pipeline run and its HTTP body.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// One line of the streamed protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStart {
        stage: Stage,
    },
    StageComplete {
        stage: Stage,
    },
    Log {
        message: String,
    },
    Result {
        stage: Stage,
        payload: Value,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
        message: String,
    },
}

impl PipelineEvent {
    /// Stage the event refers to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineEvent::StageStart { stage }
            | PipelineEvent::StageComplete { stage }
            | PipelineEvent::Result { stage, .. } => Some(*stage),
            PipelineEvent::Error { stage, .. } => *stage,
            PipelineEvent::Log { .. } => None,
        }
    }

    /// Wire name of the event (`stage_start`, `result`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::StageStart { .. } => "stage_start",
            PipelineEvent::StageComplete { .. } => "stage_complete",
            PipelineEvent::Log { .. } => "log",
            PipelineEvent::Result { .. } => "result",
            PipelineEvent::Error { .. } => "error",
        }
    }

    /// Serialize as one NDJSON line, newline included.
    pub fn to_line(&self) -> String {
        // Serializing an enum of strings and `Value`s cannot fail.
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

/// The receiving side is gone; the run must stop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Event stream closed by the receiver")]
pub struct TransportClosed;

/// Destination of a run's events, written in order and consumed once.
pub trait EventSink {
    fn emit(&mut self, event: PipelineEvent) -> Result<(), TransportClosed>;
}

/// In-memory capture.
impl EventSink for Vec<PipelineEvent> {
    fn emit(&mut self, event: PipelineEvent) -> Result<(), TransportClosed> {
        self.push(event);
        Ok(())
    }
}

/// Writes one JSON object per line, flushing after every event.
pub struct NdjsonWriter<W: Write> {
    inner: W,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> EventSink for NdjsonWriter<W> {
    fn emit(&mut self, event: PipelineEvent) -> Result<(), TransportClosed> {
        self.inner
            .write_all(event.to_line().as_bytes())
            .and_then(|_| self.inner.flush())
            .map_err(|e| {
                tracing::debug!(error = %e, "NDJSON writer failed");
                TransportClosed
            })
    }
}

/// Feeds serialized lines into a bounded tokio channel from a blocking thread.
///
/// `emit` waits while the channel is full. Must not be used from inside an
/// async task.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: PipelineEvent) -> Result<(), TransportClosed> {
        self.tx.blocking_send(event.to_line()).map_err(|_| TransportClosed)
    }
}
