// Client side of the event stream: split bytes into lines, decode each line
// on its own, and fold the events into a view of the run.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::events::PipelineEvent;
use super::orchestrator::COMPLETION_MESSAGE;
use super::types::Stage;

/// Splits an incoming byte stream into complete lines.
///
/// A trailing partial line stays buffered until more bytes arrive or
/// [`LineDecoder::finish`] is called. Bytes are buffered raw, so a UTF-8
/// sequence split across chunks is reassembled.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every line it completed, without the newline.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        complete[..last_newline]
            .split(|b| *b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Flush the remaining partial line, if any.
    pub fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Decode one line. Blank lines and unparseable lines yield `None`; the
/// latter are logged.
pub fn decode_line(line: &str) -> Option<PipelineEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, line_bytes = trimmed.len(), "Skipping undecodable event line");
            None
        }
    }
}

/// Decode every line independently, skipping the ones that fail.
pub fn decode_events<I, S>(lines: I) -> Vec<PipelineEvent>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| decode_line(line.as_ref()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Idle,
    Running,
    Done,
    Error,
}

/// One received event, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub seq: usize,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Everything a client knows about a run after some prefix of its events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineView {
    pub stages: BTreeMap<Stage, StageStatus>,
    pub logs: Vec<String>,
    pub timeline: Vec<TimelineEntry>,
    pub outputs: BTreeMap<Stage, Value>,
    pub finished: bool,
    pub error: Option<String>,
}

impl Default for PipelineView {
    fn default() -> Self {
        Self {
            stages: Stage::ALL.into_iter().map(|s| (s, StageStatus::Idle)).collect(),
            logs: Vec::new(),
            timeline: Vec::new(),
            outputs: BTreeMap::new(),
            finished: false,
            error: None,
        }
    }
}

impl PipelineView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the view.
    pub fn apply(mut self, event: &PipelineEvent) -> Self {
        let message = match event {
            PipelineEvent::Log { message } | PipelineEvent::Error { message, .. } => {
                Some(message.clone())
            }
            _ => None,
        };
        self.timeline.push(TimelineEntry {
            seq: self.timeline.len(),
            kind: event.kind(),
            stage: event.stage(),
            message,
        });

        match event {
            PipelineEvent::StageStart { stage } => {
                self.stages.insert(*stage, StageStatus::Running);
            }
            PipelineEvent::StageComplete { stage } => {
                self.stages.insert(*stage, StageStatus::Done);
            }
            PipelineEvent::Result { stage, payload } => {
                self.outputs.insert(*stage, payload.clone());
            }
            PipelineEvent::Log { message } => {
                self.logs.push(message.clone());
                if message == COMPLETION_MESSAGE {
                    self.finished = true;
                }
            }
            PipelineEvent::Error { stage, message } => {
                if let Some(stage) = stage {
                    self.stages.insert(*stage, StageStatus::Error);
                }
                self.error = Some(message.clone());
                self.finished = true;
            }
        }
        self
    }

    /// Fold a whole event sequence from the initial view.
    pub fn fold<'a>(events: impl IntoIterator<Item = &'a PipelineEvent>) -> Self {
        events.into_iter().fold(Self::default(), Self::apply)
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    /// Stage currently running, if any.
    pub fn active_stage(&self) -> Option<Stage> {
        self.stages
            .iter()
            .find(|(_, status)| **status == StageStatus::Running)
            .map(|(stage, _)| *stage)
    }

    /// True once the closing log arrived without any error. Stages skipped
    /// by a resumed run stay `Idle` and do not count against success.
    pub fn succeeded(&self) -> bool {
        self.finished && self.error.is_none()
    }
}
