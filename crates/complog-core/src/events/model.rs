//! Build events as they arrive from the build tool.
//!
//! The stream is order-dependent: projects start before they finish,
//! evaluations finish before the projects that use them finish. An event log
//! file holds one JSON-encoded [`BuildEvent`] per line.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::domain::{ComplogError, Result};

/// Well-known MSBuild property names.
pub const TARGET_FRAMEWORK: &str = "TargetFramework";
pub const TARGET_FRAMEWORKS: &str = "TargetFrameworks";

/// One event from the raw build-event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    /// A project execution began. One evaluation may be started many times.
    ProjectStarted {
        context_id: i32,
        #[serde(default)]
        parent_context_id: Option<i32>,
        #[serde(default)]
        evaluation_id: Option<i32>,
        project_file: String,
        #[serde(default)]
        global_properties: BTreeMap<String, String>,
    },
    /// A project evaluation completed with its final property values.
    ProjectEvaluationFinished {
        evaluation_id: i32,
        project_file: String,
        #[serde(default)]
        properties: BTreeMap<String, String>,
    },
    TargetStarted {
        context_id: i32,
        target_id: i32,
        target_name: String,
        #[serde(default)]
        parent_target: Option<String>,
    },
    TaskStarted {
        context_id: i32,
        target_id: i32,
        task_id: i32,
        task_name: String,
    },
    /// The command line a task executed.
    TaskCommandLine {
        context_id: i32,
        target_id: i32,
        task_id: i32,
        command_line: String,
    },
    ProjectFinished {
        context_id: i32,
        #[serde(default = "default_true")]
        succeeded: bool,
    },
    /// Free-form build output; carries nothing the correlator needs.
    Message { text: String },
}

fn default_true() -> bool {
    true
}

impl BuildEvent {
    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildEvent::ProjectStarted { .. } => "project_started",
            BuildEvent::ProjectEvaluationFinished { .. } => "project_evaluation_finished",
            BuildEvent::TargetStarted { .. } => "target_started",
            BuildEvent::TaskStarted { .. } => "task_started",
            BuildEvent::TaskCommandLine { .. } => "task_command_line",
            BuildEvent::ProjectFinished { .. } => "project_finished",
            BuildEvent::Message { .. } => "message",
        }
    }
}

/// MSBuild marks missing ids with negative values.
pub(crate) fn valid_id(id: Option<i32>) -> Option<i32> {
    id.filter(|v| *v >= 0)
}

/// Streaming reader over an event log file.
///
/// Blank lines are skipped. A line that does not decode is reported with its
/// 1-based line number.
pub struct EventLogReader<R> {
    lines: std::io::Lines<R>,
    line_number: usize,
}

impl<R: BufRead> EventLogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for EventLogReader<R> {
    type Item = Result<BuildEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(ComplogError::Io(e))),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(|e| {
                ComplogError::InvalidEvent(format!("line {}: {e}", self.line_number))
            }));
        }
    }
}

/// Write events as an event log, one JSON object per line.
pub fn write_event_log<'a, W: Write>(
    mut writer: W,
    events: impl IntoIterator<Item = &'a BuildEvent>,
) -> Result<()> {
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
