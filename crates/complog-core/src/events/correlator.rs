//! Single-pass reconstruction of compiler calls from a build-event stream.
//!
//! Project executions and project evaluations are tracked separately and
//! joined by evaluation id: a multi-targeted project is evaluated once per
//! target framework but may be started many times.
//!
//! Events must be fed in the order the build produced them. The correlator
//! keeps no locks and must not be driven from more than one thread.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::domain::{CompilerCall, CompilerCallKind, Language, Result};
use crate::events::command_line::split_compiler_command_line;
use crate::events::model::{valid_id, BuildEvent, EventLogReader, TARGET_FRAMEWORK, TARGET_FRAMEWORKS};
use crate::metrics::METRICS;
use crate::obs;

/// Per-target state for a target that may host a compiler task.
#[derive(Debug)]
struct TaskState {
    target_id: i32,
    kind: CompilerCallKind,
    language: Option<Language>,
    task_id: Option<i32>,
    command_line: Option<String>,
}

impl TaskState {
    fn new(target_id: i32, kind: CompilerCallKind) -> Self {
        Self {
            target_id,
            kind,
            language: None,
            task_id: None,
            command_line: None,
        }
    }
}

/// State of one project execution (keyed by context id).
#[derive(Debug)]
struct ProjectState {
    project_file: String,
    target_framework: Option<String>,
    evaluation_id: Option<i32>,
    /// Targets in encounter order.
    targets: Vec<TaskState>,
}

impl ProjectState {
    fn target_mut(&mut self, target_id: i32) -> Option<&mut TaskState> {
        self.targets.iter_mut().find(|t| t.target_id == target_id)
    }
}

/// Properties recorded when an evaluation finished.
#[derive(Debug)]
struct EvaluationState {
    target_framework: Option<String>,
}

/// Output of a correlation pass.
#[derive(Debug, Default)]
pub struct CorrelationResult {
    /// Compiler calls in build order; within a project, regular compiles first.
    pub calls: Vec<CompilerCall>,
    /// One entry per call whose command line could not be split.
    pub diagnostics: Vec<String>,
}

/// Reconstructs compiler calls from build events.
#[derive(Debug, Default)]
pub struct EventCorrelator {
    projects: HashMap<i32, ProjectState>,
    evaluations: HashMap<i32, EvaluationState>,
    result: CorrelationResult,
    events_seen: u64,
}

impl EventCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events processed so far.
    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    /// Feed the next event.
    pub fn process(&mut self, event: &BuildEvent) {
        self.events_seen += 1;
        trace!(kind = event.kind(), "build event");
        match event {
            BuildEvent::ProjectStarted {
                context_id,
                parent_context_id,
                evaluation_id,
                project_file,
                global_properties,
            } => {
                let evaluation_id = valid_id(*evaluation_id).or_else(|| {
                    valid_id(*parent_context_id)
                        .and_then(|parent| self.projects.get(&parent))
                        .and_then(|p| p.evaluation_id)
                });
                let target_framework = global_properties
                    .get(TARGET_FRAMEWORK)
                    .filter(|v| !v.is_empty())
                    .cloned();
                let state = self
                    .projects
                    .entry(*context_id)
                    .or_insert_with(|| ProjectState {
                        project_file: project_file.clone(),
                        target_framework: None,
                        evaluation_id: None,
                        targets: Vec::new(),
                    });
                if evaluation_id.is_some() {
                    state.evaluation_id = evaluation_id;
                }
                if state.target_framework.is_none() {
                    state.target_framework = target_framework;
                }
            }
            BuildEvent::ProjectEvaluationFinished {
                evaluation_id,
                properties,
                ..
            } => {
                let target_framework = [TARGET_FRAMEWORK, TARGET_FRAMEWORKS]
                    .iter()
                    .filter_map(|name| properties.get(*name))
                    .find(|v| !v.is_empty())
                    .cloned();
                self.evaluations
                    .insert(*evaluation_id, EvaluationState { target_framework });
            }
            BuildEvent::TargetStarted {
                context_id,
                target_id,
                target_name,
                parent_target,
            } => {
                let Some(kind) = CompilerCallKind::classify(target_name, parent_target.as_deref())
                else {
                    return;
                };
                match self.projects.get_mut(context_id) {
                    Some(project) => project.targets.push(TaskState::new(*target_id, kind)),
                    None => debug!(context_id, target = %target_name, "target for unknown project"),
                }
            }
            BuildEvent::TaskStarted {
                context_id,
                target_id,
                task_id,
                task_name,
            } => {
                let Some(language) = Language::from_task_name(task_name) else {
                    return;
                };
                let Some(project) = self.projects.get_mut(context_id) else {
                    debug!(context_id, task = %task_name, "compiler task for unknown project");
                    return;
                };
                if project.target_mut(*target_id).is_none() {
                    project
                        .targets
                        .push(TaskState::new(*target_id, CompilerCallKind::Unknown));
                }
                if let Some(task) = project.target_mut(*target_id) {
                    task.language = Some(language);
                    task.task_id = Some(*task_id);
                }
            }
            BuildEvent::TaskCommandLine {
                context_id,
                target_id,
                task_id,
                command_line,
            } => {
                let task = self
                    .projects
                    .get_mut(context_id)
                    .and_then(|p| p.target_mut(*target_id))
                    .filter(|t| t.language.is_some() && t.task_id == Some(*task_id));
                if let Some(task) = task {
                    task.command_line = Some(command_line.clone());
                }
            }
            BuildEvent::ProjectFinished { context_id, .. } => self.finish_project(*context_id),
            BuildEvent::Message { .. } => {}
        }
    }

    fn finish_project(&mut self, context_id: i32) {
        let Some(mut project) = self.projects.remove(&context_id) else {
            return;
        };
        if project.target_framework.is_none() {
            project.target_framework = project
                .evaluation_id
                .and_then(|id| self.evaluations.get(&id))
                .and_then(|e| e.target_framework.clone());
        }

        let mut calls: Vec<CompilerCall> = Vec::new();
        for task in project.targets {
            // No captured command line: the target was skipped or up to date.
            let (Some(command_line), Some(language)) = (task.command_line, task.language) else {
                continue;
            };
            match split_compiler_command_line(&command_line, language) {
                Ok(split) => {
                    let call = CompilerCall::new(
                        PathBuf::from(&project.project_file),
                        task.kind,
                        project.target_framework.clone(),
                        language,
                        split.arguments,
                    )
                    .with_compiler_file_path(split.compiler_file_path);
                    METRICS.inc_calls_correlated();
                    obs::emit_call_correlated(&project.project_file, task.kind);
                    if task.kind == CompilerCallKind::Regular {
                        calls.insert(0, call);
                    } else {
                        calls.push(call);
                    }
                }
                Err(e) => {
                    obs::emit_call_rejected(&project.project_file, &e);
                    self.result
                        .diagnostics
                        .push(format!("{}: {e}", project.project_file));
                }
            }
        }
        self.result.calls.extend(calls);
    }

    /// Finish the pass. Projects that never finished contribute nothing.
    pub fn finish(self) -> CorrelationResult {
        if !self.projects.is_empty() {
            debug!(unfinished = self.projects.len(), "projects without a finish event");
        }
        self.result
    }
}

/// Correlate an in-memory event sequence.
pub fn correlate<'a>(events: impl IntoIterator<Item = &'a BuildEvent>) -> CorrelationResult {
    let mut correlator = EventCorrelator::new();
    for event in events {
        correlator.process(event);
    }
    correlator.finish()
}

/// Correlate an event log file. A malformed line aborts the pass.
pub fn correlate_log(reader: impl BufRead) -> Result<CorrelationResult> {
    let mut correlator = EventCorrelator::new();
    for event in EventLogReader::new(reader) {
        correlator.process(&event?);
    }
    Ok(correlator.finish())
}
