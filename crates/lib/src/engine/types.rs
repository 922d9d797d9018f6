//! Types for profile execution.
//!
//! This module defines the engine configuration, the run state machine, the
//! run report and the error returned when a run fails.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::export::{ExportError, ExportedPaths};
use crate::filter::FilterError;
use crate::platform::Os;
use crate::profile::Phase;
use crate::shell::OutputEncoding;

/// Host and process settings for a run.
///
/// Nothing in the engine reads global state; everything host-specific comes
/// from here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub host_os: Os,
  /// Shell program overriding the host default.
  pub shell: Option<String>,
  pub encoding: OutputEncoding,
  /// Directory every step runs in.
  pub working_dir: PathBuf,
  /// Apply `NAME=value` stdout lines of shell steps as exports.
  pub stdout_assignments: bool,
}

impl EngineConfig {
  /// Defaults for running in `dir` on the current host.
  pub fn for_project(dir: impl Into<PathBuf>) -> Self {
    Self {
      host_os: Os::current(),
      shell: None,
      encoding: OutputEncoding::default(),
      working_dir: dir.into(),
      stdout_assignments: true,
    }
  }

  pub fn with_host_os(mut self, os: Os) -> Self {
    self.host_os = os;
    self
  }

  pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
    self.shell = Some(shell.into());
    self
  }

  pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
    self.encoding = encoding;
    self
  }

  pub fn with_stdout_assignments(mut self, enabled: bool) -> Self {
    self.stdout_assignments = enabled;
    self
  }
}

/// States of a profile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
  Init,
  RunningPreShell,
  RunningFilters,
  RunningPostShell,
  Exporting,
  Done,
  Failed,
}

impl RunState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, RunState::Done | RunState::Failed)
  }
}

impl fmt::Display for RunState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      RunState::Init => "init",
      RunState::RunningPreShell => "running-pre-shell",
      RunState::RunningFilters => "running-filters",
      RunState::RunningPostShell => "running-post-shell",
      RunState::Exporting => "exporting",
      RunState::Done => "done",
      RunState::Failed => "failed",
    };
    f.write_str(s)
  }
}

/// How a single step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StepOutcome {
  Succeeded,
  /// Failed, but the step allowed the run to continue.
  FailedNonFatal { code: Option<i32> },
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
  pub phase: Phase,
  pub index: usize,
  pub label: String,
  pub outcome: StepOutcome,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
  pub profile: String,
  pub steps: Vec<StepRecord>,
  pub transitions: Vec<RunState>,
  pub exported: Option<ExportedPaths>,
}

impl RunReport {
  pub fn new(profile: impl Into<String>) -> Self {
    Self {
      profile: profile.into(),
      steps: Vec::new(),
      transitions: vec![RunState::Init],
      exported: None,
    }
  }

  pub fn state(&self) -> RunState {
    self.transitions.last().copied().unwrap_or(RunState::Init)
  }

  pub fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
    self.steps.iter().filter(|s| pred(&s.outcome)).count()
  }
}

/// The first fatal error of a run.
#[derive(Debug, Error)]
pub enum RunError {
  /// The profile cannot run on this host as written.
  #[error("{phase} step {index}: {message}")]
  Configuration { phase: Phase, index: usize, message: String },

  #[error("{phase} step {index} failed with exit code {code:?}: {stderr}")]
  ShellExecution {
    phase: Phase,
    index: usize,
    code: Option<i32>,
    stderr: String,
  },

  #[error("{phase} step {index}: filter '{name}' failed: {source}")]
  Filter {
    phase: Phase,
    index: usize,
    name: String,
    #[source]
    source: FilterError,
  },

  #[error("export failed: {0}")]
  Export(#[from] ExportError),

  #[error("cancelled at {phase} step {index}")]
  Cancelled { phase: Phase, index: usize },
}

impl RunError {
  pub fn phase(&self) -> Phase {
    match self {
      RunError::Configuration { phase, .. }
      | RunError::ShellExecution { phase, .. }
      | RunError::Filter { phase, .. }
      | RunError::Cancelled { phase, .. } => *phase,
      RunError::Export(_) => Phase::Export,
    }
  }

  /// Index of the failing step within its phase; `None` for export failures.
  pub fn step_index(&self) -> Option<usize> {
    match self {
      RunError::Configuration { index, .. }
      | RunError::ShellExecution { index, .. }
      | RunError::Filter { index, .. }
      | RunError::Cancelled { index, .. } => Some(*index),
      RunError::Export(_) => None,
    }
  }
}
