//! Profile data model.
//!
//! A [`Profile`] is the fully resolved input of a run: the preShell hooks, the
//! filter chain and the postShell hooks, in declaration order. Profiles are
//! immutable once loaded; the engine only borrows them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A command with optional per-OS overrides.
///
/// `os_commands` is keyed by OS identifier (`linux`, `darwin`, `windows`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub os_commands: BTreeMap<String, String>,
}

impl CommandSpec {
  pub fn new(command: impl Into<String>) -> Self {
    Self {
      command: Some(command.into()),
      os_commands: BTreeMap::new(),
    }
  }

  /// A spec with only OS-specific variants and no generic fallback.
  pub fn os_only() -> Self {
    Self::default()
  }

  pub fn with_os_command(mut self, os: impl Into<String>, command: impl Into<String>) -> Self {
    self.os_commands.insert(os.into(), command.into());
    self
  }
}

/// A shell hook.
///
/// In a project file it is either a bare command string or an object with
/// `command`, `osCommands` and `continueOnError`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawShellStep", rename_all = "camelCase")]
pub struct ShellStep {
  #[serde(flatten)]
  pub spec: CommandSpec,
  /// A failing step is logged and skipped instead of failing the run.
  pub continue_on_error: bool,
}

impl ShellStep {
  pub fn new(command: impl Into<String>) -> Self {
    Self::from_spec(CommandSpec::new(command))
  }

  pub fn from_spec(spec: CommandSpec) -> Self {
    Self {
      spec,
      continue_on_error: false,
    }
  }

  pub fn with_os_command(mut self, os: impl Into<String>, command: impl Into<String>) -> Self {
    self.spec = self.spec.with_os_command(os, command);
    self
  }

  pub fn continue_on_error(mut self) -> Self {
    self.continue_on_error = true;
    self
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawShellStep {
  Bare(String),
  Full {
    #[serde(flatten)]
    spec: CommandSpec,
    #[serde(default, rename = "continueOnError")]
    continue_on_error: bool,
  },
}

impl From<RawShellStep> for ShellStep {
  fn from(raw: RawShellStep) -> Self {
    match raw {
      RawShellStep::Bare(command) => ShellStep::new(command),
      RawShellStep::Full { spec, continue_on_error } => ShellStep { spec, continue_on_error },
    }
  }
}

/// A filter in the chain.
///
/// The engine only looks at `name` and `disabled`; everything else is for the
/// [`FilterInvoker`](crate::filter::FilterInvoker) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStep {
  #[serde(rename = "filter")]
  pub name: String,
  #[serde(flatten)]
  pub spec: CommandSpec,
  #[serde(default)]
  pub disabled: bool,
}

impl FilterStep {
  pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      spec: CommandSpec::new(command),
      disabled: false,
    }
  }

  pub fn disabled(mut self) -> Self {
    self.disabled = true;
    self
  }
}

/// One entry of the filter chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
  Filter(FilterStep),
  Shell { shell: ShellStep },
}

impl Step {
  pub fn shell(step: ShellStep) -> Self {
    Step::Shell { shell: step }
  }
}

impl From<FilterStep> for Step {
  fn from(filter: FilterStep) -> Self {
    Step::Filter(filter)
  }
}

impl From<ShellStep> for Step {
  fn from(shell: ShellStep) -> Self {
    Step::Shell { shell }
  }
}

/// A named, ordered build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  #[serde(skip)]
  pub name: String,
  #[serde(default)]
  pub pre_shell: Vec<ShellStep>,
  #[serde(default, rename = "filters")]
  pub steps: Vec<Step>,
  #[serde(default)]
  pub post_shell: Vec<ShellStep>,
  /// Export whatever the chain produced even when a filter fails.
  #[serde(default)]
  pub export_partial_results: bool,
  /// Accept a profile with no steps at all.
  #[serde(default)]
  pub allow_empty: bool,
}

impl Profile {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  pub fn with_pre_shell(mut self, step: ShellStep) -> Self {
    self.pre_shell.push(step);
    self
  }

  pub fn with_step(mut self, step: impl Into<Step>) -> Self {
    self.steps.push(step.into());
    self
  }

  pub fn with_post_shell(mut self, step: ShellStep) -> Self {
    self.post_shell.push(step);
    self
  }

  pub fn export_partial_results(mut self) -> Self {
    self.export_partial_results = true;
    self
  }

  pub fn allow_empty(mut self) -> Self {
    self.allow_empty = true;
    self
  }

  pub fn is_empty(&self) -> bool {
    self.pre_shell.is_empty() && self.steps.is_empty() && self.post_shell.is_empty()
  }

  pub fn step_count(&self) -> usize {
    self.pre_shell.len() + self.steps.len() + self.post_shell.len()
  }
}

/// Phase of a profile run, used to attribute steps and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
  PreShell,
  Filters,
  PostShell,
  Export,
}

impl Phase {
  pub fn as_str(&self) -> &'static str {
    match self {
      Phase::PreShell => "preShell",
      Phase::Filters => "filters",
      Phase::PostShell => "postShell",
      Phase::Export => "export",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
