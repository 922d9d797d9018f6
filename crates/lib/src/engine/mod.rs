//! Profile execution engine.
//!
//! Runs a profile's phases strictly in order:
//! - preShell commands, each replacing the environment on success
//! - the filter chain, where shell steps propagate the environment and
//!   filters only observe it
//! - postShell commands
//! - the export of the pack directories
//!
//! The first fatal failure ends the run. Every state transition is logged and
//! recorded in the [`RunReport`].

pub mod types;

use std::io;

use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::env::Environment;
use crate::export::{self, ExportDescriptor, ExportError, ExportedPaths};
use crate::filter::{FilterContext, FilterError, FilterInvoker, ShellFilterInvoker};
use crate::platform::{Os, ShellProgram, select_command};
use crate::profile::{FilterStep, Phase, Profile, ShellStep, Step};
use crate::shell::{ShellError, ShellRunner};

pub use types::{EngineConfig, RunError, RunReport, RunState, StepOutcome, StepRecord};

/// A shell step with its command already chosen for the host.
#[derive(Debug)]
struct ResolvedShell<'a> {
  command: &'a str,
  continue_on_error: bool,
}

#[derive(Debug)]
enum PlannedStep<'a> {
  Shell(ResolvedShell<'a>),
  Filter(&'a FilterStep),
}

/// A validated profile, ready to execute.
#[derive(Debug)]
struct Plan<'a> {
  pre_shell: Vec<ResolvedShell<'a>>,
  filters: Vec<PlannedStep<'a>>,
  post_shell: Vec<ResolvedShell<'a>>,
}

impl<'a> Plan<'a> {
  /// Resolve every shell step for `host_os`, so an unrunnable profile fails
  /// before any step has side effects.
  fn resolve(profile: &'a Profile, host_os: &Os) -> Result<Self, RunError> {
    if profile.is_empty() && !profile.allow_empty {
      return Err(RunError::Configuration {
        phase: Phase::PreShell,
        index: 0,
        message: format!("profile '{}' has no steps", profile.name),
      });
    }

    let resolve_all = |phase: Phase, steps: &'a [ShellStep]| -> Result<Vec<ResolvedShell<'a>>, RunError> {
      steps
        .iter()
        .enumerate()
        .map(|(index, step)| resolve_shell(phase, index, step, host_os))
        .collect()
    };

    let pre_shell = resolve_all(Phase::PreShell, &profile.pre_shell)?;
    let filters = profile
      .steps
      .iter()
      .enumerate()
      .map(|(index, step)| match step {
        Step::Shell { shell } => resolve_shell(Phase::Filters, index, shell, host_os).map(PlannedStep::Shell),
        Step::Filter(filter) => Ok(PlannedStep::Filter(filter)),
      })
      .collect::<Result<Vec<_>, _>>()?;
    let post_shell = resolve_all(Phase::PostShell, &profile.post_shell)?;

    Ok(Self {
      pre_shell,
      filters,
      post_shell,
    })
  }
}

fn resolve_shell<'a>(phase: Phase, index: usize, step: &'a ShellStep, host_os: &Os) -> Result<ResolvedShell<'a>, RunError> {
  let command = select_command(&step.spec, host_os).map_err(|e| RunError::Configuration {
    phase,
    index,
    message: format!("{} on {}", e, host_os),
  })?;
  Ok(ResolvedShell {
    command,
    continue_on_error: step.continue_on_error,
  })
}

fn transition(report: &mut RunReport, to: RunState) {
  let from = report.state();
  info!(profile = %report.profile, from = %from, to = %to, "run state transition");
  report.transitions.push(to);
}

fn record(report: &mut RunReport, phase: Phase, index: usize, label: impl Into<String>, outcome: StepOutcome) {
  report.steps.push(StepRecord {
    phase,
    index,
    label: label.into(),
    outcome,
  });
}

/// Executes profiles against one project directory.
#[derive(Debug)]
pub struct Engine<F> {
  config: EngineConfig,
  runner: ShellRunner,
  invoker: F,
}

impl Engine<ShellFilterInvoker> {
  /// Engine whose filters run as shell commands.
  pub fn with_shell_filters(config: EngineConfig) -> Self {
    let invoker = ShellFilterInvoker::new(runner_for(&config));
    Self::new(config, invoker)
  }
}

fn runner_for(config: &EngineConfig) -> ShellRunner {
  let shell = ShellProgram::resolve(config.shell.as_deref(), &config.host_os);
  ShellRunner::new(shell, config.host_os.clone())
    .with_encoding(config.encoding)
    .with_stdout_assignments(config.stdout_assignments)
}

impl<F: FilterInvoker> Engine<F> {
  pub fn new(config: EngineConfig, invoker: F) -> Self {
    let runner = runner_for(&config);
    Self {
      config,
      runner,
      invoker,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn invoker(&self) -> &F {
    &self.invoker
  }

  /// Run `profile`, then export `export` if given.
  ///
  /// The environment is seeded from the host process and dropped when the
  /// run ends; the host process environment is never modified.
  pub async fn run(
    &self,
    profile: &Profile,
    export: Option<&ExportDescriptor>,
    cancel: &CancelToken,
  ) -> Result<RunReport, RunError> {
    info!(
      profile = %profile.name,
      steps = profile.step_count(),
      os = %self.config.host_os,
      shell = %self.runner.shell().program,
      "starting profile run"
    );

    let mut report = RunReport::new(&profile.name);
    match self.drive(profile, export, cancel, &mut report).await {
      Ok(()) => {
        transition(&mut report, RunState::Done);
        info!(profile = %profile.name, steps = report.steps.len(), "profile run complete");
        Ok(report)
      }
      Err(e) => {
        transition(&mut report, RunState::Failed);
        error!(
          profile = %profile.name,
          phase = %e.phase(),
          step = ?e.step_index(),
          error = %e,
          "profile run failed"
        );
        Err(e)
      }
    }
  }

  async fn drive(
    &self,
    profile: &Profile,
    export: Option<&ExportDescriptor>,
    cancel: &CancelToken,
    report: &mut RunReport,
  ) -> Result<(), RunError> {
    let plan = Plan::resolve(profile, &self.config.host_os)?;
    let mut env = Environment::from_host(self.config.host_os.is_windows());
    debug!(vars = env.len(), "seeded environment from host");

    transition(report, RunState::RunningPreShell);
    for (index, step) in plan.pre_shell.iter().enumerate() {
      self.run_shell(Phase::PreShell, index, step, &mut env, cancel, report).await?;
    }

    transition(report, RunState::RunningFilters);
    if let Err(e) = self.run_filters(&plan.filters, &mut env, cancel, report).await {
      if profile.export_partial_results
        && !matches!(e, RunError::Cancelled { .. })
        && let Some(descriptor) = export
      {
        warn!(error = %e, "filter chain failed, exporting partial results");
        transition(report, RunState::Exporting);
        match self.export(descriptor).await {
          Ok(paths) => report.exported = Some(paths),
          Err(export_err) => error!(error = %export_err, "partial export failed"),
        }
      }
      return Err(e);
    }

    transition(report, RunState::RunningPostShell);
    for (index, step) in plan.post_shell.iter().enumerate() {
      self.run_shell(Phase::PostShell, index, step, &mut env, cancel, report).await?;
    }

    if let Some(descriptor) = export {
      if cancel.is_cancelled() {
        return Err(RunError::Cancelled {
          phase: Phase::Export,
          index: 0,
        });
      }
      transition(report, RunState::Exporting);
      report.exported = Some(self.export(descriptor).await?);
    }

    Ok(())
  }

  async fn run_filters(
    &self,
    steps: &[PlannedStep<'_>],
    env: &mut Environment,
    cancel: &CancelToken,
    report: &mut RunReport,
  ) -> Result<(), RunError> {
    let phase = Phase::Filters;
    for (index, step) in steps.iter().enumerate() {
      match step {
        PlannedStep::Shell(shell) => self.run_shell(phase, index, shell, env, cancel, report).await?,
        PlannedStep::Filter(filter) if filter.disabled => {
          info!(filter = %filter.name, index, "skipping disabled filter");
          record(report, phase, index, format!("filter:{}", filter.name), StepOutcome::Skipped);
        }
        PlannedStep::Filter(filter) => {
          if cancel.is_cancelled() {
            return Err(RunError::Cancelled { phase, index });
          }
          let ctx = FilterContext {
            working_dir: &self.config.working_dir,
            host_os: &self.config.host_os,
            index,
            cancel,
          };
          match self.invoker.invoke(filter, env, &ctx).await {
            Ok(()) => record(report, phase, index, format!("filter:{}", filter.name), StepOutcome::Succeeded),
            Err(FilterError::Cancelled) => return Err(RunError::Cancelled { phase, index }),
            Err(source) => {
              return Err(RunError::Filter {
                phase,
                index,
                name: filter.name.clone(),
                source,
              });
            }
          }
        }
      }
    }
    Ok(())
  }

  async fn run_shell(
    &self,
    phase: Phase,
    index: usize,
    step: &ResolvedShell<'_>,
    env: &mut Environment,
    cancel: &CancelToken,
    report: &mut RunReport,
  ) -> Result<(), RunError> {
    if cancel.is_cancelled() {
      return Err(RunError::Cancelled { phase, index });
    }
    debug!(phase = %phase, index, cmd = %step.command, "running shell step");

    let failure = match self.runner.run(step.command, env, &self.config.working_dir, cancel).await {
      Ok(output) => {
        let changed = env.changed_names(&output.env);
        if !changed.is_empty() {
          debug!(phase = %phase, index, vars = ?changed, "environment updated");
        }
        *env = env.merge(output.env);
        record(report, phase, index, step.command, StepOutcome::Succeeded);
        return Ok(());
      }
      Err(ShellError::Cancelled) => return Err(RunError::Cancelled { phase, index }),
      Err(e @ ShellError::Spawn { .. }) => {
        return Err(RunError::Configuration {
          phase,
          index,
          message: e.to_string(),
        });
      }
      Err(ShellError::Failed { code, stderr, .. }) => (code, stderr),
      Err(other) => (None, other.to_string()),
    };

    let (code, stderr) = failure;
    if step.continue_on_error {
      warn!(
        phase = %phase,
        index,
        code = ?code,
        stderr = %stderr,
        "shell step failed, continuing"
      );
      record(report, phase, index, step.command, StepOutcome::FailedNonFatal { code });
      return Ok(());
    }

    Err(RunError::ShellExecution {
      phase,
      index,
      code,
      stderr,
    })
  }

  async fn export(&self, descriptor: &ExportDescriptor) -> Result<ExportedPaths, ExportError> {
    let descriptor = descriptor.resolved_against(&self.config.working_dir);
    let build_root = descriptor.build_root.clone();
    tokio::task::spawn_blocking(move || export::export(&descriptor))
      .await
      .map_err(|e| ExportError::Io {
        path: build_root,
        source: io::Error::other(e),
      })?
  }
}
