//! Implementation of the `packsmith run` command.
//!
//! Loads the project file, runs the selected profile on a tokio runtime and
//! prints a summary of the steps and exported packs. Ctrl-C cancels the run
//! and kills the running step.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::warn;

use packsmith_lib::engine::{Engine, EngineConfig, RunReport, StepOutcome};
use packsmith_lib::project::Project;
use packsmith_lib::shell::OutputEncoding;
use packsmith_lib::CancelToken;

use crate::output::{
  OutputFormat, format_duration, outcome_marker, print_json, print_stat, print_success, print_warning, symbols,
  truncate_hash,
};

pub struct RunArgs {
  pub project: PathBuf,
  pub profile: String,
  pub shell: Option<String>,
  pub encoding: OutputEncoding,
  pub partial_export: bool,
  pub export: bool,
  pub timeout: Option<Duration>,
  pub output: OutputFormat,
}

pub fn cmd_run(args: RunArgs) -> Result<()> {
  let project_dir = dunce::canonicalize(&args.project)
    .with_context(|| format!("Project directory not found: {}", args.project.display()))?;
  let project = Project::load(&project_dir).context("Failed to load project")?;

  let mut profile = project.profile(&args.profile)?;
  if args.partial_export {
    profile.export_partial_results = true;
  }
  let descriptor = args.export.then(|| project.export_descriptor());

  let mut config = EngineConfig::for_project(&project_dir).with_encoding(args.encoding);
  if let Some(shell) = &args.shell {
    config = config.with_shell(shell);
  }
  let engine = Engine::with_shell_filters(config);

  let cancel = CancelToken::new();
  let start = Instant::now();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(async {
      let on_interrupt = cancel.clone();
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          warn!("interrupt received, cancelling run");
          on_interrupt.cancel();
        }
      });

      if let Some(timeout) = args.timeout {
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
          tokio::time::sleep(timeout).await;
          warn!(timeout = %humantime::format_duration(timeout), "run timed out, cancelling");
          on_timeout.cancel();
        });
      }

      engine.run(&profile, descriptor.as_ref(), &cancel).await
    })
    .with_context(|| format!("Profile '{}' failed", profile.name))?;

  if args.output.is_json() {
    return print_json(&report);
  }
  print_summary(&report, start.elapsed());
  Ok(())
}

fn print_summary(report: &RunReport, elapsed: Duration) {
  for step in &report.steps {
    println!("  {} {}[{}] {}", outcome_marker(&step.outcome), step.phase, step.index, step.label);
  }

  let non_fatal = report.count(|o| matches!(o, StepOutcome::FailedNonFatal { .. }));
  if non_fatal > 0 {
    print_warning(&format!("{} step(s) failed but were allowed to continue", non_fatal));
  }

  print_success(&format!(
    "Profile '{}' complete in {}",
    report.profile,
    format_duration(elapsed)
  ));
  print_stat("Steps run", &report.count(|o| !matches!(o, StepOutcome::Skipped)).to_string());
  print_stat("Skipped", &report.count(|o| matches!(o, StepOutcome::Skipped)).to_string());

  if let Some(exported) = &report.exported {
    for pack in &exported.packs {
      print_stat(
        &format!("{} pack", pack.kind),
        &format!(
          "{} {} {}",
          pack.path.display(),
          symbols::ARROW,
          truncate_hash(&pack.digest.0)
        ),
      );
    }
  }
}
