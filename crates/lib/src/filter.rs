//! Filter step invocation.
//!
//! The engine treats a filter as an opaque unit of work that sees the current
//! environment and either succeeds or fails. How a filter is installed or
//! executed lives behind [`FilterInvoker`]; [`ShellFilterInvoker`] runs the
//! filter's command through the host shell.

use std::future::Future;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::env::Environment;
use crate::platform::{Os, SelectError, select_command};
use crate::profile::FilterStep;
use crate::shell::{ShellError, ShellRunner};

#[derive(Debug, Error)]
pub enum FilterError {
  #[error(transparent)]
  NoCommand(#[from] SelectError),

  #[error("filter exited with code {code:?}: {stderr}")]
  Failed { code: Option<i32>, stderr: String },

  #[error("filter cancelled")]
  Cancelled,

  #[error("failed to run filter: {0}")]
  Shell(#[source] ShellError),

  /// Failure reported by a custom invoker.
  #[error("{0}")]
  Other(String),
}

impl From<ShellError> for FilterError {
  fn from(err: ShellError) -> Self {
    match err {
      ShellError::Failed { code, stderr, .. } => FilterError::Failed { code, stderr },
      ShellError::Cancelled => FilterError::Cancelled,
      other => FilterError::Shell(other),
    }
  }
}

/// Where and for which step a filter is invoked.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
  pub working_dir: &'a Path,
  pub host_os: &'a Os,
  /// Position of the step in the filter chain.
  pub index: usize,
  pub cancel: &'a CancelToken,
}

/// Runs one filter step.
///
/// Implementations must not mutate `env`; environment changes made by a
/// filter never reach later steps.
pub trait FilterInvoker: Send + Sync {
  fn invoke(
    &self,
    filter: &FilterStep,
    env: &Environment,
    ctx: &FilterContext<'_>,
  ) -> impl Future<Output = Result<(), FilterError>> + Send;
}

/// Runs a filter's command with the shell runner.
#[derive(Debug, Clone)]
pub struct ShellFilterInvoker {
  runner: ShellRunner,
}

impl ShellFilterInvoker {
  pub fn new(runner: ShellRunner) -> Self {
    Self { runner }
  }
}

impl FilterInvoker for ShellFilterInvoker {
  async fn invoke(&self, filter: &FilterStep, env: &Environment, ctx: &FilterContext<'_>) -> Result<(), FilterError> {
    let command = select_command(&filter.spec, ctx.host_os)?;
    info!(filter = %filter.name, index = ctx.index, "running filter");

    let output = self.runner.run(command, env, ctx.working_dir, ctx.cancel).await?;

    let dropped = env.changed_names(&output.env);
    if !dropped.is_empty() {
      debug!(filter = %filter.name, vars = ?dropped, "discarding filter environment changes");
    }
    Ok(())
  }
}
