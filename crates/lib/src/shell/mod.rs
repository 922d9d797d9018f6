//! Shell command runner.
//!
//! Runs a single command string in the host shell with an exact environment
//! and returns the environment the command left behind, so the next step can
//! observe variables it exported.

pub mod encoding;
pub mod transport;

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::env::Environment;
use crate::platform::{Os, ShellKind, ShellProgram};

pub use encoding::OutputEncoding;

/// How long output is still read after the shell exits. A background process
/// started by the command may hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Errors from running one shell command.
#[derive(Debug, Error)]
pub enum ShellError {
  /// The shell binary could not be started.
  #[error("failed to spawn shell '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  /// The command exited unsuccessfully.
  #[error("command failed with exit code {code:?}")]
  Failed {
    code: Option<i32>,
    stdout: String,
    stderr: String,
  },

  /// The run was cancelled while the command was running.
  #[error("command cancelled")]
  Cancelled,

  /// The side-channel file could not be prepared or read.
  #[error("environment transport failed: {0}")]
  Transport(#[source] io::Error),

  /// Waiting on the child or reading its output failed.
  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

/// What a successful command produced.
#[derive(Debug, Clone)]
pub struct ShellOutput {
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  /// Environment as observed when the command finished.
  pub env: Environment,
}

/// Runs hook commands in the host shell.
#[derive(Debug, Clone)]
pub struct ShellRunner {
  shell: ShellProgram,
  host_os: Os,
  encoding: OutputEncoding,
  stdout_assignments: bool,
}

impl ShellRunner {
  pub fn new(shell: ShellProgram, host_os: Os) -> Self {
    Self {
      shell,
      host_os,
      encoding: OutputEncoding::default(),
      stdout_assignments: true,
    }
  }

  pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
    self.encoding = encoding;
    self
  }

  /// Whether `NAME=value` lines on stdout are applied as exports.
  pub fn with_stdout_assignments(mut self, enabled: bool) -> Self {
    self.stdout_assignments = enabled;
    self
  }

  pub fn shell(&self) -> &ShellProgram {
    &self.shell
  }

  /// Run `command` in `working_dir` with exactly `env` as its environment.
  ///
  /// Nothing from the host process environment leaks into the child; `env`
  /// is the whole environment. On success the returned [`ShellOutput::env`]
  /// is the environment at the end of the command.
  pub async fn run(
    &self,
    command: &str,
    env: &Environment,
    working_dir: &Path,
    cancel: &CancelToken,
  ) -> Result<ShellOutput, ShellError> {
    if cancel.is_cancelled() {
      return Err(ShellError::Cancelled);
    }

    info!(cmd = %command, "executing shell command");

    let channel = tempfile::Builder::new()
      .prefix("packsmith-env-")
      .tempdir()
      .map_err(ShellError::Transport)?;
    let env_file = channel.path().join("env.txt");

    let script = transport::wrap(self.shell.kind, command);

    let mut cmd = Command::new(&self.shell.program);
    cmd
      .args(&self.shell.args)
      .arg(&script)
      .current_dir(working_dir)
      .env_clear()
      .envs(env.iter())
      .env(transport::ENV_FILE_VAR, &env_file)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    // Own process group so cancellation also reaches grandchildren.
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(shell = %self.shell.program, working_dir = ?working_dir, "spawning process");

    let mut child = cmd.spawn().map_err(|source| ShellError::Spawn {
      program: self.shell.program.clone(),
      source,
    })?;

    let finished = tokio::select! {
      result = wait_with_output(&mut child) => Some(result),
      _ = cancel.cancelled() => None,
    };

    let Some(result) = finished else {
      warn!(cmd = %command, "cancelled, killing shell");
      #[cfg(unix)]
      kill_process_group(&child);
      if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill cancelled shell");
      }
      return Err(ShellError::Cancelled);
    };
    let (status, stdout, stderr) = result?;

    let stdout = encoding::decode(&stdout, self.encoding);
    let stderr = encoding::decode(&stderr, self.encoding);

    if !stdout.trim().is_empty() {
      debug!(stdout = %stdout.trim_end(), "command stdout");
    }
    if !stderr.trim().is_empty() {
      debug!(stderr = %stderr.trim_end(), "command stderr");
    }

    if !status.success() {
      return Err(ShellError::Failed {
        code: status.code(),
        stdout,
        stderr: stderr.trim().to_string(),
      });
    }

    let captured = self.read_environment(&env_file, env)?;
    let env = self.apply_stdout_assignments(env, captured, &stdout);

    Ok(ShellOutput {
      code: status.code(),
      stdout,
      stderr,
      env,
    })
  }

  fn read_environment(&self, env_file: &Path, input: &Environment) -> Result<Environment, ShellError> {
    let bytes = match std::fs::read(env_file) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        // The command replaced or bypassed the wrapper (e.g. `exec`).
        warn!("shell did not write its environment, keeping the previous one");
        return Ok(input.clone());
      }
      Err(e) => return Err(ShellError::Transport(e)),
    };

    let text = encoding::decode(&bytes, self.encoding);
    let vars = match self.shell.kind {
      ShellKind::Posix => transport::parse_export_dump(&text),
      ShellKind::PowerShell | ShellKind::Cmd => Ok(transport::parse_env_dump(&text)),
    }
    .and_then(|vars| transport::check_complete(&vars).map(|()| vars))
    .map_err(|e| ShellError::Transport(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let captured = Environment::for_host_convention(self.host_os.is_windows())
      .with_pairs(vars.into_iter().filter(|(name, _)| !transport::is_wrapper_var(name)));

    debug!(vars = captured.len(), "captured shell environment");
    Ok(captured)
  }

  /// Apply `NAME=value` lines from stdout to `captured`.
  ///
  /// The captured environment wins for every name the command changed itself:
  /// a variable it unset, exported or modified keeps its captured state. Only
  /// names the command left untouched take the echoed value.
  fn apply_stdout_assignments(&self, input: &Environment, mut captured: Environment, stdout: &str) -> Environment {
    if !self.stdout_assignments {
      return captured;
    }
    for (name, value) in transport::parse_stdout_assignments(stdout) {
      let changed_by_command = match (input.get(&name), captured.get(&name)) {
        (Some(_), None) => true,
        (before, Some(after)) => before != Some(after),
        (None, None) => false,
      };
      if transport::is_wrapper_var(&name) {
        continue;
      }
      if changed_by_command {
        debug!(name = %name, "ignoring stdout assignment for a variable the command changed");
        continue;
      }
      debug!(name = %name, "exporting stdout assignment");
      captured.set(name, value);
    }
    captured
  }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
  use rustix::process::{Pid, Signal, kill_process_group};

  let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()).and_then(Pid::from_raw) else {
    return;
  };
  if let Err(e) = kill_process_group(pid, Signal::KILL) {
    debug!(error = %e, "failed to signal process group");
  }
}

/// Wait for the child while draining both pipes, so a chatty child cannot
/// block on a full pipe buffer.
///
/// Once the shell exits the pipes are read for at most [`DRAIN_GRACE`] more.
async fn wait_with_output(child: &mut Child) -> io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
  let stdout = child.stdout.take();
  let stderr = child.stderr.take();
  let (exited_tx, exited_rx) = watch::channel(false);

  let wait = async {
    let status = child.wait().await;
    let _ = exited_tx.send(true);
    status
  };
  let (status, stdout, stderr) = tokio::join!(
    wait,
    read_stream(stdout, exited_rx.clone()),
    read_stream(stderr, exited_rx)
  );
  Ok((status?, stdout?, stderr?))
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>, mut exited: watch::Receiver<bool>) -> io::Result<Vec<u8>> {
  let mut buf = Vec::new();
  let Some(mut stream) = stream else {
    return Ok(buf);
  };

  let mut chunk = [0u8; 8192];
  loop {
    tokio::select! {
      read = stream.read(&mut chunk) => {
        let n = read?;
        if n == 0 {
          return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..n]);
      }
      _ = exited.wait_for(|exited| *exited) => break,
    }
  }

  let drain = async {
    loop {
      let n = stream.read(&mut chunk).await?;
      if n == 0 {
        return Ok::<(), io::Error>(());
      }
      buf.extend_from_slice(&chunk[..n]);
    }
  };
  match tokio::time::timeout(DRAIN_GRACE, drain).await {
    Ok(result) => result?,
    Err(_) => debug!("output still held open after the shell exited, stopped reading"),
  }
  Ok(buf)
}
