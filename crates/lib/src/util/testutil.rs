//! Test utilities for packsmith-lib.
//!
//! Cross-platform command snippets for tests that run real shells, plus
//! runners and environments seeded from the host.

use crate::env::Environment;
use crate::platform::{Os, ShellProgram};
use crate::shell::ShellRunner;

/// Environment seeded from the test process, as the engine would seed it.
pub fn seed_env() -> Environment {
  Environment::from_host(Os::current().is_windows())
}

/// Runner using the host's default shell.
pub fn host_runner() -> ShellRunner {
  let os = Os::current();
  ShellRunner::new(ShellProgram::resolve(None, &os), os)
}

/// Command that creates an empty file in the current directory.
#[cfg(unix)]
pub fn create_marker(name: &str) -> String {
  format!("touch {}", name)
}

#[cfg(windows)]
pub fn create_marker(name: &str) -> String {
  format!("New-Item -ItemType File -Path '{}' -Force | Out-Null", name)
}

/// Command that writes the value of `var` into `file`.
#[cfg(unix)]
pub fn write_var(var: &str, file: &str) -> String {
  format!("echo \"${}\" > {}", var, file)
}

#[cfg(windows)]
pub fn write_var(var: &str, file: &str) -> String {
  format!("Write-Output $env:{} | Out-File -FilePath {}", var, file)
}

/// Command that appends `line` to `file`.
#[cfg(unix)]
pub fn append_line(line: &str, file: &str) -> String {
  format!("echo {} >> {}", line, file)
}

#[cfg(windows)]
pub fn append_line(line: &str, file: &str) -> String {
  format!("Add-Content -Path {} -Value {}", file, line)
}

/// Command that exits with `code`.
pub fn exit_with(code: i32) -> String {
  format!("exit {}", code)
}
