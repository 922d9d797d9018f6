//! Host platform handling: OS identity, command variant selection and the
//! shell used to run hooks.

pub mod os;

use thiserror::Error;

use crate::profile::CommandSpec;

pub use os::Os;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
  #[error("no command for step")]
  NoCommand,
}

/// Pick the command to run on `host_os`.
///
/// An exact, non-empty `osCommands` entry for the host wins; otherwise the
/// generic `command` is used. Blank entries count as absent.
pub fn select_command<'a>(spec: &'a CommandSpec, host_os: &Os) -> Result<&'a str, SelectError> {
  let non_blank = |s: &&String| !s.trim().is_empty();

  spec
    .os_commands
    .get(host_os.as_str())
    .filter(non_blank)
    .or_else(|| spec.command.as_ref().filter(non_blank))
    .map(String::as_str)
    .ok_or(SelectError::NoCommand)
}

/// The dialect of the shell running a hook.
///
/// The dialect decides how the command is wrapped so the environment can be
/// read back after it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
  Posix,
  PowerShell,
  Cmd,
}

/// A resolved shell program with the arguments preceding the command text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellProgram {
  pub program: String,
  pub args: Vec<String>,
  pub kind: ShellKind,
}

impl ShellProgram {
  /// Resolve the shell for `host_os`, honoring an explicit override.
  ///
  /// An override's dialect is detected from its name. Without one, `/bin/sh`
  /// is used on Unix-likes and Windows PowerShell on Windows; a user's `$SHELL`
  /// is never consulted because login shells may rewrite the environment.
  pub fn resolve(override_shell: Option<&str>, host_os: &Os) -> Self {
    if let Some(shell) = override_shell {
      let lower = shell.to_ascii_lowercase();
      let kind = if lower.contains("powershell") || lower.contains("pwsh") {
        ShellKind::PowerShell
      } else if program_stem(&lower) == "cmd" {
        ShellKind::Cmd
      } else {
        ShellKind::Posix
      };
      return Self::with_kind(shell, kind);
    }

    if host_os.is_windows() {
      Self::with_kind("powershell.exe", ShellKind::PowerShell)
    } else {
      Self::with_kind("/bin/sh", ShellKind::Posix)
    }
  }

  fn with_kind(program: &str, kind: ShellKind) -> Self {
    let args = match kind {
      ShellKind::Posix => vec!["-c"],
      ShellKind::PowerShell => vec!["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"],
      ShellKind::Cmd => vec!["/D", "/V:ON", "/C"],
    };
    Self {
      program: program.to_string(),
      args: args.into_iter().map(String::from).collect(),
      kind,
    }
  }
}

/// File name of `program` without directories or an `.exe` extension. Both
/// separators are accepted so Windows paths resolve on any host.
fn program_stem(program: &str) -> &str {
  let name = program.rsplit(['/', '\\']).next().unwrap_or(program);
  name.strip_suffix(".exe").unwrap_or(name)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn all_variants() -> CommandSpec {
    CommandSpec::os_only()
      .with_os_command("windows", "A")
      .with_os_command("linux", "B")
      .with_os_command("darwin", "C")
  }

  #[test]
  fn selects_exact_os_entry() {
    let spec = all_variants();
    assert_eq!(select_command(&spec, &Os::Linux), Ok("B"));
    assert_eq!(select_command(&spec, &Os::Windows), Ok("A"));
    assert_eq!(select_command(&spec, &Os::MacOs), Ok("C"));
  }

  #[test]
  fn falls_back_to_generic_command() {
    let spec = CommandSpec::new("D").with_os_command("windows", "A");
    assert_eq!(select_command(&spec, &Os::Linux), Ok("D"));
    assert_eq!(select_command(&spec, &Os::Other("freebsd".into())), Ok("D"));
  }

  #[test]
  fn blank_os_entry_falls_back() {
    let spec = CommandSpec::new("D").with_os_command("linux", "   ");
    assert_eq!(select_command(&spec, &Os::Linux), Ok("D"));
  }

  #[test]
  fn missing_command_is_an_error() {
    let spec = CommandSpec::os_only().with_os_command("windows", "A");
    assert_eq!(select_command(&spec, &Os::Linux), Err(SelectError::NoCommand));

    let blank = CommandSpec::new("");
    assert_eq!(select_command(&blank, &Os::Linux), Err(SelectError::NoCommand));
  }

  #[test]
  fn default_shell_per_os() {
    let unix = ShellProgram::resolve(None, &Os::Linux);
    assert_eq!(unix.program, "/bin/sh");
    assert_eq!(unix.args, vec!["-c"]);
    assert_eq!(unix.kind, ShellKind::Posix);

    let windows = ShellProgram::resolve(None, &Os::Windows);
    assert_eq!(windows.program, "powershell.exe");
    assert_eq!(windows.args, vec!["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"]);
    assert_eq!(windows.kind, ShellKind::PowerShell);
  }

  #[test]
  fn cmd_is_matched_by_file_stem() {
    for program in ["cmd", "CMD.EXE", "C:\\Windows\\System32\\cmd.exe", "/mnt/c/Windows/cmd.exe"] {
      assert_eq!(ShellProgram::resolve(Some(program), &Os::Windows).kind, ShellKind::Cmd, "{}", program);
    }
    for program in ["/usr/local/bin/xcmd", "mycmd.exe", "cmdsh"] {
      assert_eq!(ShellProgram::resolve(Some(program), &Os::Linux).kind, ShellKind::Posix, "{}", program);
    }
  }

  #[test]
  fn override_detects_dialect() {
    assert_eq!(ShellProgram::resolve(Some("/usr/bin/bash"), &Os::Linux).kind, ShellKind::Posix);
    assert_eq!(ShellProgram::resolve(Some("pwsh"), &Os::Linux).kind, ShellKind::PowerShell);
    let cmd = ShellProgram::resolve(Some("cmd.exe"), &Os::Windows);
    assert_eq!(cmd.kind, ShellKind::Cmd);
    assert_eq!(cmd.args, vec!["/D", "/V:ON", "/C"]);
  }
}
