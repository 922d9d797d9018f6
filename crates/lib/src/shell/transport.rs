//! Environment transport between a shell step and the runner.
//!
//! A child cannot change its parent's environment, so the command is wrapped
//! in a short script that runs it in the same shell and dumps the resulting
//! environment to the file named by [`ENV_FILE_VAR`]. POSIX shells dump from an
//! `EXIT` trap with the `export -p` builtin, so an explicit `exit` or a `PATH`
//! without `env` on it still produces a dump. The runner reads that file back
//! after the child exits.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

use crate::platform::ShellKind;

/// Variable holding the path of the side-channel file.
pub const ENV_FILE_VAR: &str = "PACKSMITH_ENV_FILE";

/// Scratch variables the wrappers set; never propagated.
const WRAPPER_VARS: &[&str] = &[ENV_FILE_VAR, "__PACKSMITH_STATUS", "_"];

/// A side-channel dump that cannot be trusted as the step's environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DumpError {
  #[error("environment dump is empty")]
  Empty,

  #[error("environment dump does not contain {ENV_FILE_VAR}, it is incomplete")]
  Incomplete,

  #[error("unterminated quote in environment dump")]
  UnterminatedQuote,

  #[error("unexpected line in environment dump: {0}")]
  UnexpectedLine(String),
}

/// Wrap `command` so the environment is written to the side channel.
pub fn wrap(kind: ShellKind, command: &str) -> String {
  match kind {
    ShellKind::Posix => format!(
      "trap '__PACKSMITH_STATUS=$?; export -p > \"${var}\"; exit $__PACKSMITH_STATUS' EXIT\n{command}\n",
      command = command,
      var = ENV_FILE_VAR,
    ),
    ShellKind::PowerShell => format!(
      "{command}\n\
       $__packsmith_ok = $?; $__packsmith_code = $LASTEXITCODE\n\
       if (-not $__packsmith_code) {{ $__packsmith_code = $(if ($__packsmith_ok) {{ 0 }} else {{ 1 }}) }}\n\
       Get-ChildItem Env: | ForEach-Object {{ \"$($_.Name)=$($_.Value)\" }} | Out-File -FilePath $env:{var}\n\
       exit $__packsmith_code\n",
      command = command,
      var = ENV_FILE_VAR,
    ),
    // cmd.exe reads a single line; `!var!` needs delayed expansion (/V:ON).
    ShellKind::Cmd => format!(
      "{command} & (set \"__PACKSMITH_STATUS=!ERRORLEVEL!\") & (set > \"%{var}%\") & exit /b !__PACKSMITH_STATUS!",
      command = command.lines().collect::<Vec<_>>().join(" & "),
      var = ENV_FILE_VAR,
    ),
  }
}

/// Whether `name` may be set by an assignment line.
pub fn is_valid_name(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
  let (name, value) = line.split_once('=')?;
  is_valid_name(name).then_some((name, value))
}

/// Parse an environment dump of `NAME=value` lines, as the PowerShell and
/// cmd wrappers write it.
///
/// A line that does not start with a valid name continues the previous value.
/// Such dumps are unquoted, so a continuation line that itself looks like
/// `NAME=value` is read as a new variable. Windows pseudo-variables such as
/// `=C:` are dropped.
pub fn parse_env_dump(text: &str) -> Vec<(String, String)> {
  let mut vars: Vec<(String, String)> = Vec::new();

  for line in text.lines() {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match split_assignment(line) {
      Some((name, value)) => vars.push((name.to_string(), value.to_string())),
      None => {
        if let Some((_, value)) = vars.last_mut()
          && !line.starts_with('=')
        {
          value.push('\n');
          value.push_str(line);
        }
      }
    }
  }

  vars
}

/// Parse the output of `export -p`.
///
/// Accepts the forms POSIX shells print: `export NAME='value'` (dash, ash),
/// `export NAME="value"` and `declare -x NAME="value"` (bash), and bare or
/// `$'...'` words (zsh). Values are shell words, so quoted newlines stay
/// inside the value. Names exported without a value are not in the
/// environment and are skipped.
pub fn parse_export_dump(text: &str) -> Result<Vec<(String, String)>, DumpError> {
  let mut vars = Vec::new();
  let mut chars = text.chars().peekable();

  loop {
    let words = read_record(&mut chars)?;
    let Some(words) = words else { break };
    let Some((command, rest)) = words.split_first() else {
      continue;
    };
    if !matches!(command.as_str(), "export" | "declare" | "typeset") {
      return Err(DumpError::UnexpectedLine(words.join(" ")));
    }
    let Some(word) = rest.iter().find(|w| !w.starts_with('-')) else {
      return Err(DumpError::UnexpectedLine(words.join(" ")));
    };
    match word.split_once('=') {
      Some((name, value)) if is_valid_name(name) => vars.push((name.to_string(), value.to_string())),
      Some(_) => return Err(DumpError::UnexpectedLine(words.join(" "))),
      None => {}
    }
  }

  Ok(vars)
}

/// Check that a parsed dump came from the wrapper and was written in full.
pub fn check_complete(vars: &[(String, String)]) -> Result<(), DumpError> {
  if vars.is_empty() {
    return Err(DumpError::Empty);
  }
  if !vars.iter().any(|(name, _)| name.eq_ignore_ascii_case(ENV_FILE_VAR)) {
    return Err(DumpError::Incomplete);
  }
  Ok(())
}

/// Read the words of one record, up to an unquoted newline.
///
/// Returns `None` at the end of input.
fn read_record(chars: &mut Peekable<Chars<'_>>) -> Result<Option<Vec<String>>, DumpError> {
  if chars.peek().is_none() {
    return Ok(None);
  }
  let mut words = Vec::new();
  loop {
    match chars.peek() {
      None => break,
      Some('\n') => {
        chars.next();
        break;
      }
      Some(' ' | '\t' | '\r') => {
        chars.next();
      }
      Some(_) => words.push(read_word(chars)?),
    }
  }
  Ok(Some(words))
}

fn read_word(chars: &mut Peekable<Chars<'_>>) -> Result<String, DumpError> {
  let mut word = String::new();
  while let Some(&c) = chars.peek() {
    match c {
      ' ' | '\t' | '\r' | '\n' => break,
      '\'' => {
        chars.next();
        loop {
          match chars.next() {
            Some('\'') => break,
            Some(c) => word.push(c),
            None => return Err(DumpError::UnterminatedQuote),
          }
        }
      }
      '"' => {
        chars.next();
        loop {
          match chars.next() {
            Some('"') => break,
            Some('\\') => match chars.next() {
              Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
              Some('\n') => {}
              Some(c) => {
                word.push('\\');
                word.push(c);
              }
              None => return Err(DumpError::UnterminatedQuote),
            },
            Some(c) => word.push(c),
            None => return Err(DumpError::UnterminatedQuote),
          }
        }
      }
      '$' => {
        chars.next();
        if chars.peek() == Some(&'\'') {
          chars.next();
          read_ansi_c(chars, &mut word)?;
        } else {
          word.push('$');
        }
      }
      '\\' => {
        chars.next();
        match chars.next() {
          Some('\n') => {}
          Some(c) => word.push(c),
          None => word.push('\\'),
        }
      }
      c => {
        chars.next();
        word.push(c);
      }
    }
  }
  Ok(word)
}

/// Body of a `$'...'` word, after the opening quote.
fn read_ansi_c(chars: &mut Peekable<Chars<'_>>, word: &mut String) -> Result<(), DumpError> {
  loop {
    match chars.next() {
      Some('\'') => return Ok(()),
      Some('\\') => match chars.next() {
        Some('n') => word.push('\n'),
        Some('t') => word.push('\t'),
        Some('r') => word.push('\r'),
        Some('a') => word.push('\x07'),
        Some('b') => word.push('\x08'),
        Some('e' | 'E') => word.push('\x1b'),
        Some('f') => word.push('\x0c'),
        Some('v') => word.push('\x0b'),
        Some('x') => {
          let mut hex = String::new();
          while hex.len() < 2
            && let Some(&c) = chars.peek()
            && c.is_ascii_hexdigit()
          {
            hex.push(c);
            chars.next();
          }
          match u8::from_str_radix(&hex, 16) {
            Ok(byte) => word.push(char::from(byte)),
            Err(_) => word.push_str("\\x"),
          }
        }
        Some(c @ ('\\' | '\'' | '"' | '?')) => word.push(c),
        Some(c) => {
          word.push('\\');
          word.push(c);
        }
        None => return Err(DumpError::UnterminatedQuote),
      },
      Some(c) => word.push(c),
      None => return Err(DumpError::UnterminatedQuote),
    }
  }
}

/// Collect `NAME=value` assignments echoed on stdout.
///
/// Lines that are not assignments are ignored; later assignments win.
pub fn parse_stdout_assignments(stdout: &str) -> Vec<(String, String)> {
  stdout
    .lines()
    .map(|line| line.strip_suffix('\r').unwrap_or(line).trim_start())
    .filter_map(split_assignment)
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// Whether a captured variable belongs to the wrapper rather than the user.
pub fn is_wrapper_var(name: &str) -> bool {
  WRAPPER_VARS.iter().any(|v| v.eq_ignore_ascii_case(name))
}
