use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Host operating system identity used to pick per-OS command variants.
///
/// The identifiers match the keys accepted in `osCommands` maps:
/// `linux`, `darwin` and `windows`. Any other platform is carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
  Other(String),
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Self {
    Self::from_rust_os(std::env::consts::OS)
  }

  /// Map a `std::env::consts::OS` value to an identifier.
  pub fn from_rust_os(os: &str) -> Self {
    match os {
      "linux" => Self::Linux,
      "macos" => Self::MacOs,
      "windows" => Self::Windows,
      other => Self::Other(other.to_string()),
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
      Self::Other(name) => name,
    }
  }

  pub fn is_windows(&self) -> bool {
    matches!(self, Self::Windows)
  }
}

impl FromStr for Os {
  type Err = Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.to_ascii_lowercase().as_str() {
      "linux" => Self::Linux,
      "darwin" | "macos" => Self::MacOs,
      "windows" => Self::Windows,
      other => Self::Other(other.to_string()),
    })
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
