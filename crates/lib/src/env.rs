//! Run-scoped environment propagated between steps.
//!
//! The engine seeds an [`Environment`] from the host process, hands it to each
//! step, and replaces it with the environment captured at the end of every
//! successful shell step. It is never written back to the real process
//! environment.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
  name: String,
  value: String,
}

/// Ordered mapping of environment variable names to values.
///
/// Names are case-sensitive unless the environment was created with Windows
/// semantics, in which case lookups ignore ASCII case and the most recently
/// written spelling is kept. Iteration is sorted by the normalized name, so
/// two equal environments always iterate identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
  case_insensitive: bool,
  vars: BTreeMap<String, Entry>,
}

impl Environment {
  /// Empty case-sensitive environment.
  pub fn new() -> Self {
    Self::default()
  }

  /// Empty environment with Windows name semantics.
  pub fn case_insensitive() -> Self {
    Self {
      case_insensitive: true,
      vars: BTreeMap::new(),
    }
  }

  /// Empty environment using the naming convention of the host.
  pub fn for_host_convention(windows: bool) -> Self {
    if windows { Self::case_insensitive() } else { Self::new() }
  }

  /// Copy of the current process environment.
  ///
  /// Variables whose name or value is not valid Unicode are skipped.
  pub fn from_host(windows: bool) -> Self {
    let mut env = Self::for_host_convention(windows);
    for (name, value) in std::env::vars_os() {
      if let (Ok(name), Ok(value)) = (name.into_string(), value.into_string()) {
        env.set(name, value);
      }
    }
    env
  }

  /// Build from explicit pairs, keeping this environment's name semantics.
  pub fn with_pairs<I, K, V>(mut self, pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    for (name, value) in pairs {
      self.set(name, value);
    }
    self
  }

  /// Case-sensitive environment from explicit pairs.
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    Self::new().with_pairs(pairs)
  }

  pub fn is_case_insensitive(&self) -> bool {
    self.case_insensitive
  }

  fn key(&self, name: &str) -> String {
    if self.case_insensitive {
      name.to_ascii_uppercase()
    } else {
      name.to_string()
    }
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.vars.get(&self.key(name)).map(|e| e.value.as_str())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.vars.contains_key(&self.key(name))
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let key = self.key(&name);
    self.vars.insert(
      key,
      Entry {
        name,
        value: value.into(),
      },
    );
  }

  pub fn remove(&mut self, name: &str) -> Option<String> {
    let key = self.key(name);
    self.vars.remove(&key).map(|e| e.value)
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  /// Iterate `(name, value)` pairs in deterministic order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.vars.values().map(|e| (e.name.as_str(), e.value.as_str()))
  }

  /// Adopt an environment captured after a step.
  ///
  /// The captured environment supersedes this one entirely: variables the
  /// step unset are gone afterwards. Only the name semantics of `self` carry
  /// over.
  pub fn merge(&self, captured: Environment) -> Environment {
    if captured.case_insensitive == self.case_insensitive {
      return captured;
    }
    Environment {
      case_insensitive: self.case_insensitive,
      vars: BTreeMap::new(),
    }
    .with_pairs(captured.vars.into_values().map(|e| (e.name, e.value)))
  }

  /// Plain name to value mapping, e.g. for serialization or diffing.
  pub fn snapshot(&self) -> BTreeMap<String, String> {
    self.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  /// Names whose value differs between `self` and `other`, or that exist in
  /// only one of them.
  pub fn changed_names(&self, other: &Environment) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (name, value) in other.iter() {
      if self.get(name) != Some(value) {
        names.push(name.to_string());
      }
    }
    for (name, _) in self.iter() {
      if !other.contains(name) {
        names.push(name.to_string());
      }
    }
    names.sort();
    names
  }
}

impl Serialize for Environment {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.snapshot().serialize(serializer)
  }
}
