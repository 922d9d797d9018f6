//! Project file loading.
//!
//! A project directory carries a `packsmith.json` naming the project, its pack
//! directories, the build root and the available profiles:
//!
//! ```json
//! {
//!   "name": "my_project",
//!   "packs": { "behaviorPack": "./packs/BP", "resourcePack": "./packs/RP" },
//!   "buildRoot": "build",
//!   "profiles": {
//!     "default": {
//!       "preShell": ["echo TEST_VAR=1"],
//!       "filters": [{ "filter": "lint", "command": "lint ." }],
//!       "postShell": []
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::export::{ExportDescriptor, PackKind};
use crate::profile::Profile;

/// File name looked up in a project directory.
pub const PROJECT_FILE: &str = "packsmith.json";

pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unknown profile '{name}' (available: {})", available.join(", "))]
  UnknownProfile { name: String, available: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackPaths {
  pub behavior_pack: Option<PathBuf>,
  pub resource_pack: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFile {
  name: String,
  #[serde(default)]
  packs: PackPaths,
  #[serde(default = "default_build_root")]
  build_root: PathBuf,
  #[serde(default)]
  suffixes: BTreeMap<PackKind, String>,
  #[serde(default)]
  profiles: BTreeMap<String, Profile>,
}

fn default_build_root() -> PathBuf {
  PathBuf::from("build")
}

/// A loaded project.
#[derive(Debug, Clone)]
pub struct Project {
  pub name: String,
  /// Directory containing the project file.
  pub dir: PathBuf,
  pub packs: PackPaths,
  pub build_root: PathBuf,
  pub suffixes: BTreeMap<PackKind, String>,
  profiles: BTreeMap<String, Profile>,
}

impl Project {
  /// Load `packsmith.json` from `dir`.
  pub fn load(dir: &Path) -> Result<Self, ProjectError> {
    Self::from_file(&dir.join(PROJECT_FILE))
  }

  pub fn from_file(path: &Path) -> Result<Self, ProjectError> {
    let content = std::fs::read_to_string(path).map_err(|source| ProjectError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let file: ProjectFile = serde_json::from_str(&content).map_err(|source| ProjectError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    debug!(project = %file.name, profiles = file.profiles.len(), "loaded project file");

    Ok(Self {
      name: file.name,
      dir,
      packs: file.packs,
      build_root: file.build_root,
      suffixes: file.suffixes,
      profiles: file.profiles,
    })
  }

  pub fn profile_names(&self) -> impl Iterator<Item = &str> {
    self.profiles.keys().map(String::as_str)
  }

  /// The named profile, carrying its name.
  pub fn profile(&self, name: &str) -> Result<Profile, ProjectError> {
    let mut profile = self.profiles.get(name).cloned().ok_or_else(|| ProjectError::UnknownProfile {
      name: name.to_string(),
      available: self.profile_names().map(str::to_string).collect(),
    })?;
    profile.name = name.to_string();
    Ok(profile)
  }

  /// Export descriptor with paths resolved against the project directory.
  pub fn export_descriptor(&self) -> ExportDescriptor {
    let mut descriptor = ExportDescriptor::new(&self.name, self.dir.join(&self.build_root));
    if let Some(bp) = &self.packs.behavior_pack {
      descriptor = descriptor.with_pack(PackKind::Behavior, self.dir.join(bp));
    }
    if let Some(rp) = &self.packs.resource_pack {
      descriptor = descriptor.with_pack(PackKind::Resource, self.dir.join(rp));
    }
    for (kind, suffix) in &self.suffixes {
      descriptor = descriptor.with_suffix(*kind, suffix);
    }
    descriptor
  }
}
