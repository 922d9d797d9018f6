//! Export stage.
//!
//! Materializes the finished pack directories under the build root:
//!
//! ```text
//! {build_root}/
//! ├── <project>_bp/     # behavior pack (suffixed only on a name clash)
//! └── <project>_rp/     # resource pack
//! ```
//!
//! Every destination is replaced wholesale. A pack is first copied into a
//! hidden staging directory next to its destination, the old destination is
//! removed and the staging directory is renamed into place, so files from a
//! previous run never survive.

pub mod naming;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::util::hash::{DigestError, TreeDigest, digest_tree};

/// Kind of content pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PackKind {
  Behavior,
  Resource,
}

impl PackKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      PackKind::Behavior => "behavior",
      PackKind::Resource => "resource",
    }
  }

  /// Suffix appended when packs of different kinds share a name.
  pub fn default_suffix(&self) -> &'static str {
    match self {
      PackKind::Behavior => "_bp",
      PackKind::Resource => "_rp",
    }
  }
}

impl fmt::Display for PackKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// A pack directory to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackDirectory {
  pub kind: PackKind,
  pub source: PathBuf,
  /// Destination name; defaults to the project name.
  pub name: Option<String>,
}

/// What to export and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDescriptor {
  pub project_name: String,
  pub build_root: PathBuf,
  pub packs: Vec<PackDirectory>,
  /// Per-kind suffix overrides; [`PackKind::default_suffix`] otherwise.
  pub suffixes: BTreeMap<PackKind, String>,
}

impl ExportDescriptor {
  pub fn new(project_name: impl Into<String>, build_root: impl Into<PathBuf>) -> Self {
    Self {
      project_name: project_name.into(),
      build_root: build_root.into(),
      packs: Vec::new(),
      suffixes: BTreeMap::new(),
    }
  }

  pub fn with_pack(mut self, kind: PackKind, source: impl Into<PathBuf>) -> Self {
    self.packs.push(PackDirectory {
      kind,
      source: source.into(),
      name: None,
    });
    self
  }

  pub fn with_named_pack(mut self, kind: PackKind, source: impl Into<PathBuf>, name: impl Into<String>) -> Self {
    self.packs.push(PackDirectory {
      kind,
      source: source.into(),
      name: Some(name.into()),
    });
    self
  }

  pub fn with_suffix(mut self, kind: PackKind, suffix: impl Into<String>) -> Self {
    self.suffixes.insert(kind, suffix.into());
    self
  }

  /// Make relative build root and pack paths relative to `base`.
  pub fn resolved_against(&self, base: &Path) -> Self {
    let resolve = |p: &Path| if p.is_relative() { base.join(p) } else { p.to_path_buf() };
    Self {
      project_name: self.project_name.clone(),
      build_root: resolve(&self.build_root),
      packs: self
        .packs
        .iter()
        .map(|pack| PackDirectory {
          kind: pack.kind,
          source: resolve(&pack.source),
          name: pack.name.clone(),
        })
        .collect(),
      suffixes: self.suffixes.clone(),
    }
  }

  pub fn suffix(&self, kind: PackKind) -> &str {
    self
      .suffixes
      .get(&kind)
      .map(String::as_str)
      .unwrap_or_else(|| kind.default_suffix())
  }
}

/// One exported pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedPack {
  pub kind: PackKind,
  pub name: String,
  pub path: PathBuf,
  pub digest: TreeDigest,
}

/// Everything the export stage produced, in descriptor order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportedPaths {
  pub packs: Vec<ExportedPack>,
}

impl ExportedPaths {
  pub fn get(&self, kind: PackKind) -> Option<&ExportedPack> {
    self.packs.iter().find(|p| p.kind == kind)
  }
}

#[derive(Debug, Error)]
pub enum ExportError {
  #[error("{kind} pack source does not exist: {path}")]
  MissingSource { kind: PackKind, path: PathBuf },

  #[error("more than one {kind} pack would be exported as '{name}'")]
  DuplicatePack { name: String, kind: PackKind },

  #[error("invalid pack directory name '{name}'")]
  InvalidName { name: String },

  #[error("build root {build_root} lies inside pack source {source_dir}")]
  NestedBuildRoot { build_root: PathBuf, source_dir: PathBuf },

  #[error("failed to export {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error(transparent)]
  Digest(#[from] DigestError),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ExportError + '_ {
  move |source| ExportError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Export every pack of `descriptor` under its build root.
///
/// Names are resolved and sources checked before anything is written. A
/// failure part-way leaves the build root inconsistent; callers re-run.
pub fn export(descriptor: &ExportDescriptor) -> Result<ExportedPaths, ExportError> {
  let names = naming::resolve_names(descriptor)?;

  for pack in &descriptor.packs {
    if !pack.source.is_dir() {
      return Err(ExportError::MissingSource {
        kind: pack.kind,
        path: pack.source.clone(),
      });
    }
  }

  fs::create_dir_all(&descriptor.build_root).map_err(io_err(&descriptor.build_root))?;
  let build_root = dunce::canonicalize(&descriptor.build_root).map_err(io_err(&descriptor.build_root))?;

  for pack in &descriptor.packs {
    let source = dunce::canonicalize(&pack.source).map_err(io_err(&pack.source))?;
    if build_root.starts_with(&source) {
      return Err(ExportError::NestedBuildRoot {
        build_root,
        source_dir: source,
      });
    }
  }

  info!(
    build_root = %build_root.display(),
    packs = descriptor.packs.len(),
    "exporting packs"
  );

  let mut exported = ExportedPaths::default();
  for (pack, name) in descriptor.packs.iter().zip(names) {
    let path = replace_dir(&pack.source, &build_root, &name)?;
    let digest = digest_tree(&path)?;
    info!(kind = %pack.kind, path = %path.display(), digest = %digest.short(), "exported pack");
    exported.packs.push(ExportedPack {
      kind: pack.kind,
      name,
      path,
      digest,
    });
  }

  Ok(exported)
}

/// Copy `source` to `build_root/name`, replacing whatever was there.
fn replace_dir(source: &Path, build_root: &Path, name: &str) -> Result<PathBuf, ExportError> {
  let dest = build_root.join(name);
  let staging = build_root.join(format!(".{}.staging", name));

  remove_if_exists(&staging)?;
  copy_tree(source, &staging)?;
  remove_if_exists(&dest)?;
  fs::rename(&staging, &dest).map_err(io_err(&dest))?;

  debug!(source = %source.display(), dest = %dest.display(), "replaced pack directory");
  Ok(dest)
}

fn remove_if_exists(path: &Path) -> Result<(), ExportError> {
  let meta = match fs::symlink_metadata(path) {
    Ok(meta) => meta,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(io_err(path)(e)),
  };
  if meta.is_dir() {
    fs::remove_dir_all(path).map_err(io_err(path))
  } else {
    fs::remove_file(path).map_err(io_err(path))
  }
}

/// Copy a tree in file-name order. Symlinks are materialized as the content
/// they point to.
fn copy_tree(source: &Path, dest: &Path) -> Result<(), ExportError> {
  for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
    let entry = entry.map_err(|e| ExportError::Walk {
      path: source.to_path_buf(),
      source: e,
    })?;
    let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
    let target = dest.join(rel);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).map_err(io_err(&target))?;
    } else {
      fs::copy(entry.path(), &target).map_err(io_err(&target))?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
  }

  fn project(temp: &TempDir) -> ExportDescriptor {
    let root = temp.path();
    write(&root.join("packs/BP/manifest.json"), "{\"bp\":1}");
    write(&root.join("packs/BP/entities/zombie.json"), "{}");
    write(&root.join("packs/RP/manifest.json"), "{\"rp\":1}");
    ExportDescriptor::new("demo", root.join("build"))
      .with_pack(PackKind::Behavior, root.join("packs/BP"))
      .with_pack(PackKind::Resource, root.join("packs/RP"))
  }

  #[test]
  fn exports_both_packs_with_suffixes() {
    let temp = TempDir::new().unwrap();
    let descriptor = project(&temp);

    let exported = export(&descriptor).unwrap();

    let build = temp.path().join("build");
    assert!(build.join("demo_bp/entities/zombie.json").is_file());
    assert_eq!(fs::read_to_string(build.join("demo_rp/manifest.json")).unwrap(), "{\"rp\":1}");
    assert_eq!(exported.packs.len(), 2);
    assert_eq!(exported.get(PackKind::Resource).unwrap().name, "demo_rp");
  }

  #[test]
  fn stale_files_are_removed() {
    let temp = TempDir::new().unwrap();
    let descriptor = project(&temp);
    let stale = temp.path().join("build/demo_bp/stale.json");
    write(&stale, "old");

    export(&descriptor).unwrap();

    assert!(!stale.exists());
  }

  #[test]
  fn repeated_export_is_identical() {
    let temp = TempDir::new().unwrap();
    let descriptor = project(&temp);

    let first = export(&descriptor).unwrap();
    let second = export(&descriptor).unwrap();

    assert_eq!(first, second);
  }

  #[test]
  fn no_staging_directories_remain() {
    let temp = TempDir::new().unwrap();
    export(&project(&temp)).unwrap();

    let leftovers: Vec<_> = fs::read_dir(temp.path().join("build"))
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
      .filter(|n| n.starts_with('.'))
      .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
  }

  #[test]
  fn unrelated_build_content_is_untouched() {
    let temp = TempDir::new().unwrap();
    let other = temp.path().join("build/other_project/keep.txt");
    write(&other, "keep");

    export(&project(&temp)).unwrap();

    assert_eq!(fs::read_to_string(other).unwrap(), "keep");
  }

  #[test]
  fn missing_source_fails_before_writing() {
    let temp = TempDir::new().unwrap();
    let descriptor = project(&temp).with_named_pack(PackKind::Behavior, temp.path().join("nope"), "extra");

    let result = export(&descriptor);

    assert!(matches!(result, Err(ExportError::MissingSource { .. })));
    assert!(!temp.path().join("build").exists());
  }

  #[test]
  fn build_root_inside_source_is_rejected() {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("pack/a.txt"), "a");
    let descriptor =
      ExportDescriptor::new("demo", temp.path().join("pack/build")).with_pack(PackKind::Behavior, temp.path().join("pack"));

    assert!(matches!(export(&descriptor), Err(ExportError::NestedBuildRoot { .. })));
  }

  #[test]
  fn empty_descriptor_exports_nothing() {
    let temp = TempDir::new().unwrap();
    let exported = export(&ExportDescriptor::new("demo", temp.path().join("build"))).unwrap();
    assert!(exported.packs.is_empty());
  }

  #[test]
  fn default_suffixes() {
    let d = ExportDescriptor::new("p", "build");
    assert_eq!(d.suffix(PackKind::Behavior), "_bp");
    assert_eq!(d.suffix(PackKind::Resource), "_rp");
    assert_eq!(d.with_suffix(PackKind::Resource, "-r").suffix(PackKind::Resource), "-r");
  }
}
