//! Deterministic destination names for exported packs.

use std::collections::{BTreeMap, BTreeSet};

use super::{ExportDescriptor, ExportError, PackKind};

/// Resolve the destination directory name of every pack, in input order.
///
/// A pack is named after its explicit name or the project. When packs of
/// different kinds share a name, each of them gets its kind suffix. Two packs
/// of the same kind may never share a name.
pub fn resolve_names(descriptor: &ExportDescriptor) -> Result<Vec<String>, ExportError> {
  let bases: Vec<&str> = descriptor
    .packs
    .iter()
    .map(|pack| pack.name.as_deref().unwrap_or(&descriptor.project_name))
    .collect();

  let mut kinds_by_base: BTreeMap<&str, Vec<PackKind>> = BTreeMap::new();
  for (pack, base) in descriptor.packs.iter().zip(&bases) {
    validate(base)?;
    let kinds = kinds_by_base.entry(*base).or_default();
    if kinds.contains(&pack.kind) {
      return Err(ExportError::DuplicatePack {
        name: base.to_string(),
        kind: pack.kind,
      });
    }
    kinds.push(pack.kind);
  }

  let mut names = Vec::with_capacity(bases.len());
  let mut seen = BTreeSet::new();
  for (pack, base) in descriptor.packs.iter().zip(&bases) {
    let name = if kinds_by_base[base].len() > 1 {
      format!("{}{}", base, descriptor.suffix(pack.kind))
    } else {
      base.to_string()
    };
    validate(&name)?;
    if !seen.insert(name.clone()) {
      return Err(ExportError::DuplicatePack { name, kind: pack.kind });
    }
    names.push(name);
  }

  Ok(names)
}

fn validate(name: &str) -> Result<(), ExportError> {
  let bad = name.is_empty()
    || name == "."
    || name == ".."
    || name.starts_with('.')
    || name.contains(['/', '\\'])
    || name.trim() != name;
  if bad {
    return Err(ExportError::InvalidName { name: name.to_string() });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  fn descriptor() -> ExportDescriptor {
    ExportDescriptor::new("proj", PathBuf::from("build"))
  }

  #[test]
  fn single_pack_uses_project_name() {
    let d = descriptor().with_pack(PackKind::Behavior, "packs/BP");
    assert_eq!(resolve_names(&d).unwrap(), vec!["proj"]);
  }

  #[test]
  fn shared_name_gets_kind_suffixes() {
    let d = descriptor()
      .with_pack(PackKind::Behavior, "packs/BP")
      .with_pack(PackKind::Resource, "packs/RP");
    assert_eq!(resolve_names(&d).unwrap(), vec!["proj_bp", "proj_rp"]);
  }

  #[test]
  fn configured_suffixes_are_used() {
    let d = descriptor()
      .with_suffix(PackKind::Behavior, " BP")
      .with_suffix(PackKind::Resource, "-res")
      .with_pack(PackKind::Resource, "packs/RP")
      .with_pack(PackKind::Behavior, "packs/BP");
    assert_eq!(resolve_names(&d).unwrap(), vec!["proj-res", "proj BP"]);
  }

  #[test]
  fn distinct_names_are_not_suffixed() {
    let d = descriptor()
      .with_named_pack(PackKind::Behavior, "packs/BP", "logic")
      .with_named_pack(PackKind::Resource, "packs/RP", "art");
    assert_eq!(resolve_names(&d).unwrap(), vec!["logic", "art"]);
  }

  #[test]
  fn same_kind_same_name_is_rejected() {
    let d = descriptor()
      .with_pack(PackKind::Behavior, "a")
      .with_pack(PackKind::Behavior, "b");
    assert!(matches!(
      resolve_names(&d),
      Err(ExportError::DuplicatePack { kind: PackKind::Behavior, .. })
    ));
  }

  #[test]
  fn suffixed_name_clashing_with_explicit_name_is_rejected() {
    let d = descriptor()
      .with_pack(PackKind::Behavior, "a")
      .with_pack(PackKind::Resource, "b")
      .with_named_pack(PackKind::Behavior, "c", "proj_rp");
    assert!(matches!(resolve_names(&d), Err(ExportError::DuplicatePack { .. })));
  }

  #[test]
  fn names_are_stable_across_calls() {
    let d = descriptor()
      .with_pack(PackKind::Resource, "packs/RP")
      .with_pack(PackKind::Behavior, "packs/BP");
    assert_eq!(resolve_names(&d).unwrap(), resolve_names(&d).unwrap());
  }

  #[test]
  fn path_like_names_are_rejected() {
    for bad in ["", "..", "a/b", "a\\b", ".hidden", " padded"] {
      let d = descriptor().with_named_pack(PackKind::Behavior, "x", bad);
      assert!(
        matches!(resolve_names(&d), Err(ExportError::InvalidName { .. })),
        "{:?} should be rejected",
        bad
      );
    }
  }
}
