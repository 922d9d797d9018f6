//! Content digests of exported directory trees.
//!
//! A digest covers relative paths, file contents and symlink targets, never
//! timestamps or permissions, so two exports of the same inputs digest
//! identically.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Lowercase hex SHA-256 of a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeDigest(pub String);

impl std::fmt::Display for TreeDigest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl TreeDigest {
  /// First 12 characters, for log lines.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Digest every entry below `root`, in file-name order.
pub fn digest_tree(root: &Path) -> Result<TreeDigest, DigestError> {
  let mut hasher = Sha256::new();

  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.map_err(|source| DigestError::Walk {
      path: root.to_path_buf(),
      source,
    })?;
    let path = entry.path();
    let rel = path.strip_prefix(root).unwrap_or(path);
    if rel.as_os_str().is_empty() {
      continue;
    }
    // Forward slashes so digests agree across hosts.
    let rel = rel.to_string_lossy().replace('\\', "/");

    let file_type = entry.file_type();
    let line = if file_type.is_symlink() {
      let target = fs::read_link(path).map_err(|source| DigestError::Read {
        path: path.to_path_buf(),
        source,
      })?;
      format!("L:{}:{}", rel, target.to_string_lossy())
    } else if file_type.is_dir() {
      format!("D:{}", rel)
    } else if file_type.is_file() {
      format!("F:{}:{}", rel, digest_file(path)?)
    } else {
      continue;
    };

    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(TreeDigest(hex::encode(hasher.finalize())))
}

/// Hex SHA-256 of one file's bytes.
pub fn digest_file(path: &Path) -> Result<String, DigestError> {
  let read_err = |source| DigestError::Read {
    path: path.to_path_buf(),
    source,
  };
  let mut file = fs::File::open(path).map_err(read_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];
  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(hex::encode(hasher.finalize()))
}
