use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;
use thiserror::Error;

use crate::environment::CanonicalizedPathBuf;
use crate::environment::Environment;
use crate::environment::FileKind;

#[derive(Debug, Error)]
pub enum PathNotFoundError {
  #[error("path {0} not found")]
  NotFound(String),
  #[error("path {0} not found within the tree root {1}")]
  OutsideTreeRoot(String, String),
}

/// A path provided on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedPath {
  pub path: PathBuf,
  pub relative_path: String,
  pub is_dir: bool,
}

/// Resolves the provided paths against the working directory, failing when
/// one doesn't exist or isn't in the tree.
pub fn resolve_requested_paths(
  paths: &[String],
  working_dir: &CanonicalizedPathBuf,
  tree_root: &CanonicalizedPathBuf,
  environment: &impl Environment,
) -> Result<Vec<RequestedPath>, PathNotFoundError> {
  let mut result = Vec::with_capacity(paths.len());
  for path in paths {
    let canonicalized = environment
      .canonicalize(working_dir.join(path))
      .map_err(|_| PathNotFoundError::NotFound(path.clone()))?;
    let Some(relative_path) = tree_root.relative_path_of(canonicalized.as_path()) else {
      return Err(PathNotFoundError::OutsideTreeRoot(path.clone(), tree_root.to_string_lossy().to_string()));
    };
    let metadata = environment
      .file_metadata(&canonicalized)
      .map_err(|_| PathNotFoundError::NotFound(path.clone()))?;
    result.push(RequestedPath {
      path: canonicalized.as_path().to_path_buf(),
      relative_path,
      is_dir: metadata.kind == FileKind::Directory,
    });
  }
  Ok(result)
}

/// Resolves the path provided for stdin formatting, which doesn't need to
/// exist, to an absolute path and its path relative to the tree root.
pub fn resolve_stdin_path(path: &str, working_dir: &CanonicalizedPathBuf, tree_root: &CanonicalizedPathBuf) -> Result<(PathBuf, String), PathNotFoundError> {
  let absolute = normalize_path(&working_dir.join(path));
  match tree_root.relative_path_of(&absolute) {
    Some(relative_path) if !relative_path.is_empty() => Ok((absolute, relative_path)),
    _ => Err(PathNotFoundError::OutsideTreeRoot(path.to_string(), tree_root.to_string_lossy().to_string())),
  }
}

/// Lexically removes `.` and `..` components.
fn normalize_path(path: &Path) -> PathBuf {
  let mut result = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        result.pop();
      }
      _ => result.push(component),
    }
  }
  result
}
