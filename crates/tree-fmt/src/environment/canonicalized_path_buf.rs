use std::borrow::Cow;
use std::path::Display;
use std::path::Path;
use std::path::PathBuf;

/// A PathBuf that is guaranteed to be canonicalized.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalizedPathBuf {
  path: PathBuf,
}

impl CanonicalizedPathBuf {
  pub(super) fn new(path: PathBuf) -> Self {
    CanonicalizedPathBuf { path }
  }

  #[cfg(test)]
  pub fn new_for_testing(path: impl AsRef<Path>) -> CanonicalizedPathBuf {
    assert!(path.as_ref().starts_with("/"));
    CanonicalizedPathBuf::new(path.as_ref().to_path_buf())
  }

  pub fn as_path(&self) -> &Path {
    &self.path
  }

  pub fn display(&self) -> Display<'_> {
    self.path.display()
  }

  pub fn to_string_lossy(&self) -> Cow<'_, str> {
    self.path.to_string_lossy()
  }

  pub fn join(&self, path: impl AsRef<Path>) -> PathBuf {
    self.path.join(path)
  }

  pub fn parent(&self) -> Option<CanonicalizedPathBuf> {
    self.path.parent().map(|p| CanonicalizedPathBuf::new(p.to_path_buf()))
  }

  /// Gets the `/` separated path of `path` relative to this directory, or `None`
  /// when the path is not a descendant.
  pub fn relative_path_of(&self, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(&self.path).ok()?;
    let parts = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>();
    Some(parts.join("/"))
  }
}

impl AsRef<Path> for CanonicalizedPathBuf {
  fn as_ref(&self) -> &Path {
    self.path.as_path()
  }
}
