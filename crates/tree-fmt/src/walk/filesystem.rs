use std::path::Path;

use anyhow::Context;
use anyhow::Result;

use super::WalkedFile;
use crate::environment::CanonicalizedPathBuf;
use crate::environment::Environment;
use crate::environment::FileKind;

/// Recursively yields the files in `dir`. Symlinks are skipped and `.git`
/// directories are not entered.
pub fn walk_filesystem(
  tree_root: &CanonicalizedPathBuf,
  dir: &Path,
  environment: &impl Environment,
  emit: &mut dyn FnMut(WalkedFile) -> Result<()>,
) -> Result<()> {
  let mut pending_dirs = vec![dir.to_path_buf()];
  while let Some(dir) = pending_dirs.pop() {
    let mut entries = environment
      .dir_info(&dir)
      .with_context(|| format!("Error reading directory {}.", dir.display()))?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    let mut sub_dirs = Vec::new();
    for entry in entries {
      match entry.kind {
        FileKind::Directory => {
          if entry.path.file_name().map(|name| name != ".git").unwrap_or(true) {
            sub_dirs.push(entry.path);
          }
        }
        FileKind::File => {
          let Some(relative_path) = tree_root.relative_path_of(&entry.path) else {
            continue;
          };
          let metadata = environment
            .file_metadata(&entry.path)
            .with_context(|| format!("Error reading metadata of {}.", entry.path.display()))?;
          emit(WalkedFile {
            path: entry.path,
            relative_path,
            metadata,
          })?;
        }
        FileKind::Symlink => {}
      }
    }
    // visit in order
    pending_dirs.extend(sub_dirs.into_iter().rev());
  }
  Ok(())
}
