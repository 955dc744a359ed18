use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;

use super::WalkedFile;
use crate::environment::CanonicalizedPathBuf;
use crate::environment::Environment;

/// Yields the tracked and untracked (but not ignored) files git knows
/// about in `dir`.
pub fn walk_git(
  tree_root: &CanonicalizedPathBuf,
  dir: &Path,
  environment: &impl Environment,
  emit: &mut dyn FnMut(WalkedFile) -> Result<()>,
) -> Result<()> {
  let mut args = vec!["ls-files", "--cached", "--others", "--exclude-standard", "-z"];
  // directory names may contain glob characters
  let pathspec = tree_root
    .relative_path_of(dir)
    .filter(|path| !path.is_empty())
    .map(|path| format!(":(literal){}", path));
  if let Some(pathspec) = &pathspec {
    args.push("--");
    args.push(pathspec);
  }
  let output = environment
    .run_command_output("git", &args, tree_root.as_path())
    .context("Error running git ls-files.")?;
  if !output.success {
    bail!("git ls-files failed. {}", output.combined_text().trim_end());
  }

  let stdout = String::from_utf8_lossy(&output.stdout);
  for entry in stdout.split('\0').filter(|entry| !entry.is_empty()) {
    let path = tree_root.join(entry);
    let metadata = match environment.file_metadata(&path) {
      Ok(metadata) => metadata,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        log_warn!(environment, "Skipping {} which is in the git index but missing on disk.", entry);
        continue;
      }
      Err(err) => return Err(err).with_context(|| format!("Error reading metadata of {}.", path.display())),
    };
    // symlinks and submodules
    if !metadata.is_file() {
      continue;
    }
    emit(WalkedFile {
      path,
      relative_path: entry.to_string(),
      metadata,
    })?;
  }
  Ok(())
}
