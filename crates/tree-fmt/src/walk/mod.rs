mod filesystem;
mod git;
mod paths;

pub use filesystem::*;
pub use git::*;
pub use paths::*;

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::configuration::WalkKind;
use crate::environment::CanonicalizedPathBuf;
use crate::environment::Environment;
use crate::environment::FileMetadata;
use crate::format::CancelledError;

/// A file produced by a path source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
  pub path: PathBuf,
  /// `/` separated path relative to the tree root.
  pub relative_path: String,
  pub metadata: FileMetadata,
}

pub enum PathSource {
  /// Walks the tree, or only the requested paths when there are any.
  Tree {
    walk: WalkKind,
    tree_root: CanonicalizedPathBuf,
    requested: Vec<RequestedPath>,
  },
  /// Yields exactly these files.
  Files(Vec<WalkedFile>),
}

/// Produces the files of the source on a blocking thread.
pub fn spawn_path_source<TEnvironment: Environment>(
  environment: TEnvironment,
  source: PathSource,
  sender: mpsc::Sender<WalkedFile>,
  token: CancellationToken,
) -> JoinHandle<Result<()>> {
  tokio::task::spawn_blocking(move || {
    let mut emit = |file: WalkedFile| -> Result<()> {
      if token.is_cancelled() {
        return Err(CancelledError.into());
      }
      sender.blocking_send(file).map_err(|_| CancelledError.into())
    };
    match source {
      PathSource::Files(files) => {
        for file in files {
          emit(file)?;
        }
        Ok(())
      }
      PathSource::Tree { walk, tree_root, requested } => {
        let walk = resolve_walk_kind(walk, &tree_root, &environment);
        if requested.is_empty() {
          return walk_dir(walk, &tree_root, tree_root.as_path(), &environment, &mut emit);
        }
        for requested in requested {
          if requested.is_dir {
            walk_dir(walk, &tree_root, &requested.path, &environment, &mut emit)?;
          } else {
            let metadata = environment.file_metadata(&requested.path)?;
            emit(WalkedFile {
              path: requested.path,
              relative_path: requested.relative_path,
              metadata,
            })?;
          }
        }
        Ok(())
      }
    }
  })
}

fn walk_dir(
  walk: WalkKind,
  tree_root: &CanonicalizedPathBuf,
  dir: &std::path::Path,
  environment: &impl Environment,
  emit: &mut dyn FnMut(WalkedFile) -> Result<()>,
) -> Result<()> {
  match walk {
    WalkKind::Git => walk_git(tree_root, dir, environment, emit),
    WalkKind::Filesystem | WalkKind::Auto => walk_filesystem(tree_root, dir, environment, emit),
  }
}

/// Picks git when the tree root is inside a git work tree.
pub fn resolve_walk_kind(walk: WalkKind, tree_root: &CanonicalizedPathBuf, environment: &impl Environment) -> WalkKind {
  if walk != WalkKind::Auto {
    return walk;
  }
  let is_git = match environment.run_command_output("git", &["rev-parse", "--is-inside-work-tree"], tree_root.as_path()) {
    Ok(output) => output.success && String::from_utf8_lossy(&output.stdout).trim() == "true",
    Err(err) => {
      log_debug!(environment, "Could not run git. {}", err);
      false
    }
  };
  let walk = if is_git { WalkKind::Git } else { WalkKind::Filesystem };
  log_debug!(environment, "Using the {:?} walker.", walk);
  walk
}

#[cfg(test)]
mod test {
  use std::path::Path;

  use pretty_assertions::assert_eq;

  use super::*;
  use crate::environment::TestEnvironment;

  async fn collect(environment: &TestEnvironment, source: PathSource) -> Result<Vec<String>> {
    let (sender, mut receiver) = mpsc::channel(2);
    let handle = spawn_path_source(environment.clone(), source, sender, CancellationToken::new());
    let mut paths = Vec::new();
    while let Some(file) = receiver.recv().await {
      paths.push(file.relative_path);
    }
    handle.await??;
    Ok(paths)
  }

  #[tokio::test]
  async fn walks_requested_paths() {
    let environment = TestEnvironment::new();
    environment.write_file("/tree/a.txt", "").unwrap();
    environment.write_file("/tree/dir/b.txt", "").unwrap();
    environment.write_file("/tree/dir/sub/c.txt", "").unwrap();
    environment.write_file("/tree/other/d.txt", "").unwrap();
    let tree_root = environment.canonicalize("/tree").unwrap();
    let requested = resolve_requested_paths(&["dir".to_string(), "a.txt".to_string()], &tree_root, &tree_root, &environment).unwrap();
    let mut paths = collect(
      &environment,
      PathSource::Tree {
        walk: WalkKind::Auto,
        tree_root,
        requested,
      },
    )
    .await
    .unwrap();
    paths.sort();
    assert_eq!(paths, vec!["a.txt", "dir/b.txt", "dir/sub/c.txt"]);
  }

  #[tokio::test]
  async fn yields_provided_files() {
    let environment = TestEnvironment::new();
    let metadata = FileMetadata {
      kind: crate::environment::FileKind::File,
      size: 0,
      modified: 0,
    };
    let paths = collect(
      &environment,
      PathSource::Files(vec![WalkedFile {
        path: Path::new("/tree/.tmp").to_path_buf(),
        relative_path: "src/main.rs".to_string(),
        metadata,
      }]),
    )
    .await
    .unwrap();
    assert_eq!(paths, vec!["src/main.rs"]);
  }

  #[test]
  fn auto_walk_falls_back_to_filesystem() {
    let environment = TestEnvironment::new();
    let tree_root = CanonicalizedPathBuf::new_for_testing("/tree");
    assert_eq!(resolve_walk_kind(WalkKind::Auto, &tree_root, &environment), WalkKind::Filesystem);
    environment.set_command_output("git rev-parse --is-inside-work-tree", b"true\n");
    assert_eq!(resolve_walk_kind(WalkKind::Auto, &tree_root, &environment), WalkKind::Git);
    assert_eq!(resolve_walk_kind(WalkKind::Filesystem, &tree_root, &environment), WalkKind::Filesystem);
  }
}
