use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::Mutex;
use thiserror::Error;

use super::CACHE_FILE_VERSION;
use super::CacheEntry;
use super::CacheFileData;
use super::CacheFileVersion;
use crate::environment::CanonicalizedPathBuf;
use crate::environment::Environment;
use crate::environment::FileMetadata;
use crate::utils::get_bytes_hash;

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("Error reading cache file {path}. {source}")]
  Read { path: PathBuf, source: io::Error },
  #[error("Cache file {path} is corrupt ({source}). Run with --clear-cache to reset it.")]
  Corrupt { path: PathBuf, source: serde_json::Error },
  #[error("Error writing cache file {path}. {source}")]
  Write { path: PathBuf, source: io::Error },
}

/// A file the dispatcher wants to know the cache state of.
#[derive(Debug, Clone, Copy)]
pub struct CacheCandidate<'a> {
  pub relative_path: &'a str,
  pub path: &'a Path,
  pub metadata: &'a FileMetadata,
  pub route_signature: u64,
}

/// A file that went through every formatter on its route.
#[derive(Debug, Clone)]
pub struct CompletedFile {
  pub relative_path: String,
  pub metadata: FileMetadata,
  pub hash: u64,
  pub route_signature: u64,
}

struct CacheState {
  data: CacheFileData,
  is_dirty: bool,
}

/// Remembers the state of each path after it was formatted so unchanged
/// paths can be skipped on the next run.
///
/// The whole file is rewritten atomically on every update so a crash never
/// leaves committed entries corrupted.
pub struct Cache<TEnvironment: Environment> {
  file_path: PathBuf,
  state: Mutex<CacheState>,
  environment: TEnvironment,
}

impl<TEnvironment: Environment> Cache<TEnvironment> {
  /// Opens the cache for the tree root. When `clear` is true the existing
  /// entries are dropped without reading the file.
  pub fn open(environment: TEnvironment, tree_root: &CanonicalizedPathBuf, formatters_signature: u64, clear: bool) -> Result<Self, CacheError> {
    let file_path = get_cache_file_path(&environment, tree_root);
    let data = if clear {
      log_debug!(environment, "Clearing cache {}", file_path.display());
      None
    } else {
      read_cache_file(&file_path, &environment)?
    };
    let (data, is_dirty) = match data {
      Some(mut data) => {
        if data.formatters_signature != formatters_signature {
          log_debug!(environment, "Formatters changed since the cache was last written.");
          data.formatters_signature = formatters_signature;
        }
        (data, false)
      }
      None => (CacheFileData::new(formatters_signature), true),
    };
    let cache = Cache {
      file_path,
      state: Mutex::new(CacheState { data, is_dirty }),
      environment,
    };
    if clear {
      cache.clear()?;
    }
    Ok(cache)
  }

  pub fn file_path(&self) -> &Path {
    &self.file_path
  }

  pub fn len(&self) -> usize {
    self.state.lock().data.entries.len()
  }

  /// If the path needs to go through its formatters, which is when it has
  /// no entry, its size or content differ from the entry, or the formatters
  /// on its route changed.
  ///
  /// The content is only hashed when the modified time is all that differs,
  /// such as after a checkout, and the entry takes the new time when the
  /// content matches.
  pub fn is_changed(&self, candidate: CacheCandidate) -> bool {
    let entry = match self.state.lock().data.entries.get(candidate.relative_path) {
      Some(entry) => *entry,
      None => return true,
    };
    if entry.size != candidate.metadata.size || entry.formatters != candidate.route_signature {
      return true;
    }
    if entry.modified == candidate.metadata.modified {
      return false;
    }
    let hash = match self.environment.read_file_bytes(candidate.path) {
      Ok(bytes) => get_bytes_hash(&bytes),
      Err(err) => {
        log_debug!(self.environment, "Error reading {}. {}", candidate.path.display(), err);
        return true;
      }
    };
    if hash != entry.hash {
      return true;
    }
    let mut state = self.state.lock();
    if let Some(entry) = state.data.entries.get_mut(candidate.relative_path) {
      entry.modified = candidate.metadata.modified;
      state.is_dirty = true;
    }
    false
  }

  /// Gets the relative paths of the candidates that need formatting.
  pub fn filter_changed<'a>(&self, candidates: impl IntoIterator<Item = CacheCandidate<'a>>) -> Vec<&'a str> {
    candidates
      .into_iter()
      .filter(|candidate| self.is_changed(*candidate))
      .map(|candidate| candidate.relative_path)
      .collect()
  }

  /// Drops the entries of paths that are not in `seen`.
  pub fn retain_seen(&self, seen: &HashSet<String>) {
    let mut state = self.state.lock();
    let previous_len = state.data.entries.len();
    state.data.entries.retain(|relative_path, _| seen.contains(relative_path));
    let removed = previous_len - state.data.entries.len();
    if removed > 0 {
      log_debug!(self.environment, "Pruned {} stale cache entries.", removed);
      state.is_dirty = true;
    }
  }

  /// Stores the new state of the completed files and writes the cache.
  pub fn record_completions(&self, completed: &[CompletedFile]) -> Result<(), CacheError> {
    if completed.is_empty() {
      return Ok(());
    }
    {
      let mut state = self.state.lock();
      for file in completed {
        state.data.entries.insert(
          file.relative_path.clone(),
          CacheEntry {
            size: file.metadata.size,
            modified: file.metadata.modified,
            hash: file.hash,
            formatters: file.route_signature,
          },
        );
      }
      state.is_dirty = true;
    }
    self.write()
  }

  /// Drops every entry so the next run formats everything.
  pub fn clear(&self) -> Result<(), CacheError> {
    {
      let mut state = self.state.lock();
      state.data.entries.clear();
      state.is_dirty = true;
    }
    self.write()
  }

  /// Writes any pending changes.
  pub fn close(&self) -> Result<(), CacheError> {
    if self.state.lock().is_dirty {
      self.write()?;
    }
    Ok(())
  }

  fn write(&self) -> Result<(), CacheError> {
    let mut state = self.state.lock();
    let json_text = serde_json::to_string(&state.data).map_err(|err| CacheError::Write {
      path: self.file_path.clone(),
      source: io::Error::other(err),
    })?;
    if let Some(parent) = self.file_path.parent() {
      self.environment.mk_dir_all(parent).map_err(|source| CacheError::Write {
        path: self.file_path.clone(),
        source,
      })?;
    }
    self
      .environment
      .atomic_write_file_bytes(&self.file_path, json_text.as_bytes())
      .map_err(|source| CacheError::Write {
        path: self.file_path.clone(),
        source,
      })?;
    state.is_dirty = false;
    Ok(())
  }
}

pub fn get_cache_file_path(environment: &impl Environment, tree_root: &CanonicalizedPathBuf) -> PathBuf {
  let tree_root_hash = get_bytes_hash(tree_root.to_string_lossy().as_bytes());
  environment.get_cache_dir().join("cache").join(format!("{:016x}.json", tree_root_hash))
}

fn read_cache_file(file_path: &Path, environment: &impl Environment) -> Result<Option<CacheFileData>, CacheError> {
  if !environment.path_exists(file_path) {
    return Ok(None);
  }
  let file_text = environment.read_file(file_path).map_err(|source| CacheError::Read {
    path: file_path.to_path_buf(),
    source,
  })?;
  let corrupt = |source| CacheError::Corrupt {
    path: file_path.to_path_buf(),
    source,
  };
  let version: CacheFileVersion = serde_json::from_str(&file_text).map_err(corrupt)?;
  if version.version != CACHE_FILE_VERSION {
    log_debug!(
      environment,
      "Discarding cache file {} with version {}.",
      file_path.display(),
      version.version
    );
    return Ok(None);
  }
  serde_json::from_str(&file_text).map(Some).map_err(corrupt)
}
