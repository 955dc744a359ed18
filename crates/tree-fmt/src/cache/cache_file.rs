use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Bumped when the layout of the file changes. Files with another
/// version are discarded.
pub const CACHE_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFileData {
  pub version: u32,
  /// Signature of every formatter active in the last run that wrote the file.
  pub formatters_signature: u64,
  /// Keyed by the `/` separated path relative to the tree root.
  pub entries: BTreeMap<String, CacheEntry>,
}

impl CacheFileData {
  pub fn new(formatters_signature: u64) -> Self {
    CacheFileData {
      version: CACHE_FILE_VERSION,
      formatters_signature,
      entries: Default::default(),
    }
  }
}

/// State of a file when it last finished going through its formatters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
  pub size: u64,
  /// Nanoseconds since the unix epoch.
  pub modified: u64,
  pub hash: u64,
  /// Signature of the formatters on the file's route.
  pub formatters: u64,
}

/// Only reads the version so files with another layout can be detected
/// without failing to deserialize.
#[derive(Deserialize)]
pub struct CacheFileVersion {
  pub version: u32,
}
